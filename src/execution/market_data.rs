use crate::api::Broker;
use crate::error::DataUnavailable;
use crate::models::{PriceSeries, Symbol, Timeframe};
use chrono::{SubsecRound, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BAR_LIMIT: usize = 100;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// How much history to request and how hard to try
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeframe: Timeframe,
    /// Bars kept after trimming
    pub limit: usize,
    /// Total attempts, including the first
    pub retries: u32,
    /// Upper bound of the jittered pause between attempts (lower bound is 1s)
    pub base_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::Hour,
            limit: DEFAULT_BAR_LIMIT,
            retries: DEFAULT_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

/// Fetches recent bars for one symbol with bounded, jittered retry
pub struct MarketDataFetcher<B> {
    broker: Arc<B>,
    config: FetchConfig,
}

impl<B: Broker> MarketDataFetcher<B> {
    pub fn new(broker: Arc<B>, config: FetchConfig) -> Self {
        Self { broker, config }
    }

    /// Last `limit` bars ending now, ascending by timestamp
    ///
    /// An empty answer or a malformed response ends the fetch at once; API and
    /// transport errors are retried up to `retries` attempts in total.
    pub async fn fetch(&self, symbol: &Symbol) -> Result<PriceSeries, DataUnavailable> {
        let max_attempts = self.config.retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            // Twice the bars we keep, so the trimmed tail is fully populated
            let end = Utc::now().trunc_subsecs(0);
            let span = self.config.timeframe.duration() * (self.config.limit * 2) as i32;
            let start = end - span;

            let error = match self
                .broker
                .get_bars(symbol, self.config.timeframe, start, end)
                .await
            {
                Ok(bars) if bars.is_empty() => {
                    tracing::warn!(symbol = %symbol, "No data received");
                    return Err(DataUnavailable::Empty);
                }
                Ok(bars) => {
                    let series = PriceSeries::new(symbol.clone(), bars).tail(self.config.limit);
                    tracing::debug!(
                        symbol = %symbol,
                        bars = series.len(),
                        attempt,
                        "Fetched price history"
                    );
                    return Ok(series);
                }
                Err(e) if e.is_transient() => e,
                Err(e) => {
                    tracing::error!(symbol = %symbol, "Unusable bar response: {}", e);
                    return Err(DataUnavailable::Rejected(e));
                }
            };

            tracing::error!(symbol = %symbol, "API error while fetching data: {}", error);

            if attempt >= max_attempts {
                return Err(DataUnavailable::RetriesExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.backoff_delay();
            tracing::info!(
                symbol = %symbol,
                "Retrying data fetch ({}/{}) in {:.1}s",
                attempt,
                max_attempts,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Uniform in `[1s, base_delay]`
    fn backoff_delay(&self) -> Duration {
        let ceiling = self.config.base_delay.as_secs_f64().max(1.0);
        Duration::from_secs_f64(rand::thread_rng().gen_range(1.0..=ceiling))
    }
}
