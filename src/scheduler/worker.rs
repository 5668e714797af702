use super::sleep_or_shutdown;
use crate::api::Broker;
use crate::execution::{MarketDataFetcher, OrderExecutor};
use crate::models::{OrderSide, Symbol};
use crate::strategy::SmaCrossover;
use std::time::Duration;
use tokio::sync::watch;

/// What one symbol's task did during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOutcome {
    OrderPlaced(OrderSide),
    /// Order would have been placed, but dry run is on
    DryRun(OrderSide),
    OrderFailed(OrderSide),
    NoSignal,
    /// Data was unavailable; the task waited out the deferral
    Deferred,
}

/// Fetch → signal → order pipeline shared by every per-symbol task
pub struct SymbolWorker<B> {
    pub(super) fetcher: MarketDataFetcher<B>,
    pub(super) signals: SmaCrossover,
    pub(super) executor: OrderExecutor<B>,
    pub(super) order_quantity: f64,
    pub(super) data_deferral: Duration,
    pub(super) dry_run: bool,
}

impl<B: Broker> SymbolWorker<B> {
    pub async fn process_symbol(
        &self,
        symbol: &Symbol,
        mut shutdown: watch::Receiver<bool>,
    ) -> SymbolOutcome {
        let series = match self.fetcher.fetch(symbol).await {
            Ok(series) => series,
            Err(e) => {
                tracing::error!(
                    symbol = %symbol,
                    "Failed to fetch data ({}), retrying in {}s",
                    e,
                    self.data_deferral.as_secs()
                );
                sleep_or_shutdown(self.data_deferral, &mut shutdown).await;
                return SymbolOutcome::Deferred;
            }
        };

        let side = match self.signals.calculate(&series) {
            (true, _) => OrderSide::Buy,
            (_, true) => OrderSide::Sell,
            _ => {
                tracing::info!(symbol = %symbol, "No trading signals");
                return SymbolOutcome::NoSignal;
            }
        };

        tracing::info!(symbol = %symbol, "{} signal detected", side);

        if self.dry_run {
            return match self
                .executor
                .preview_order(symbol, self.order_quantity, side)
                .await
            {
                Ok(preview) => {
                    tracing::info!(
                        symbol = %symbol,
                        "Dry run: would {} {} at ~${:.2} (fee ~{:.6})",
                        side,
                        preview.quantity,
                        preview.reference_price,
                        preview.estimated_fee
                    );
                    SymbolOutcome::DryRun(side)
                }
                Err(_) => SymbolOutcome::OrderFailed(side),
            };
        }

        match self
            .executor
            .place_order(symbol, self.order_quantity, side)
            .await
        {
            Ok(_) => SymbolOutcome::OrderPlaced(side),
            // Already logged by the executor
            Err(_) => SymbolOutcome::OrderFailed(side),
        }
    }
}
