use super::Strategy;
use crate::indicators::sma_series;
use crate::models::{PriceSeries, Signal};

pub const DEFAULT_SHORT_WINDOW: usize = 20;
pub const DEFAULT_LONG_WINDOW: usize = 50;

/// Averages and crossover flags at the most recent sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossover {
    pub buy: bool,
    pub sell: bool,
    pub price: f64,
    pub short_ma: f64,
    pub long_ma: f64,
}

/// Simple moving average crossover
///
/// Buys when the short SMA moves from at-or-below the long SMA to strictly
/// above it between the last two samples, sells on the opposite move.
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    short_window: usize,
    long_window: usize,
}

impl SmaCrossover {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        Self {
            short_window,
            long_window,
        }
    }

    pub fn short_window(&self) -> usize {
        self.short_window
    }

    pub fn long_window(&self) -> usize {
        self.long_window
    }

    /// Crossover state for a close-price sequence
    ///
    /// Returns `None` when fewer than `long_window` samples are available.
    /// A comparison involving an average whose window is not yet full counts
    /// as "not above".
    pub fn evaluate(&self, closes: &[f64]) -> Option<Crossover> {
        let n = closes.len();
        if n < self.long_window || n < 2 {
            return None;
        }

        let short = sma_series(closes, self.short_window);
        let long = sma_series(closes, self.long_window);

        let above = |i: usize| matches!((short[i], long[i]), (Some(s), Some(l)) if s > l);
        let curr = above(n - 1);
        let prev = above(n - 2);

        Some(Crossover {
            buy: !prev && curr,
            sell: prev && !curr,
            price: closes[n - 1],
            short_ma: short[n - 1]?,
            long_ma: long[n - 1]?,
        })
    }

    /// `(buy, sell)` for the latest sample of `series`
    pub fn calculate(&self, series: &PriceSeries) -> (bool, bool) {
        let Some(crossover) = self.evaluate(&series.closes()) else {
            tracing::warn!(
                symbol = %series.symbol(),
                samples = series.len(),
                needed = self.long_window,
                "Insufficient data for signal calculation"
            );
            return (false, false);
        };

        if crossover.buy || crossover.sell {
            tracing::info!(
                symbol = %series.symbol(),
                signal = if crossover.buy { "BUY" } else { "SELL" },
                price = %format!("{:.2}", crossover.price),
                short_sma = %format!("{:.2}", crossover.short_ma),
                long_sma = %format!("{:.2}", crossover.long_ma),
                "Signal generated"
            );
        } else {
            tracing::debug!(
                symbol = %series.symbol(),
                short_sma = crossover.short_ma,
                long_sma = crossover.long_ma,
                "No crossover"
            );
        }

        (crossover.buy, crossover.sell)
    }
}

impl Default for SmaCrossover {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_WINDOW, DEFAULT_LONG_WINDOW)
    }
}

impl Strategy for SmaCrossover {
    fn generate_signal(&self, series: &PriceSeries) -> Signal {
        match self.calculate(series) {
            (true, _) => Signal::Buy,
            (_, true) => Signal::Sell,
            _ => Signal::Hold,
        }
    }

    fn name(&self) -> &str {
        "SmaCrossover"
    }

    fn min_samples_required(&self) -> usize {
        self.long_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, Symbol};
    use chrono::{Duration, TimeZone, Utc};
    use rand::{Rng, SeedableRng};

    fn series_from(closes: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect();
        PriceSeries::new(Symbol::from("BTC/USD"), bars)
    }

    fn flat_then(tail: &[f64]) -> Vec<f64> {
        let mut closes = vec![100.0; 51 - tail.len()];
        closes.extend_from_slice(tail);
        closes
    }

    #[test]
    fn test_insufficient_data_is_no_signal() {
        let engine = SmaCrossover::default();

        for len in [0, 1, 20, 49] {
            let series = series_from(&vec![100.0; len]);
            assert_eq!(engine.calculate(&series), (false, false), "len {}", len);
        }
    }

    #[test]
    fn test_upward_cross_is_buy() {
        let engine = SmaCrossover::default();
        // At index 49 short (99.975) < long (99.99); at 50 short 100.025 > long 100.01
        let series = series_from(&flat_then(&[99.5, 101.0]));

        assert_eq!(engine.calculate(&series), (true, false));
        assert_eq!(engine.generate_signal(&series), Signal::Buy);
    }

    #[test]
    fn test_downward_cross_is_sell() {
        let engine = SmaCrossover::default();
        let series = series_from(&flat_then(&[100.5, 99.0]));

        assert_eq!(engine.calculate(&series), (false, true));
        assert_eq!(engine.generate_signal(&series), Signal::Sell);
    }

    #[test]
    fn test_cross_from_equal_is_buy() {
        let engine = SmaCrossover::default();
        // Equal averages count as "not above"
        let series = series_from(&flat_then(&[101.0]));

        assert_eq!(engine.calculate(&series), (true, false));
    }

    #[test]
    fn test_falling_to_equal_is_sell() {
        let engine = SmaCrossover::new(2, 3);
        // index 3: short 2.5 > long 2.0; index 4: short 2.0 == long 2.0
        let series = series_from(&[1.0, 1.0, 2.0, 3.0, 1.0]);

        assert_eq!(engine.calculate(&series), (false, true));
    }

    #[test]
    fn test_sustained_trend_has_no_signal() {
        let engine = SmaCrossover::default();
        let rising: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();

        assert_eq!(engine.calculate(&series_from(&rising)), (false, false));
        assert_eq!(engine.calculate(&series_from(&falling)), (false, false));
        assert_eq!(engine.calculate(&series_from(&[100.0; 60])), (false, false));
    }

    #[test]
    fn test_exactly_long_window_samples() {
        let engine = SmaCrossover::default();
        // Long SMA is undefined at the previous index, so prev is "not above"
        let mut closes = vec![100.0; 49];
        closes.push(101.0);

        assert_eq!(engine.calculate(&series_from(&closes)), (true, false));
    }

    #[test]
    fn test_warm_up_matches_long_window() {
        let engine = SmaCrossover::new(5, 30);

        assert_eq!(engine.name(), "SmaCrossover");
        assert_eq!(engine.min_samples_required(), 30);
        assert_eq!(
            engine.generate_signal(&series_from(&vec![100.0; 29])),
            Signal::Hold
        );
    }

    #[test]
    fn test_evaluate_reports_averages() {
        let engine = SmaCrossover::default();
        let crossover = engine.evaluate(&flat_then(&[101.0])).unwrap();

        assert_eq!(crossover.price, 101.0);
        assert!((crossover.short_ma - 100.05).abs() < 1e-9);
        assert!((crossover.long_ma - 100.02).abs() < 1e-9);
    }

    #[test]
    fn test_buy_and_sell_never_both() {
        let engine = SmaCrossover::new(5, 12);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let len = rng.gen_range(0..40);
            let mut price = 100.0;
            let closes: Vec<f64> = (0..len)
                .map(|_| {
                    price += rng.gen_range(-3.0..3.0);
                    price
                })
                .collect();

            let (buy, sell) = engine.calculate(&series_from(&closes));
            assert!(!(buy && sell));
        }
    }
}
