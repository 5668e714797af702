// Trading strategy module
pub mod sma_crossover;

pub use sma_crossover::{Crossover, SmaCrossover};

use crate::models::{PriceSeries, Signal};

/// Base trait for trading strategies
pub trait Strategy: Send + Sync {
    /// Signal for the most recent sample; insufficient data yields `Hold`
    fn generate_signal(&self, series: &PriceSeries) -> Signal;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum samples before a signal can fire
    fn min_samples_required(&self) -> usize;
}
