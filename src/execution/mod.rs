// Data collection and order execution module
pub mod executor;
pub mod market_data;

pub use executor::{estimate_fee, OrderExecutor, OrderPreview, DEFAULT_FEE_RATE};
pub use market_data::{FetchConfig, MarketDataFetcher};
