pub mod alpaca;
pub mod broker;

pub use alpaca::{AlpacaClient, AlpacaConfig};
pub use broker::{validate_connection, Broker};
