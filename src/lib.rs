// Core modules
pub mod api;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod scheduler;
pub mod settings;
pub mod strategy;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use api::{AlpacaClient, AlpacaConfig, Broker};
pub use error::{BrokerError, ConnectivityError, DataUnavailable, LoopError, OrderFailure};
pub use models::*;
pub use scheduler::{CycleReport, Scheduler, SchedulerConfig, Step};
pub use settings::{Credentials, Settings};
pub use strategy::Strategy;
