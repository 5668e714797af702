//! Error taxonomy for the bot.
//!
//! Errors are handled at the lowest level that can decide between retry, skip
//! and abort. Only [`ConnectivityError`] ends the process.

/// Failure reported by a [`crate::api::Broker`] call
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The API answered with a non-success status
    #[error("broker API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response arrived but could not be turned into typed data
    #[error("malformed broker response: {0}")]
    Decode(String),
}

impl BrokerError {
    /// API and transport errors are worth another attempt, malformed data is not
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Api { .. } | BrokerError::Transport(_))
    }
}

/// Startup account check failed
#[derive(Debug, thiserror::Error)]
#[error("failed to connect to broker: {0}")]
pub struct ConnectivityError(#[source] pub BrokerError);

/// No usable price series this cycle
#[derive(Debug, thiserror::Error)]
pub enum DataUnavailable {
    #[error("no bars returned")]
    Empty,

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: BrokerError,
    },

    #[error("bar request rejected: {0}")]
    Rejected(#[source] BrokerError),
}

/// Order could not be placed; never fatal
#[derive(Debug, thiserror::Error)]
pub enum OrderFailure {
    #[error("latest trade unavailable: {0}")]
    PriceUnavailable(#[source] BrokerError),

    #[error("order submission failed: {0}")]
    Rejected(#[source] BrokerError),
}

/// Error surfacing at scheduler level, recovered with a fixed backoff
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("market clock unavailable: {0}")]
    Clock(#[source] BrokerError),
}
