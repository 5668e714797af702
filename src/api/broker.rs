use crate::error::{BrokerError, ConnectivityError};
use crate::models::{AccountState, Bar, MarketClock, OrderAck, OrderRequest, Symbol, Timeframe};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Everything the trading loop needs from a broker
///
/// One handle is shared by all per-symbol tasks of a cycle, so implementations
/// must be safe to call concurrently.
pub trait Broker: Send + Sync {
    /// Account status, used once at startup to validate connectivity
    fn get_account(&self) -> impl Future<Output = Result<AccountState, BrokerError>> + Send;

    fn get_clock(&self) -> impl Future<Output = Result<MarketClock, BrokerError>> + Send;

    /// Bars in `[start, end]`; an empty vector is a valid answer
    fn get_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Bar>, BrokerError>> + Send;

    /// Price of the most recent trade
    fn get_latest_trade(
        &self,
        symbol: &Symbol,
    ) -> impl Future<Output = Result<f64, BrokerError>> + Send;

    fn submit_order(
        &self,
        order: &OrderRequest,
    ) -> impl Future<Output = Result<OrderAck, BrokerError>> + Send;
}

/// Fetch the account once to prove the credentials and endpoint work
///
/// Any failure here is fatal to the caller.
pub async fn validate_connection<B: Broker>(
    broker: &B,
) -> Result<AccountState, ConnectivityError> {
    match broker.get_account().await {
        Ok(account) => {
            tracing::info!(
                status = %account.status,
                currency = %account.currency,
                "Successfully connected to broker. Buying power: ${:.2}",
                account.buying_power
            );
            Ok(account)
        }
        Err(e) => {
            tracing::error!("Failed to connect to broker: {}", e);
            Err(ConnectivityError(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBroker;

    #[tokio::test]
    async fn test_validate_connection_returns_account() {
        let account = validate_connection(&ScriptedBroker::default()).await.unwrap();
        assert_eq!(account.status, "ACTIVE");
        assert_eq!(account.buying_power, 1000.0);
    }
}
