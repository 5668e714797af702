use crate::api::Broker;
use crate::error::OrderFailure;
use crate::models::{Order, OrderRequest, OrderSide, Symbol};
use std::sync::Arc;

/// Fee rate in percent of notional (0.25 = 0.25%)
pub const DEFAULT_FEE_RATE: f64 = 0.25;

/// Estimated transaction fee for `quantity` units at `price`
///
/// Informational only: nothing is deducted from the order or checked against
/// buying power.
pub fn estimate_fee(quantity: f64, price: f64, fee_rate_pct: f64) -> f64 {
    quantity * price * (fee_rate_pct / 100.0)
}

/// What an order would look like, without submitting it
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPreview {
    pub symbol: Symbol,
    pub quantity: f64,
    pub side: OrderSide,
    pub reference_price: f64,
    pub estimated_fee: f64,
}

/// Places market orders through the broker, logging a fee estimate first
pub struct OrderExecutor<B> {
    broker: Arc<B>,
    fee_rate: f64,
}

impl<B: Broker> OrderExecutor<B> {
    pub fn new(broker: Arc<B>, fee_rate: f64) -> Self {
        Self { broker, fee_rate }
    }

    /// Price the order from the latest trade without submitting it
    pub async fn preview_order(
        &self,
        symbol: &Symbol,
        quantity: f64,
        side: OrderSide,
    ) -> Result<OrderPreview, OrderFailure> {
        let reference_price = match self.broker.get_latest_trade(symbol).await {
            Ok(price) => price,
            Err(e) => {
                tracing::error!(symbol = %symbol, "Failed to fetch latest trade: {}", e);
                return Err(OrderFailure::PriceUnavailable(e));
            }
        };

        let estimated_fee = estimate_fee(quantity, reference_price, self.fee_rate);
        tracing::info!(
            symbol = %symbol,
            "Estimated fee for {} {}: {:.6}",
            quantity,
            symbol,
            estimated_fee
        );

        Ok(OrderPreview {
            symbol: symbol.clone(),
            quantity,
            side,
            reference_price,
            estimated_fee,
        })
    }

    /// Submit a market, good-till-cancelled order
    ///
    /// Failures are logged and returned; they never abort the caller's cycle.
    pub async fn place_order(
        &self,
        symbol: &Symbol,
        quantity: f64,
        side: OrderSide,
    ) -> Result<Order, OrderFailure> {
        let preview = self.preview_order(symbol, quantity, side).await?;
        let request = OrderRequest::market(symbol.clone(), quantity, side);

        let ack = match self.broker.submit_order(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!(symbol = %symbol, side = %side, "Error placing order: {}", e);
                return Err(OrderFailure::Rejected(e));
            }
        };

        tracing::info!(
            symbol = %symbol,
            order_id = %ack.id,
            status = %ack.status,
            "Order placed: {} {} of {} at ~${:.2}",
            side,
            quantity,
            symbol,
            preview.reference_price
        );

        Ok(Order {
            id: ack.id,
            client_order_id: request.client_order_id,
            symbol: request.symbol,
            quantity,
            side,
            order_type: request.order_type,
            time_in_force: request.time_in_force,
            status: ack.status,
            submitted_at: ack.submitted_at,
            reference_price: preview.reference_price,
            estimated_fee: preview.estimated_fee,
        })
    }
}
