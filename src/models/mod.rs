use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Instrument identifier as the broker knows it (e.g. `BTC/USD`, `AAPL`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Which market-data endpoints a symbol lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Crypto,
    UsEquity,
}

/// Bar granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1Min")]
    Minute,
    #[serde(rename = "5Min")]
    FiveMinutes,
    #[serde(rename = "15Min")]
    FifteenMinutes,
    #[serde(rename = "1Hour")]
    Hour,
    #[serde(rename = "1Day")]
    Day,
}

impl Timeframe {
    /// Value of the `timeframe` query parameter
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Timeframe::Minute => "1Min",
            Timeframe::FiveMinutes => "5Min",
            Timeframe::FifteenMinutes => "15Min",
            Timeframe::Hour => "1Hour",
            Timeframe::Day => "1Day",
        }
    }

    /// Length of one bar
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Minute => Duration::minutes(1),
            Timeframe::FiveMinutes => Duration::minutes(5),
            Timeframe::FifteenMinutes => Duration::minutes(15),
            Timeframe::Hour => Duration::hours(1),
            Timeframe::Day => Duration::days(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

/// OHLCV bar. Only `close` feeds the crossover signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bars for one symbol, strictly ascending by timestamp
///
/// The constructor sorts the input and drops duplicate timestamps (the last
/// bar received for a timestamp wins), so every `PriceSeries` upholds the
/// ordering invariant regardless of how the broker returned the data.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: Symbol,
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(symbol: Symbol, mut bars: Vec<Bar>) -> Self {
        // Stable sort keeps arrival order among equal timestamps
        bars.sort_by_key(|bar| bar.timestamp);

        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }

        Self {
            symbol,
            bars: deduped,
        }
    }

    /// Keep only the most recent `limit` bars
    pub fn tail(mut self, limit: usize) -> Self {
        if self.bars.len() > limit {
            self.bars.drain(..self.bars.len() - limit);
        }
        self
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    /// No crossover between the last two samples
    Hold,
}

/// Trading session state as reported by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketClock {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
}

impl MarketClock {
    /// Time from the broker's `timestamp` to the next open (negative if stale)
    pub fn time_until_open(&self) -> Duration {
        self.next_open - self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub id: String,
    pub status: String,
    pub currency: String,
    pub buying_power: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("buy"),
            OrderSide::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good till cancelled
    Gtc,
}

/// What gets sent to the broker
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub quantity: f64,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub client_order_id: Uuid,
}

impl OrderRequest {
    /// Market order, good till cancelled
    pub fn market(symbol: Symbol, quantity: f64, side: OrderSide) -> Self {
        Self {
            symbol,
            quantity,
            side,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Gtc,
            client_order_id: Uuid::new_v4(),
        }
    }
}

/// Broker acknowledgement of a submitted order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub id: Uuid,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// A submitted order together with the fee estimate made before submission
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub client_order_id: Uuid,
    pub symbol: Symbol,
    pub quantity: f64,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Latest trade price used for the fee estimate
    pub reference_price: f64,
    pub estimated_fee: f64,
}
