use crate::api::Broker;
use crate::error::BrokerError;
use crate::models::{
    AccountState, AssetClass, Bar, MarketClock, OrderAck, OrderRequest, OrderSide, OrderType,
    Symbol, TimeInForce, Timeframe,
};
use chrono::{DateTime, SecondsFormat, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use uuid::Uuid;

// Alpaca REST API
// Docs: https://docs.alpaca.markets/reference
pub const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
pub const DATA_URL: &str = "https://data.alpaca.markets";
const DEFAULT_RATE_LIMIT_RPM: u32 = 200; // Free plan: 200 requests per minute
/// Free plans may only read the IEX feed for recent equity data
pub const DEFAULT_STOCK_FEED: &str = "iex";
const PAGE_LIMIT: u32 = 10_000;
const MAX_PAGES: usize = 50;

type AlpacaRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Connection settings for [`AlpacaClient`]
#[derive(Debug, Clone)]
pub struct AlpacaConfig {
    pub key_id: String,
    pub secret_key: String,
    pub trading_url: String,
    pub data_url: String,
    pub asset_class: AssetClass,
    /// Equity data feed (`iex`, `sip`, ...); ignored for crypto
    pub stock_feed: String,
    pub rate_limit_per_minute: u32,
}

impl AlpacaConfig {
    /// Paper-trading endpoints with crypto market data
    pub fn paper(key_id: String, secret_key: String) -> Self {
        Self {
            key_id,
            secret_key,
            trading_url: PAPER_TRADING_URL.to_string(),
            data_url: DATA_URL.to_string(),
            asset_class: AssetClass::Crypto,
            stock_feed: DEFAULT_STOCK_FEED.to_string(),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_RPM,
        }
    }
}

/// Alpaca trading + market data client
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct AlpacaClient {
    client: Client,
    key_id: String,
    secret_key: String,
    trading_url: String,
    data_url: String,
    asset_class: AssetClass,
    stock_feed: String,
    rate_limiter: Arc<AlpacaRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    id: String,
    status: String,
    #[serde(default)]
    currency: Option<String>,
    buying_power: String,
}

#[derive(Debug, Deserialize)]
struct RawClock {
    timestamp: DateTime<Utc>,
    is_open: bool,
    next_open: DateTime<Utc>,
    next_close: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

#[derive(Debug, Deserialize)]
struct CryptoBarsResponse {
    #[serde(default)]
    bars: HashMap<String, Vec<RawBar>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockBarsResponse {
    #[serde(default)]
    bars: Option<Vec<RawBar>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    p: f64,
}

#[derive(Debug, Deserialize)]
struct CryptoLatestTradesResponse {
    #[serde(default)]
    trades: HashMap<String, RawTrade>,
}

#[derive(Debug, Deserialize)]
struct StockLatestTradeResponse {
    trade: RawTrade,
}

#[derive(Debug, Serialize)]
struct NewOrderBody<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    time_in_force: TimeInForce,
    client_order_id: String,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    id: String,
    status: String,
    submitted_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawAccount> for AccountState {
    type Error = BrokerError;

    fn try_from(raw: RawAccount) -> Result<Self, Self::Error> {
        let buying_power = raw.buying_power.parse::<f64>().map_err(|e| {
            BrokerError::Decode(format!("buying_power {:?}: {}", raw.buying_power, e))
        })?;

        Ok(AccountState {
            id: raw.id,
            status: raw.status,
            currency: raw.currency.unwrap_or_else(|| "USD".to_string()),
            buying_power,
        })
    }
}

impl From<RawClock> for MarketClock {
    fn from(raw: RawClock) -> Self {
        MarketClock {
            timestamp: raw.timestamp,
            is_open: raw.is_open,
            next_open: raw.next_open,
            next_close: raw.next_close,
        }
    }
}

impl TryFrom<RawBar> for Bar {
    type Error = BrokerError;

    fn try_from(raw: RawBar) -> Result<Self, Self::Error> {
        if !raw.c.is_finite() || raw.c <= 0.0 {
            return Err(BrokerError::Decode(format!(
                "bar at {} has invalid close {}",
                raw.t, raw.c
            )));
        }

        Ok(Bar {
            timestamp: raw.t,
            open: raw.o,
            high: raw.h,
            low: raw.l,
            close: raw.c,
            volume: raw.v,
        })
    }
}

impl TryFrom<RawOrder> for OrderAck {
    type Error = BrokerError;

    fn try_from(raw: RawOrder) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&raw.id)
            .map_err(|e| BrokerError::Decode(format!("order id {:?}: {}", raw.id, e)))?;

        Ok(OrderAck {
            id,
            status: raw.status,
            submitted_at: raw.submitted_at,
        })
    }
}

fn validate_price(price: f64, symbol: &Symbol) -> Result<f64, BrokerError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(BrokerError::Decode(format!(
            "latest trade for {} has invalid price {}",
            symbol, price
        )))
    }
}

// ============== Implementation ==============

impl AlpacaClient {
    pub fn new(config: AlpacaConfig) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let rpm = NonZeroU32::new(config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            key_id: config.key_id,
            secret_key: config.secret_key,
            trading_url: config.trading_url.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            asset_class: config.asset_class,
            stock_feed: config.stock_feed,
            rate_limiter,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    /// Rate-limited GET returning decoded JSON
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, BrokerError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!("GET {}", url);
        let response = self
            .authorized(self.client.get(url).query(query))
            .send()
            .await?;

        Self::decode(response).await
    }

    /// Map non-2xx to [`BrokerError::Api`], everything else through serde
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BrokerError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(BrokerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| BrokerError::Decode(e.to_string()))
    }

    /// Fetch one page of bars, returning the bars and the next page token
    async fn bars_page(
        &self,
        symbol: &Symbol,
        query: &[(&str, String)],
    ) -> Result<(Vec<RawBar>, Option<String>), BrokerError> {
        match self.asset_class {
            AssetClass::Crypto => {
                let url = format!("{}/v1beta3/crypto/us/bars", self.data_url);
                let mut response: CryptoBarsResponse = self.get_json(&url, query).await?;
                let bars = response.bars.remove(symbol.as_str()).unwrap_or_default();
                Ok((bars, response.next_page_token))
            }
            AssetClass::UsEquity => {
                let url = format!("{}/v2/stocks/{}/bars", self.data_url, symbol);
                let response: StockBarsResponse = self.get_json(&url, query).await?;
                Ok((response.bars.unwrap_or_default(), response.next_page_token))
            }
        }
    }
}

impl Broker for AlpacaClient {
    async fn get_account(&self) -> Result<AccountState, BrokerError> {
        let url = format!("{}/v2/account", self.trading_url);
        let raw: RawAccount = self.get_json(&url, &[]).await?;
        AccountState::try_from(raw)
    }

    async fn get_clock(&self) -> Result<MarketClock, BrokerError> {
        let url = format!("{}/v2/clock", self.trading_url);
        let raw: RawClock = self.get_json(&url, &[]).await?;
        Ok(raw.into())
    }

    async fn get_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, BrokerError> {
        let mut base_query = vec![
            ("timeframe", timeframe.as_api_str().to_string()),
            ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        match self.asset_class {
            AssetClass::Crypto => base_query.insert(0, ("symbols", symbol.to_string())),
            AssetClass::UsEquity => base_query.push(("feed", self.stock_feed.clone())),
        }

        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = base_query.clone();
            if let Some(token) = page_token.take() {
                query.push(("page_token", token));
            }

            let (page, next) = self.bars_page(symbol, &query).await?;
            for raw in page {
                bars.push(Bar::try_from(raw)?);
            }

            match next {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(symbol = %symbol, bars = bars.len(), "Fetched bars");
        Ok(bars)
    }

    async fn get_latest_trade(&self, symbol: &Symbol) -> Result<f64, BrokerError> {
        let price = match self.asset_class {
            AssetClass::Crypto => {
                let url = format!("{}/v1beta3/crypto/us/latest/trades", self.data_url);
                let mut response: CryptoLatestTradesResponse = self
                    .get_json(&url, &[("symbols", symbol.to_string())])
                    .await?;
                response
                    .trades
                    .remove(symbol.as_str())
                    .ok_or_else(|| BrokerError::Decode(format!("no latest trade for {}", symbol)))?
                    .p
            }
            AssetClass::UsEquity => {
                let url = format!("{}/v2/stocks/{}/trades/latest", self.data_url, symbol);
                let response: StockLatestTradeResponse = self
                    .get_json(&url, &[("feed", self.stock_feed.clone())])
                    .await?;
                response.trade.p
            }
        };

        validate_price(price, symbol)
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let url = format!("{}/v2/orders", self.trading_url);
        let body = NewOrderBody {
            symbol: order.symbol.as_str(),
            qty: order.quantity.to_string(),
            side: order.side,
            order_type: order.order_type,
            time_in_force: order.time_in_force,
            client_order_id: order.client_order_id.to_string(),
        };

        self.rate_limiter.until_ready().await;
        let response = self
            .authorized(self.client.post(&url).json(&body))
            .send()
            .await?;

        let raw: RawOrder = Self::decode(response).await?;
        OrderAck::try_from(raw)
    }
}
