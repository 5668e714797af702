//! In-memory broker for unit tests.

use crate::api::Broker;
use crate::error::BrokerError;
use crate::models::{
    AccountState, Bar, MarketClock, OrderAck, OrderRequest, Symbol, Timeframe,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub fn api_error(status: u16) -> BrokerError {
    BrokerError::Api {
        status,
        message: "scripted failure".to_string(),
    }
}

/// Hourly bars starting 2024-01-01 with the given closes
pub fn bars_from(closes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
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
        .collect()
}

/// Replays queued bar responses; other calls answer from fixed settings
#[derive(Default)]
pub struct ScriptedBroker {
    pub bars: Mutex<VecDeque<Result<Vec<Bar>, BrokerError>>>,
    pub bar_calls: AtomicUsize,
    pub bar_ranges: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    pub latest_price: Option<f64>,
    pub reject_orders: bool,
    pub submitted: Mutex<Vec<OrderRequest>>,
}

impl ScriptedBroker {
    pub fn with_bars(responses: Vec<Result<Vec<Bar>, BrokerError>>) -> Self {
        Self {
            bars: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.bar_calls.load(Ordering::SeqCst)
    }
}

impl Broker for ScriptedBroker {
    async fn get_account(&self) -> Result<AccountState, BrokerError> {
        Ok(AccountState {
            id: "test".to_string(),
            status: "ACTIVE".to_string(),
            currency: "USD".to_string(),
            buying_power: 1000.0,
        })
    }

    async fn get_clock(&self) -> Result<MarketClock, BrokerError> {
        let now = Utc::now();
        Ok(MarketClock {
            timestamp: now,
            is_open: true,
            next_open: now + Duration::days(1),
            next_close: now + Duration::hours(1),
        })
    }

    async fn get_bars(
        &self,
        _symbol: &Symbol,
        _timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, BrokerError> {
        self.bar_calls.fetch_add(1, Ordering::SeqCst);
        self.bar_ranges.lock().unwrap().push((start, end));
        self.bars
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(api_error(500)))
    }

    async fn get_latest_trade(&self, _symbol: &Symbol) -> Result<f64, BrokerError> {
        self.latest_price.ok_or_else(|| api_error(503))
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        if self.reject_orders {
            return Err(api_error(422));
        }
        self.submitted.lock().unwrap().push(order.clone());
        Ok(OrderAck {
            id: Uuid::new_v4(),
            status: "accepted".to_string(),
            submitted_at: Some(Utc::now()),
        })
    }
}
