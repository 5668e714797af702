#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use smabot::error::BrokerError;
use smabot::models::{
    AccountState, Bar, MarketClock, OrderAck, OrderRequest, Symbol, Timeframe,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

/// In-memory broker with per-symbol bar scripts
pub struct MockBroker {
    pub market_open: bool,
    /// Minutes from the clock timestamp to the next open, when closed
    pub minutes_to_open: i64,
    pub bars: HashMap<String, Vec<Bar>>,
    /// Symbols whose bar request fails with a malformed response
    pub broken: HashSet<String>,
    /// Symbols whose bar request panics
    pub panics: HashSet<String>,
    pub price: f64,
    /// Every call fails with a server error
    pub fail_all: bool,
    pub clock_calls: AtomicUsize,
    pub bar_calls: AtomicUsize,
    pub clock_times: Mutex<Vec<tokio::time::Instant>>,
    pub orders: Mutex<Vec<OrderRequest>>,
    shutdown_after: Option<(usize, watch::Sender<bool>)>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            market_open: true,
            minutes_to_open: 0,
            bars: HashMap::new(),
            broken: HashSet::new(),
            panics: HashSet::new(),
            price: 100.0,
            fail_all: false,
            clock_calls: AtomicUsize::new(0),
            bar_calls: AtomicUsize::new(0),
            clock_times: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            shutdown_after: None,
        }
    }

    pub fn closed(mut self, minutes_to_open: i64) -> Self {
        self.market_open = false;
        self.minutes_to_open = minutes_to_open;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn with_closes(mut self, symbol: &str, closes: &[f64]) -> Self {
        self.bars.insert(symbol.to_string(), hourly_bars(closes));
        self
    }

    pub fn with_broken(mut self, symbol: &str) -> Self {
        self.broken.insert(symbol.to_string());
        self
    }

    pub fn with_panic(mut self, symbol: &str) -> Self {
        self.panics.insert(symbol.to_string());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    /// Request shutdown on the `n`th clock call
    pub fn shutdown_after(mut self, n: usize, tx: watch::Sender<bool>) -> Self {
        self.shutdown_after = Some((n, tx));
        self
    }

    pub fn clock_count(&self) -> usize {
        self.clock_calls.load(Ordering::SeqCst)
    }

    pub fn bar_count(&self) -> usize {
        self.bar_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    /// Virtual-time gaps between consecutive clock calls
    pub fn clock_gaps(&self) -> Vec<std::time::Duration> {
        let times = self.clock_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn server_error() -> BrokerError {
        BrokerError::Api {
            status: 500,
            message: "internal server error".to_string(),
        }
    }
}

impl smabot::Broker for MockBroker {
    async fn get_account(&self) -> Result<AccountState, BrokerError> {
        if self.fail_all {
            return Err(Self::server_error());
        }
        Ok(AccountState {
            id: "mock-account".to_string(),
            status: "ACTIVE".to_string(),
            currency: "USD".to_string(),
            buying_power: 100_000.0,
        })
    }

    async fn get_clock(&self) -> Result<MarketClock, BrokerError> {
        let calls = self.clock_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.clock_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());

        if let Some((n, tx)) = &self.shutdown_after {
            if calls >= *n {
                let _ = tx.send(true);
            }
        }

        if self.fail_all {
            return Err(Self::server_error());
        }

        let now = Utc::now();
        Ok(MarketClock {
            timestamp: now,
            is_open: self.market_open,
            next_open: now + Duration::minutes(self.minutes_to_open),
            next_close: now + Duration::hours(8),
        })
    }

    async fn get_bars(
        &self,
        symbol: &Symbol,
        _timeframe: Timeframe,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, BrokerError> {
        self.bar_calls.fetch_add(1, Ordering::SeqCst);

        if self.panics.contains(symbol.as_str()) {
            panic!("mock broker blew up on {}", symbol);
        }
        if self.fail_all {
            return Err(Self::server_error());
        }
        if self.broken.contains(symbol.as_str()) {
            return Err(BrokerError::Decode("close is not a number".to_string()));
        }

        Ok(self.bars.get(symbol.as_str()).cloned().unwrap_or_default())
    }

    async fn get_latest_trade(&self, _symbol: &Symbol) -> Result<f64, BrokerError> {
        if self.fail_all {
            return Err(Self::server_error());
        }
        Ok(self.price)
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        if self.fail_all {
            return Err(Self::server_error());
        }
        self.orders.lock().unwrap().push(order.clone());
        Ok(OrderAck {
            id: Uuid::new_v4(),
            status: "accepted".to_string(),
            submitted_at: Some(Utc::now()),
        })
    }
}

pub fn hourly_bars(closes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + Duration::hours(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        })
        .collect()
}

/// 50 flat closes at 100 followed by one at 101: the short average crosses up
pub fn crossing_up() -> Vec<f64> {
    let mut closes = vec![100.0; 50];
    closes.push(101.0);
    closes
}
