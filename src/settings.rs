//! Layered runtime settings.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, then
//! `SMABOT_*` environment variables. Broker credentials are read separately
//! from `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY` and never stored here.

use crate::api::alpaca::{DATA_URL, DEFAULT_STOCK_FEED, PAPER_TRADING_URL};
use crate::api::AlpacaConfig;
use crate::execution::market_data::{DEFAULT_BAR_LIMIT, DEFAULT_BASE_DELAY, DEFAULT_RETRIES};
use crate::execution::{FetchConfig, DEFAULT_FEE_RATE};
use crate::models::{AssetClass, Symbol, Timeframe};
use crate::scheduler::{
    SchedulerConfig, DEFAULT_CHECK_INTERVAL, DEFAULT_DATA_DEFERRAL, DEFAULT_ERROR_BACKOFF,
    DEFAULT_MAX_CONCURRENCY, DEFAULT_ORDER_QUANTITY,
};
use crate::strategy::sma_crossover::{DEFAULT_LONG_WINDOW, DEFAULT_SHORT_WINDOW};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "smabot.toml";
pub const ENV_PREFIX: &str = "SMABOT";
pub const KEY_ID_VAR: &str = "APCA_API_KEY_ID";
pub const SECRET_KEY_VAR: &str = "APCA_API_SECRET_KEY";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("{0} not found in environment")]
    MissingCredential(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub symbols: Vec<String>,
    pub asset_class: AssetClass,
    pub timeframe: Timeframe,
    pub bar_limit: usize,
    pub short_window: usize,
    pub long_window: usize,
    /// Percent of notional
    pub fee_rate: f64,
    pub order_quantity: f64,
    pub check_interval_secs: u64,
    pub fetch_retries: u32,
    pub fetch_base_delay_secs: u64,
    pub data_deferral_secs: u64,
    pub error_backoff_secs: u64,
    pub max_concurrency: usize,
    pub trading_url: String,
    pub data_url: String,
    /// Equity data feed; free plans need `iex`
    pub stock_feed: String,
    pub rate_limit_per_minute: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC/USD".to_string(), "ETH/USD".to_string()],
            asset_class: AssetClass::Crypto,
            timeframe: Timeframe::Hour,
            bar_limit: DEFAULT_BAR_LIMIT,
            short_window: DEFAULT_SHORT_WINDOW,
            long_window: DEFAULT_LONG_WINDOW,
            fee_rate: DEFAULT_FEE_RATE,
            order_quantity: DEFAULT_ORDER_QUANTITY,
            check_interval_secs: DEFAULT_CHECK_INTERVAL.as_secs(),
            fetch_retries: DEFAULT_RETRIES,
            fetch_base_delay_secs: DEFAULT_BASE_DELAY.as_secs(),
            data_deferral_secs: DEFAULT_DATA_DEFERRAL.as_secs(),
            error_backoff_secs: DEFAULT_ERROR_BACKOFF.as_secs(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            trading_url: PAPER_TRADING_URL.to_string(),
            data_url: DATA_URL.to_string(),
            stock_feed: DEFAULT_STOCK_FEED.to_string(),
            rate_limit_per_minute: 200,
        }
    }
}

impl Settings {
    /// Load defaults, then `path` (or `smabot.toml` if present), then env
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("symbols"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid =
            |msg: String| -> Result<(), SettingsError> { Err(SettingsError::Invalid(msg)) };

        if self.symbols.iter().all(|s| s.trim().is_empty()) {
            return invalid("at least one symbol is required".to_string());
        }
        if self.short_window == 0 || self.long_window == 0 {
            return invalid("moving average windows must be positive".to_string());
        }
        if self.short_window >= self.long_window {
            return invalid(format!(
                "short_window ({}) must be less than long_window ({})",
                self.short_window, self.long_window
            ));
        }
        if self.bar_limit < self.long_window {
            return invalid(format!(
                "bar_limit ({}) must cover long_window ({})",
                self.bar_limit, self.long_window
            ));
        }
        if !(self.fee_rate >= 0.0) {
            return invalid(format!(
                "fee_rate must be non-negative, got {}",
                self.fee_rate
            ));
        }
        if !(self.order_quantity > 0.0) {
            return invalid(format!(
                "order_quantity must be positive, got {}",
                self.order_quantity
            ));
        }
        if self.fetch_retries == 0 {
            return invalid("fetch_retries must be at least 1".to_string());
        }
        for (key, secs) in [
            ("check_interval_secs", self.check_interval_secs),
            ("error_backoff_secs", self.error_backoff_secs),
            ("data_deferral_secs", self.data_deferral_secs),
        ] {
            if secs == 0 {
                return invalid(format!("{} must be at least 1", key));
            }
        }
        if self.max_concurrency == 0 {
            return invalid("max_concurrency must be at least 1".to_string());
        }
        if self.stock_feed.trim().is_empty() {
            return invalid("stock_feed must not be empty".to_string());
        }
        if self.rate_limit_per_minute == 0 {
            return invalid("rate_limit_per_minute must be at least 1".to_string());
        }

        Ok(())
    }

    /// Replace the configured symbols with a comma-separated list
    pub fn override_symbols(&mut self, list: &str) {
        self.symbols = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Symbol::from)
            .collect()
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeframe: self.timeframe,
            limit: self.bar_limit,
            retries: self.fetch_retries,
            base_delay: Duration::from_secs(self.fetch_base_delay_secs),
        }
    }

    pub fn scheduler_config(&self, dry_run: bool) -> SchedulerConfig {
        SchedulerConfig {
            fetch: self.fetch_config(),
            short_window: self.short_window,
            long_window: self.long_window,
            fee_rate: self.fee_rate,
            order_quantity: self.order_quantity,
            check_interval: Duration::from_secs(self.check_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            data_deferral: Duration::from_secs(self.data_deferral_secs),
            max_concurrency: self.max_concurrency,
            dry_run,
        }
    }

    pub fn alpaca_config(&self, credentials: Credentials) -> AlpacaConfig {
        AlpacaConfig {
            key_id: credentials.key_id,
            secret_key: credentials.secret_key,
            trading_url: self.trading_url.clone(),
            data_url: self.data_url.clone(),
            asset_class: self.asset_class,
            stock_feed: self.stock_feed.clone(),
            rate_limit_per_minute: self.rate_limit_per_minute,
        }
    }
}

/// Broker API key pair
#[derive(Clone)]
pub struct Credentials {
    pub key_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, SettingsError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(SettingsError::MissingCredential(name))
        };

        Ok(Self {
            key_id: read(KEY_ID_VAR)?,
            secret_key: read(SECRET_KEY_VAR)?,
        })
    }
}

// Keep secrets out of debug output
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
