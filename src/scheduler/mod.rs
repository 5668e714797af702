//! Trading loop.
//!
//! Each pass checks the market clock. While the market is closed the loop
//! sleeps until the next open (capped at the check interval). While it is open
//! every symbol is processed in its own task, all tasks are joined, and the
//! loop sleeps for the check interval. A loop-level error costs a fixed
//! backoff and never ends the process. Only the shutdown signal stops the
//! loop, and only between cycles.

pub mod worker;

pub use worker::{SymbolOutcome, SymbolWorker};

use crate::api::Broker;
use crate::error::LoopError;
use crate::execution::{FetchConfig, MarketDataFetcher, OrderExecutor, DEFAULT_FEE_RATE};
use crate::models::{MarketClock, Symbol};
use crate::strategy::SmaCrossover;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(900);
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(300);
pub const DEFAULT_DATA_DEFERRAL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_ORDER_QUANTITY: f64 = 1.0;

// Floor for every loop wait, so a stale next_open or a zero interval never
// turns the loop into a busy poll of the broker
const MIN_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub fetch: FetchConfig,
    pub short_window: usize,
    pub long_window: usize,
    pub fee_rate: f64,
    pub order_quantity: f64,
    pub check_interval: Duration,
    pub error_backoff: Duration,
    pub data_deferral: Duration,
    pub max_concurrency: usize,
    pub dry_run: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let signals = SmaCrossover::default();
        Self {
            fetch: FetchConfig::default(),
            short_window: signals.short_window(),
            long_window: signals.long_window(),
            fee_rate: DEFAULT_FEE_RATE,
            order_quantity: DEFAULT_ORDER_QUANTITY,
            check_interval: DEFAULT_CHECK_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            data_deferral: DEFAULT_DATA_DEFERRAL,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            dry_run: false,
        }
    }
}

/// Per-cycle tally of symbol outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub orders_placed: usize,
    pub dry_run_orders: usize,
    pub order_failures: usize,
    pub no_signal: usize,
    pub deferred: usize,
    /// Tasks that panicked or were cancelled
    pub task_failures: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: SymbolOutcome) {
        match outcome {
            SymbolOutcome::OrderPlaced(_) => self.orders_placed += 1,
            SymbolOutcome::DryRun(_) => self.dry_run_orders += 1,
            SymbolOutcome::OrderFailed(_) => self.order_failures += 1,
            SymbolOutcome::NoSignal => self.no_signal += 1,
            SymbolOutcome::Deferred => self.deferred += 1,
        }
    }
}

/// Result of one CheckClock pass
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    MarketClosed {
        next_open: DateTime<Utc>,
        wait: Duration,
    },
    Cycle(CycleReport),
}

/// Sleep for `duration` unless shutdown is requested first
///
/// Returns `false` if the sleep was cut short. A dropped sender counts as a
/// shutdown request.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}

pub struct Scheduler<B> {
    broker: Arc<B>,
    symbols: Vec<Symbol>,
    worker: Arc<SymbolWorker<B>>,
    config: SchedulerConfig,
    shutdown: watch::Receiver<bool>,
}

impl<B: Broker + 'static> Scheduler<B> {
    pub fn new(
        broker: Arc<B>,
        symbols: Vec<Symbol>,
        config: SchedulerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let worker = SymbolWorker {
            fetcher: MarketDataFetcher::new(broker.clone(), config.fetch.clone()),
            signals: SmaCrossover::new(config.short_window, config.long_window),
            executor: OrderExecutor::new(broker.clone(), config.fee_rate),
            order_quantity: config.order_quantity,
            data_deferral: config.data_deferral,
            dry_run: config.dry_run,
        };

        Self {
            broker,
            symbols,
            worker: Arc::new(worker),
            config,
            shutdown,
        }
    }

    /// Run until shutdown is signalled
    pub async fn run(&self) {
        let names: Vec<&str> = self.symbols.iter().map(Symbol::as_str).collect();
        tracing::info!("Starting trading bot for {}", names.join(", "));

        let mut shutdown = self.shutdown.clone();

        loop {
            let wait = match self.step().await {
                Ok(Step::MarketClosed { next_open, wait }) => {
                    tracing::info!(
                        "Market is closed. Next opening at {}, checking again in {}s",
                        next_open.format("%Y-%m-%d %H:%M:%S"),
                        wait.as_secs()
                    );
                    wait
                }
                Ok(Step::Cycle(report)) => {
                    tracing::info!(
                        orders = report.orders_placed,
                        dry_run = report.dry_run_orders,
                        failed = report.order_failures,
                        no_signal = report.no_signal,
                        deferred = report.deferred,
                        crashed = report.task_failures,
                        "Cycle complete, next in {}s",
                        self.config.check_interval.as_secs()
                    );
                    self.config.check_interval
                }
                Err(e) => {
                    tracing::error!(
                        "Error in main loop: {}, retrying in {}s",
                        e,
                        self.config.error_backoff.as_secs()
                    );
                    self.config.error_backoff
                }
            };

            if !sleep_or_shutdown(wait.max(MIN_WAIT), &mut shutdown).await {
                break;
            }
        }

        tracing::info!("Stopping trading bot...");
    }

    /// Check the clock and, if the market is open, process one cycle
    pub async fn step(&self) -> Result<Step, LoopError> {
        let clock = self.broker.get_clock().await.map_err(LoopError::Clock)?;

        if !clock.is_open {
            return Ok(Step::MarketClosed {
                next_open: clock.next_open,
                wait: self.closed_wait(&clock),
            });
        }

        Ok(Step::Cycle(self.process_cycle().await))
    }

    /// `min(check_interval, next_open - now)`, using the broker's notion of now
    pub fn closed_wait(&self, clock: &MarketClock) -> Duration {
        let until_open = clock
            .time_until_open()
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(MIN_WAIT);

        until_open.min(self.config.check_interval)
    }

    /// Fan out one task per symbol and wait for all of them
    pub async fn process_cycle(&self) -> CycleReport {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for symbol in &self.symbols {
            let worker = self.worker.clone();
            let permits = permits.clone();
            let shutdown = self.shutdown.clone();
            let symbol = symbol.clone();

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                worker.process_symbol(&symbol, shutdown).await
            });
        }

        let mut report = CycleReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::error!("Error processing symbol: {}", e);
                    report.task_failures += 1;
                }
            }
        }

        report
    }
}
