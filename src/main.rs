use anyhow::{Context, Result};
use clap::Parser;
use smabot::api::{validate_connection, AlpacaClient};
use smabot::scheduler::{Scheduler, Step};
use smabot::settings::{Credentials, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "smabot", about = "SMA crossover trading bot")]
struct Cli {
    /// Settings file (defaults to smabot.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated symbols, overriding the settings file
    #[arg(short, long)]
    symbols: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log signals and would-be orders without submitting anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(ref list) = cli.symbols {
        settings.override_symbols(list);
        settings.validate()?;
    }

    tracing::info!("🚀 SMA crossover bot starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Symbols: {}", settings.symbols.join(", "));
    tracing::info!(
        "  SMA windows: {}/{} on {} bars",
        settings.short_window,
        settings.long_window,
        settings.timeframe
    );
    tracing::info!("  Check interval: {}s", settings.check_interval_secs);
    if cli.dry_run {
        tracing::info!("  Dry run: orders will NOT be submitted");
    }

    let credentials = Credentials::from_env()?;
    let client = AlpacaClient::new(settings.alpaca_config(credentials))
        .context("Failed to build broker client")?;
    let broker = Arc::new(client);

    validate_connection(broker.as_ref()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(
        broker,
        settings.symbols(),
        settings.scheduler_config(cli.dry_run),
        shutdown_rx,
    );

    if cli.once {
        match scheduler.step().await? {
            Step::MarketClosed { next_open, .. } => {
                tracing::info!(
                    "Market is closed. Next opening at {}",
                    next_open.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Step::Cycle(report) => {
                tracing::info!("✅ Single cycle complete: {:?}", report);
            }
        }
        return Ok(());
    }

    let mut run_task = tokio::spawn(async move { scheduler.run().await });
    tracing::info!("Press Ctrl+C to stop...");

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        result = &mut run_task => {
            tracing::error!("Trading loop exited: {:?}", result);
            false
        }
    };

    if interrupted {
        tracing::info!("⚠️  Received Ctrl+C, finishing current cycle...");
        // Receiver may already be gone if the loop ended
        let _ = shutdown_tx.send(true);
        if let Err(e) = run_task.await {
            tracing::error!("Trading loop exited abnormally: {}", e);
        }
    }

    tracing::info!("👋 Bot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("smabot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
