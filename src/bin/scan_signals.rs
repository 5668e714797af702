/// Print the current SMA crossover state of every configured symbol
///
/// Read-only: fetches bars once per symbol and never places an order.
///
/// Usage: cargo run --bin scan_signals -- [--config smabot.toml] [--symbols BTC/USD,ETH/USD]
use anyhow::{Context, Result};
use clap::Parser;
use smabot::api::{validate_connection, AlpacaClient};
use smabot::execution::MarketDataFetcher;
use smabot::settings::{Credentials, Settings};
use smabot::strategy::{SmaCrossover, Strategy};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "scan_signals",
    about = "Show SMA crossover state without trading"
)]
struct Args {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    symbols: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("smabot=warn")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(ref list) = args.symbols {
        settings.override_symbols(list);
        settings.validate()?;
    }

    let client = AlpacaClient::new(settings.alpaca_config(Credentials::from_env()?))?;
    let broker = Arc::new(client);
    validate_connection(broker.as_ref()).await?;

    let fetcher = MarketDataFetcher::new(broker, settings.fetch_config());
    let sma = SmaCrossover::new(settings.short_window, settings.long_window);

    println!(
        "{} ({}/{})\n",
        sma.name(),
        settings.short_window,
        settings.long_window
    );
    println!(
        "{:<12} {:>6} {:>14} {:>14} {:>14}  {}",
        "SYMBOL",
        "BARS",
        "PRICE",
        format!("SMA{}", settings.short_window),
        format!("SMA{}", settings.long_window),
        "SIGNAL"
    );
    println!("{}", "-".repeat(78));

    for symbol in settings.symbols() {
        let series = match fetcher.fetch(&symbol).await {
            Ok(series) => series,
            Err(e) => {
                println!("{:<12} {}", symbol, e);
                continue;
            }
        };

        match sma.evaluate(&series.closes()) {
            Some(cross) => {
                let signal = match (cross.buy, cross.sell) {
                    (true, _) => "BUY",
                    (_, true) => "SELL",
                    _ => "-",
                };
                println!(
                    "{:<12} {:>6} {:>14.4} {:>14.4} {:>14.4}  {}",
                    symbol,
                    series.len(),
                    cross.price,
                    cross.short_ma,
                    cross.long_ma,
                    signal
                );
            }
            None => println!(
                "{:<12} {:>6} insufficient data (need {})",
                symbol,
                series.len(),
                sma.min_samples_required()
            ),
        }
    }

    Ok(())
}
