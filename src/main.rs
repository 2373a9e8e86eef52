//! Stock Direction Prediction Service
//!
//! CLI entry point: train models, run one-shot predictions, or serve
//! the prediction API.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stockcast::{
    client::MarketDataClient,
    config::Config,
    model::{StockPredictor, TrainReport},
    server::{self, AppState},
    types::Period,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stockcast")]
#[command(about = "Next-day stock direction prediction service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the prediction API server
    Serve,
    /// Train a model for one ticker and save its bundle
    Train {
        /// Ticker symbol (e.g. AAPL)
        #[arg(short, long)]
        ticker: String,
        /// Historical window (1y, 2y, 5y, max, ...)
        #[arg(short, long)]
        period: Option<String>,
        /// Output bundle path (default: <models dir>/model_<TICKER>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Train and save models for every roster ticker
    TrainAll,
    /// Print a one-shot prediction for a ticker
    Predict {
        /// Ticker symbol (e.g. AAPL)
        #[arg(short, long)]
        ticker: String,
        /// Historical window (1y, 2y, 5y, max, ...)
        #[arg(short, long)]
        period: Option<String>,
        /// Model bundle to load (default: the ticker's, then the fallback's)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => run_server(config).await,
        Commands::Train {
            ticker,
            period,
            output,
        } => train_one(config, &ticker, period, output).await,
        Commands::TrainAll => train_all(config).await,
        Commands::Predict {
            ticker,
            period,
            model,
        } => predict_one(config, &ticker, period, model).await,
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting prediction service");

    let state = Arc::new(AppState::from_config(&config)?);
    if state.roster_size() == 0 {
        tracing::warn!("No model bundles found; run `stockcast train-all` first");
    }

    server::serve(state, &config.server.host, config.server.port).await?;
    Ok(())
}

fn resolve_period(config: &Config, period: Option<String>) -> anyhow::Result<Period> {
    match period {
        Some(raw) => raw.parse().map_err(anyhow::Error::msg),
        None => Ok(config.training.period),
    }
}

async fn train_one(
    config: Config,
    ticker: &str,
    period: Option<String>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let ticker = ticker.to_uppercase();
    let period = resolve_period(&config, period)?;
    let client = MarketDataClient::new(&config.data.base_url, config.data.timeout_secs)?;

    let mut predictor = StockPredictor::new(&config.training);
    let report = predictor.train(&client, &ticker, period).await?;
    print_report(&report);

    let path = output
        .unwrap_or_else(|| Path::new(&config.models.dir).join(format!("model_{}.json", ticker)));
    predictor.save(&path)?;
    println!("Model saved to {}", path.display());

    Ok(())
}

async fn train_all(config: Config) -> anyhow::Result<()> {
    let client = MarketDataClient::new(&config.data.base_url, config.data.timeout_secs)?;
    let tickers = config.models.tickers.clone();
    let mut trained = 0;

    for ticker in &tickers {
        let mut predictor = StockPredictor::new(&config.training);
        match predictor.train(&client, ticker, config.training.period).await {
            Ok(report) => {
                print_report(&report);
                let path =
                    Path::new(&config.models.dir).join(format!("model_{}.json", ticker));
                predictor.save(&path)?;
                println!("Model saved to {}\n", path.display());
                trained += 1;
            }
            Err(e) => {
                tracing::error!("Training failed for {}: {}", ticker, e);
            }
        }
    }

    println!("Trained {} of {} roster models", trained, tickers.len());
    Ok(())
}

async fn predict_one(
    config: Config,
    ticker: &str,
    period: Option<String>,
    model: Option<PathBuf>,
) -> anyhow::Result<()> {
    let ticker = ticker.to_uppercase();
    let period = resolve_period(&config, period)?;
    let client = MarketDataClient::new(&config.data.base_url, config.data.timeout_secs)?;

    let models_dir = Path::new(&config.models.dir);
    let path = model.unwrap_or_else(|| {
        let dedicated = models_dir.join(format!("model_{}.json", ticker));
        if dedicated.exists() {
            dedicated
        } else {
            models_dir.join(format!("model_{}.json", config.models.fallback))
        }
    });

    let mut predictor = StockPredictor::new(&config.training);
    predictor.load(&path)?;

    let result = predictor.predict_next_day(&client, &ticker, period).await?;

    println!("\nPrediction for tomorrow:");
    println!("  Stock:         {}", result.ticker);
    println!("  Current price: ${:.2}", result.current_price);
    println!("  Direction:     {}", result.direction);
    println!("  Confidence:    {:.1}%", result.confidence);

    Ok(())
}

fn print_report(report: &TrainReport) {
    println!("\nModel performance for {}:", report.ticker);
    println!(
        "  Training accuracy: {:.3} ({:.1}%) on {} rows",
        report.train_accuracy,
        report.train_accuracy * 100.0,
        report.n_train
    );
    println!(
        "  Testing accuracy:  {:.3} ({:.1}%) on {} rows",
        report.test_accuracy,
        report.test_accuracy * 100.0,
        report.n_test
    );

    println!("  Per-class results (test split):");
    for (name, metrics) in ["Down (0)", "Up (1)"].iter().zip(&report.class_metrics) {
        println!(
            "    {:<9} precision {:.2}  recall {:.2}  f1 {:.2}  support {}",
            name, metrics.precision, metrics.recall, metrics.f1, metrics.support
        );
    }

    if !report.feature_importance.is_empty() {
        println!("  Most important features:");
        for (name, importance) in report.feature_importance.iter().take(10) {
            println!("    {:<22} {:.4}", name, importance);
        }
    }
}
