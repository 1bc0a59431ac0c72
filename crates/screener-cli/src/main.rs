//! screener: multi-horizon equity screen over local market data.
//!
//! Reads `universe.csv`, per-ticker price histories, fundamentals,
//! statements and external signals from the data directory, runs the
//! fundamental, deep-value, technical and quant stages, and writes one table
//! per stage plus short, medium and long portfolios.
//!
//! Usage:
//!   cargo run -p screener-cli -- --data-dir data --output-dir output
//!   cargo run -p screener-cli -- --seed 7 --top-n 50

mod config;
mod data;
mod pipeline;
mod report;

use anyhow::Result;
use clap::Parser;
use config::ScreenerConfig;
use pipeline::Pipeline;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "screener", about = "Multi-horizon equity screener and portfolio partitioner")]
struct Cli {
    /// Directory holding universe.csv, prices/, fundamentals.csv and friends.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Where stage tables, portfolios and the run summary are written.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Monte Carlo seed. Overrides SCREENER_VAR_SEED.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of technical leaders sent to the quant stage. Overrides
    /// SCREENER_QUANT_TOP_N.
    #[arg(long)]
    top_n: Option<usize>,
}

fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("screener_cli=info,quant_analysis=info"))
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = ScreenerConfig::from_env()?;
    if let Some(seed) = cli.seed {
        config.var_seed = seed;
    }
    if let Some(top_n) = cli.top_n {
        config.quant_top_n = top_n;
    }
    info!(?config, data_dir = %cli.data_dir.display(), "Starting screen");

    let (portfolios, _summary) = Pipeline::new(config, &cli.data_dir, &cli.output_dir).run()?;

    for bucket in portfolios.buckets() {
        println!("{} ({} holdings)", bucket.horizon.name().to_uppercase(), bucket.len());
        for holding in &bucket.holdings {
            println!("  {:<8} {:>5.1}%", holding.ticker(), holding.position_pct());
        }
    }
    info!(output_dir = %cli.output_dir.display(), "Screen complete");
    Ok(())
}
