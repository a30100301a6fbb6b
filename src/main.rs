use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use turtle_engine::api::{Timeframe, DEFAULT_CAPITAL, DEFAULT_RECENT_SIGNALS};
use turtle_engine::commands::{backtest, signals, sweep};

#[derive(Parser)]
#[command(name = "turtle-engine")]
#[command(about = "Donchian breakout signal detection and backtesting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest the breakout strategy over a bars file
    Backtest {
        /// JSON array of daily bars
        bars_file: PathBuf,
        /// Strategy config JSON (defaults apply when omitted)
        #[arg(long = "config", value_name = "PATH")]
        config_file: Option<PathBuf>,
        /// Symbol label carried into the response
        #[arg(long, default_value = "UNKNOWN")]
        symbol: String,
        /// Trailing window to test: 1M, 3M, 6M, 1Y, 2Y or 5Y
        #[arg(long, default_value_t = Timeframe::OneYear)]
        timeframe: Timeframe,
        /// Starting capital
        #[arg(long, default_value_t = DEFAULT_CAPITAL)]
        capital: f64,
        /// Write the result JSON here instead of stdout
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Report the current signal and the most recent breakouts
    Signals {
        /// JSON array of daily bars
        bars_file: PathBuf,
        /// Strategy config JSON (defaults apply when omitted)
        #[arg(long = "config", value_name = "PATH")]
        config_file: Option<PathBuf>,
        /// Trailing window to scan
        #[arg(long, default_value_t = Timeframe::OneYear)]
        timeframe: Timeframe,
        /// Number of recent signals to list
        #[arg(long, default_value_t = DEFAULT_RECENT_SIGNALS)]
        limit: usize,
        /// Write the result JSON here instead of stdout
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Grid-search strategy parameters and rank the variants
    Sweep {
        /// JSON array of daily bars
        bars_file: PathBuf,
        /// Parameter ranges JSON: {"longBreakout": {"min": 10, "max": 55, "step": 5}, ...}
        ranges_file: PathBuf,
        /// Base strategy config JSON (defaults apply when omitted)
        #[arg(long = "config", value_name = "PATH")]
        config_file: Option<PathBuf>,
        /// Starting capital
        #[arg(long, default_value_t = DEFAULT_CAPITAL)]
        capital: f64,
        /// Number of ranked variants to print
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Also write all ranked results as JSON
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let Cli { command } = Cli::parse();

    info!("Starting turtle-engine. Backtest results are not a forecast of future returns.");

    match command {
        Commands::Backtest {
            bars_file,
            config_file,
            symbol,
            timeframe,
            capital,
            output,
        } => backtest::run(backtest::BacktestArgs {
            bars_file: &bars_file,
            config_file: config_file.as_deref(),
            symbol: &symbol,
            timeframe,
            capital,
            output: output.as_deref(),
        })?,
        Commands::Signals {
            bars_file,
            config_file,
            timeframe,
            limit,
            output,
        } => signals::run(
            &bars_file,
            config_file.as_deref(),
            timeframe,
            limit,
            output.as_deref(),
        )?,
        Commands::Sweep {
            bars_file,
            ranges_file,
            config_file,
            capital,
            top,
            output,
        } => sweep::run(sweep::SweepArgs {
            bars_file: &bars_file,
            config_file: config_file.as_deref(),
            ranges_file: &ranges_file,
            capital,
            top,
            output: output.as_deref(),
        })?,
    }

    Ok(())
}
