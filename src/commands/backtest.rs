use crate::api::{run_backtest_request, BacktestRequest, Timeframe};
use crate::commands::input::{load_config, load_series, write_json};
use crate::engine::CancellationToken;
use anyhow::Result;
use log::{info, warn};
use std::path::Path;

pub struct BacktestArgs<'a> {
    pub bars_file: &'a Path,
    pub config_file: Option<&'a Path>,
    pub symbol: &'a str,
    pub timeframe: Timeframe,
    pub capital: f64,
    pub output: Option<&'a Path>,
}

pub fn run(args: BacktestArgs) -> Result<()> {
    let series = load_series(args.bars_file)?;
    let config = load_config(args.config_file)?;
    info!(
        "Loaded {} bars for {} ({} to {})",
        series.len(),
        args.symbol,
        series.start_date(),
        series.end_date()
    );

    let request = BacktestRequest {
        symbol: args.symbol.to_string(),
        timeframe: args.timeframe,
        capital: args.capital,
        config,
    };
    let response = run_backtest_request(&request, &series, &CancellationToken::new())?;

    let summary = &response.result.summary;
    info!(
        "{} {}: {} trades, return {:.2}% (benchmark {:.2}%), Sharpe {:.2}, max drawdown {:.2}%",
        response.symbol,
        response.timeframe,
        summary.total_trades,
        summary.total_return_percent,
        summary.benchmark_return_percent,
        summary.sharpe_ratio,
        summary.max_drawdown
    );
    if !response.result.skipped_entries.is_empty() {
        warn!(
            "{} entry signals were skipped",
            response.result.skipped_entries.len()
        );
    }

    write_json(&response, args.output)
}
