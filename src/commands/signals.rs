use crate::api::{query_signals, Timeframe};
use crate::commands::input::{load_config, load_series, write_json};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(
    bars_file: &Path,
    config_file: Option<&Path>,
    timeframe: Timeframe,
    limit: usize,
    output: Option<&Path>,
) -> Result<()> {
    let series = load_series(bars_file)?.trailing_days(timeframe.days())?;
    let config = load_config(config_file)?;
    let response = query_signals(&series, &config, limit)?;
    info!(
        "Current signal on {}: {} ({}) - {}",
        response.current_signal.date,
        response.current_signal.signal_type.as_str(),
        response.current_signal.strength.as_str(),
        response.current_signal.reason
    );
    write_json(&response, output)
}
