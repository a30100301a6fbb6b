use crate::config::StrategyConfig;
use crate::models::Bar;
use crate::param_utils::ParameterRange;
use crate::series::PriceSeries;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reads a JSON array of daily bars and validates it into a series.
pub fn load_series(path: &Path) -> Result<PriceSeries> {
    if !path.exists() {
        return Err(anyhow!("Bars file not found at {}", path.display()));
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read bars file {}", path.display()))?;
    let bars: Vec<Bar> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to decode bars from {}", path.display()))?;
    let series = PriceSeries::new(bars)
        .with_context(|| format!("Bars in {} are not a valid series", path.display()))?;
    Ok(series)
}

/// Reads a strategy config, falling back to defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<StrategyConfig> {
    let Some(path) = path else {
        return Ok(StrategyConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: StrategyConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to decode config from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Config in {} is invalid", path.display()))?;
    Ok(config)
}

/// Reads `{"name": {"min": .., "max": .., "step": ..}, ...}`.
pub fn load_ranges(path: &Path) -> Result<HashMap<String, ParameterRange>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ranges file {}", path.display()))?;
    let ranges: HashMap<String, ParameterRange> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to decode parameter ranges from {}", path.display()))?;
    if ranges.is_empty() {
        return Err(anyhow!("No parameter ranges defined in {}", path.display()));
    }
    Ok(ranges)
}

/// Pretty-prints `value` to `output`, or to stdout when no path is given.
pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
        }
        None => println!("{}", json),
    }
    Ok(())
}
