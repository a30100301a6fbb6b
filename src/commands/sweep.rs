use crate::commands::input::{load_config, load_ranges, load_series, write_json};
use crate::engine::CancellationToken;
use crate::optimizer::{print_results, ParameterSweep};
use anyhow::{anyhow, Result};
use log::info;
use std::path::Path;

pub struct SweepArgs<'a> {
    pub bars_file: &'a Path,
    pub config_file: Option<&'a Path>,
    pub ranges_file: &'a Path,
    pub capital: f64,
    pub top: usize,
    pub output: Option<&'a Path>,
}

pub fn run(args: SweepArgs) -> Result<()> {
    let series = load_series(args.bars_file)?;
    let base = load_config(args.config_file)?;
    let ranges = load_ranges(args.ranges_file)?;

    let mut names: Vec<&String> = ranges.keys().collect();
    names.sort();
    info!(
        "Sweeping {} parameters ({}) over {} bars",
        names.len(),
        names
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        series.len()
    );

    let sweep = ParameterSweep::new(base, &series, args.capital).with_progress(true);
    let results = sweep.run(&ranges, &CancellationToken::new());
    if results.is_empty() {
        return Err(anyhow!("No parameter variation produced a result"));
    }

    print_results(&results, args.top);
    if args.output.is_some() {
        write_json(&results, args.output)?;
    }
    Ok(())
}
