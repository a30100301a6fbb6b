use crate::config::StrategyConfig;
use crate::engine::{BacktestEngine, CancellationToken};
use crate::param_utils::{
    expand_parameter_grid, parameter_is_inactive, parameter_signature, ParameterRange,
};
use crate::series::PriceSeries;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub parameters: BTreeMap<String, f64>,
    pub sharpe_ratio: f64,
    pub total_return: f64,
    pub total_return_percent: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
}

/// One grid point: the overrides that produced it and the resulting config.
#[derive(Debug, Clone)]
pub struct Variation {
    pub parameters: HashMap<String, f64>,
    pub config: StrategyConfig,
}

/// Grid search over strategy parameters for a single series. Every variation
/// gets its own engine and run state, so they backtest in parallel without
/// sharing anything mutable.
pub struct ParameterSweep<'a> {
    base: StrategyConfig,
    series: &'a PriceSeries,
    capital: f64,
    show_progress: bool,
}

impl<'a> ParameterSweep<'a> {
    pub fn new(base: StrategyConfig, series: &'a PriceSeries, capital: f64) -> Self {
        Self {
            base,
            series,
            capital,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Expands the grid, drops parameters with no effect under the variation's
    /// flags, removes duplicates and skips configs that fail validation.
    pub fn build_variations(&self, ranges: &HashMap<String, ParameterRange>) -> Vec<Variation> {
        let mut seen = HashSet::new();
        let mut variations = Vec::new();
        let mut invalid = 0usize;

        for mut parameters in expand_parameter_grid(ranges) {
            let flags = self.flag_context(&parameters);
            parameters.retain(|name, _| !parameter_is_inactive(name, &flags));

            if !seen.insert(parameter_signature(&parameters)) {
                continue;
            }

            let config = self.base.with_parameters(&parameters);
            match config.validate() {
                Ok(()) => variations.push(Variation { parameters, config }),
                Err(err) => {
                    invalid += 1;
                    debug!("Skipping variation {:?}: {}", parameters, err);
                }
            }
        }

        if invalid > 0 {
            warn!("Skipped {} invalid parameter variations", invalid);
        }
        variations
    }

    fn flag_context(&self, parameters: &HashMap<String, f64>) -> HashMap<String, f64> {
        let mut flags = parameters.clone();
        let base_flags = [
            ("useTrailingStop", self.base.use_trailing_stop),
            ("useVolatilityFilter", self.base.use_volatility_filter),
            ("allowShortSelling", self.base.allow_short_selling),
        ];
        for (name, value) in base_flags {
            flags
                .entry(name.to_string())
                .or_insert(if value { 1.0 } else { 0.0 });
        }
        flags
    }

    pub fn run(
        &self,
        ranges: &HashMap<String, ParameterRange>,
        cancel: &CancellationToken,
    ) -> Vec<OptimizationResult> {
        let variations = self.build_variations(ranges);
        if variations.is_empty() {
            warn!("No valid parameter variations to test");
            return Vec::new();
        }
        info!("Running {} backtests...", variations.len());

        let pb = if self.show_progress {
            let pb = ProgressBar::new(variations.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let outcomes: Vec<Option<OptimizationResult>> = variations
            .par_iter()
            .map(|variation| {
                let outcome = self.run_variation(variation, cancel);
                pb.inc(1);
                outcome
            })
            .collect();

        let failed = outcomes.iter().filter(|outcome| outcome.is_none()).count();
        if failed > 0 {
            warn!("Backtesting completed with {} failed variations", failed);
            pb.finish_with_message("Backtesting completed with errors");
        } else {
            pb.finish_with_message("Backtesting completed");
        }

        let mut results: Vec<OptimizationResult> = outcomes.into_iter().flatten().collect();
        rank_results(&mut results);
        results
    }

    fn run_variation(
        &self,
        variation: &Variation,
        cancel: &CancellationToken,
    ) -> Option<OptimizationResult> {
        let engine = match BacktestEngine::new(variation.config.clone()) {
            Ok(engine) => engine,
            Err(err) => {
                warn!("Variation {:?} rejected: {}", variation.parameters, err);
                return None;
            }
        };
        let result = match engine.run_with_cancellation(self.series, self.capital, cancel) {
            Ok(result) => result,
            Err(err) => {
                warn!("Variation {:?} failed: {}", variation.parameters, err);
                return None;
            }
        };
        if !result.is_complete() {
            return None;
        }

        let summary = &result.summary;
        Some(OptimizationResult {
            parameters: variation
                .parameters
                .iter()
                .map(|(name, value)| (name.clone(), *value))
                .collect(),
            sharpe_ratio: summary.sharpe_ratio,
            total_return: summary.total_return,
            total_return_percent: summary.total_return_percent,
            max_drawdown: summary.max_drawdown,
            win_rate: summary.win_rate,
            total_trades: summary.total_trades,
        })
    }
}

/// Best Sharpe first; total return breaks ties.
pub fn rank_results(results: &mut [OptimizationResult]) {
    results.sort_by(|a, b| {
        b.sharpe_ratio
            .partial_cmp(&a.sharpe_ratio)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.total_return
                    .partial_cmp(&a.total_return)
                    .unwrap_or(Ordering::Equal)
            })
    });
}

pub fn print_results(results: &[OptimizationResult], top_n: usize) {
    println!(
        "\n=== TOP {} STRATEGY VARIANTS ===\n",
        std::cmp::min(top_n, results.len())
    );

    for (i, result) in results.iter().take(top_n).enumerate() {
        println!("Rank {}:", i + 1);
        println!("  Sharpe Ratio: {:.4}", result.sharpe_ratio);
        println!(
            "  Total Return: ${:.2} ({:.2}%)",
            result.total_return, result.total_return_percent
        );
        println!("  Max Drawdown: {:.2}%", result.max_drawdown);
        println!("  Win Rate: {:.2}%", result.win_rate * 100.0);
        println!("  Total Trades: {}", result.total_trades);
        println!("  Parameters:");
        for (key, value) in &result.parameters {
            println!("    {}: {}", key, value);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use chrono::{Duration, NaiveDate};

    fn trending_series() -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars = (0..120)
            .map(|i| {
                let wave = (i as f64 / 6.0).sin() * 4.0;
                let close = 60.0 + i as f64 * 0.3 + wave;
                Bar {
                    date: start + Duration::days(i as i64),
                    open: close - 0.2,
                    high: close + 1.0,
                    low: close - 1.2,
                    close,
                    volume: 3_000_000.0,
                }
            })
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    fn range(min: f64, max: f64, step: f64) -> ParameterRange {
        ParameterRange { min, max, step }
    }

    #[test]
    fn inactive_parameters_collapse_duplicates() {
        let series = trending_series();
        let sweep = ParameterSweep::new(StrategyConfig::default(), &series, 10_000.0);
        let mut ranges = HashMap::new();
        ranges.insert("longBreakout".to_string(), range(10.0, 20.0, 10.0));
        ranges.insert("trailingStopATR".to_string(), range(1.0, 3.0, 1.0));

        // Trailing stop is off in the base config, so the multiplier is moot.
        let variations = sweep.build_variations(&ranges);
        assert_eq!(variations.len(), 2);
        assert!(variations
            .iter()
            .all(|variation| !variation.parameters.contains_key("trailingStopATR")));

        ranges.insert("useTrailingStop".to_string(), range(0.0, 1.0, 1.0));
        // 2 breakouts x (1 without trailing + 3 with trailing)
        assert_eq!(sweep.build_variations(&ranges).len(), 8);
    }

    #[test]
    fn invalid_variations_are_skipped() {
        let series = trending_series();
        let sweep = ParameterSweep::new(StrategyConfig::default(), &series, 10_000.0);
        let mut ranges = HashMap::new();
        ranges.insert("riskPerTrade".to_string(), range(0.0, 0.02, 0.01));
        let variations = sweep.build_variations(&ranges);
        assert_eq!(variations.len(), 2);
        assert!(variations
            .iter()
            .all(|variation| variation.config.risk_per_trade > 0.0));
    }

    #[test]
    fn sweep_results_are_ranked() {
        let series = trending_series();
        let sweep = ParameterSweep::new(StrategyConfig::default(), &series, 100_000.0);
        let mut ranges = HashMap::new();
        ranges.insert("longBreakout".to_string(), range(10.0, 30.0, 10.0));
        ranges.insert("longExit".to_string(), range(5.0, 10.0, 5.0));

        let results = sweep.run(&ranges, &CancellationToken::new());
        assert_eq!(results.len(), 6);
        assert!(results
            .windows(2)
            .all(|pair| pair[0].sharpe_ratio >= pair[1].sharpe_ratio));
    }

    #[test]
    fn rank_breaks_sharpe_ties_on_return() {
        let make = |sharpe: f64, total_return: f64| OptimizationResult {
            parameters: BTreeMap::new(),
            sharpe_ratio: sharpe,
            total_return,
            total_return_percent: 0.0,
            max_drawdown: 0.0,
            win_rate: 0.0,
            total_trades: 0,
        };
        let mut results = vec![make(1.0, 10.0), make(2.0, 5.0), make(1.0, 50.0)];
        rank_results(&mut results);
        assert_eq!(results[0].sharpe_ratio, 2.0);
        assert_eq!(results[1].total_return, 50.0);
        assert_eq!(results[2].total_return, 10.0);
    }
}
