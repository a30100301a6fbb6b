use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParameterRange {
    /// Every grid value from `min` to `max` inclusive. A non-positive step or
    /// an inverted range yields just `min`.
    pub fn values(&self) -> Vec<f64> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Vec::new();
        }
        if self.step.is_nan() || self.step <= 0.0 || self.max <= self.min {
            return vec![self.min];
        }
        let count = ((self.max - self.min) / self.step + 1e-9).floor() as usize;
        (0..=count)
            .map(|i| (self.min + i as f64 * self.step).min(self.max))
            .collect()
    }
}

/// Get a parameter value with a default fallback
pub fn get_param(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Get a parameter rounded to usize; negative values clamp to zero so that
/// validation can reject them by name
pub fn get_rounded_usize(params: &HashMap<String, f64>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round().max(0.0) as usize)
        .unwrap_or(default)
}

pub fn coerce_binary_param(value: f64, default: bool) -> bool {
    if !value.is_finite() {
        return default;
    }
    value >= 0.5
}

/// Get a boolean flag stored as 0/1
pub fn get_flag(params: &HashMap<String, f64>, key: &str, default: bool) -> bool {
    params
        .get(key)
        .map(|&v| coerce_binary_param(v, default))
        .unwrap_or(default)
}

/// Check if a parameter has no effect under the current flag settings
pub fn parameter_is_inactive(param_name: &str, params: &HashMap<String, f64>) -> bool {
    match param_name {
        "trailingStopATR" => !get_flag(params, "useTrailingStop", false),
        "maxVolatility" => !get_flag(params, "useVolatilityFilter", false),
        "shortBreakout" | "shortExit" => !get_flag(params, "allowShortSelling", true),
        _ => false,
    }
}

pub fn parameter_signature(parameters: &HashMap<String, f64>) -> String {
    let mut sorted: Vec<_> = parameters.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    format!("{:?}", sorted)
}

/// Cartesian product of the given ranges, keyed by parameter name. Names are
/// visited in sorted order so the output order is stable.
pub fn expand_parameter_grid(
    ranges: &HashMap<String, ParameterRange>,
) -> Vec<HashMap<String, f64>> {
    let mut names: Vec<&String> = ranges.keys().collect();
    names.sort();

    let mut grid: Vec<HashMap<String, f64>> = vec![HashMap::new()];
    for name in names {
        let values = ranges[name].values();
        let mut next = Vec::with_capacity(grid.len() * values.len().max(1));
        for partial in &grid {
            for value in &values {
                let mut combined = partial.clone();
                combined.insert(name.clone(), *value);
                next.push(combined);
            }
        }
        grid = next;
    }
    grid
}
