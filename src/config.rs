use crate::error::{EngineError, Result};
use crate::param_utils::{get_flag, get_param, get_rounded_usize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Breakout, risk and filter parameters for one run. Replaced wholesale
/// between runs; never mutated while a replay is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct StrategyConfig {
    // Channel windows, in bars
    pub long_breakout: usize,
    pub short_breakout: usize,
    pub long_exit: usize,
    pub short_exit: usize,

    // Risk
    pub risk_per_trade: f64,
    pub max_positions: usize,
    #[serde(rename = "stopLossATR", alias = "stopLoss")]
    pub stop_loss_atr: f64,
    #[serde(rename = "trailingStopATR")]
    pub trailing_stop_atr: f64,
    pub use_trailing_stop: bool,
    pub atr_period: usize,

    // Entry filters
    pub use_volatility_filter: bool,
    pub min_volume: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Annualized close-to-close volatility ceiling, in percent.
    pub max_volatility: f64,

    pub allow_short_selling: bool,

    // Execution costs
    pub commission_rate: f64,
    pub slippage_rate: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            long_breakout: 20,
            short_breakout: 10,
            long_exit: 10,
            short_exit: 20,
            risk_per_trade: 0.02,
            max_positions: 4,
            stop_loss_atr: 2.0,
            trailing_stop_atr: 2.0,
            use_trailing_stop: false,
            atr_period: 20,
            use_volatility_filter: false,
            min_volume: 1_000_000.0,
            min_price: 5.0,
            max_price: 1000.0,
            max_volatility: 30.0,
            allow_short_selling: true,
            commission_rate: 0.0,
            slippage_rate: 0.0,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        let windows = [
            ("longBreakout", self.long_breakout),
            ("shortBreakout", self.short_breakout),
            ("longExit", self.long_exit),
            ("shortExit", self.short_exit),
            ("atrPeriod", self.atr_period),
            ("maxPositions", self.max_positions),
        ];
        for (field, value) in windows {
            if value == 0 {
                return Err(EngineError::invalid_config(field, "must be at least 1"));
            }
        }

        if !self.risk_per_trade.is_finite()
            || self.risk_per_trade <= 0.0
            || self.risk_per_trade > 1.0
        {
            return Err(EngineError::invalid_config(
                "riskPerTrade",
                format!("must be in (0, 1] (value: {})", self.risk_per_trade),
            ));
        }

        require_positive("stopLossATR", self.stop_loss_atr)?;
        require_positive("trailingStopATR", self.trailing_stop_atr)?;
        require_positive("maxVolatility", self.max_volatility)?;
        require_non_negative("minVolume", self.min_volume)?;
        require_non_negative("minPrice", self.min_price)?;
        require_positive("maxPrice", self.max_price)?;
        if self.max_price < self.min_price {
            return Err(EngineError::invalid_config(
                "maxPrice",
                format!(
                    "must be >= minPrice ({} < {})",
                    self.max_price, self.min_price
                ),
            ));
        }

        require_fraction("commissionRate", self.commission_rate)?;
        require_fraction("slippageRate", self.slippage_rate)?;

        Ok(())
    }

    /// Bars needed before every channel and the ATR can be evaluated.
    pub fn longest_window(&self) -> usize {
        [
            self.long_breakout,
            self.short_breakout,
            self.long_exit,
            self.short_exit,
            self.atr_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn execution_costs(&self) -> ExecutionCosts {
        ExecutionCosts {
            commission_rate: self.commission_rate,
            slippage_rate: self.slippage_rate,
        }
    }

    /// Returns a new config with every parameter present in `parameters`
    /// replaced. Flags are read as 0/1. The result is not validated.
    pub fn with_parameters(&self, parameters: &HashMap<String, f64>) -> Self {
        Self {
            long_breakout: get_rounded_usize(parameters, "longBreakout", self.long_breakout),
            short_breakout: get_rounded_usize(parameters, "shortBreakout", self.short_breakout),
            long_exit: get_rounded_usize(parameters, "longExit", self.long_exit),
            short_exit: get_rounded_usize(parameters, "shortExit", self.short_exit),
            risk_per_trade: get_param(parameters, "riskPerTrade", self.risk_per_trade),
            max_positions: get_rounded_usize(parameters, "maxPositions", self.max_positions),
            stop_loss_atr: get_param(parameters, "stopLossATR", self.stop_loss_atr),
            trailing_stop_atr: get_param(parameters, "trailingStopATR", self.trailing_stop_atr),
            use_trailing_stop: get_flag(parameters, "useTrailingStop", self.use_trailing_stop),
            atr_period: get_rounded_usize(parameters, "atrPeriod", self.atr_period),
            use_volatility_filter: get_flag(
                parameters,
                "useVolatilityFilter",
                self.use_volatility_filter,
            ),
            min_volume: get_param(parameters, "minVolume", self.min_volume),
            min_price: get_param(parameters, "minPrice", self.min_price),
            max_price: get_param(parameters, "maxPrice", self.max_price),
            max_volatility: get_param(parameters, "maxVolatility", self.max_volatility),
            allow_short_selling: get_flag(
                parameters,
                "allowShortSelling",
                self.allow_short_selling,
            ),
            commission_rate: get_param(parameters, "commissionRate", self.commission_rate),
            slippage_rate: get_param(parameters, "slippageRate", self.slippage_rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionCosts {
    pub commission_rate: f64,
    pub slippage_rate: f64,
}

impl ExecutionCosts {
    /// Market fill price after adverse slippage. Buying (long entry, short
    /// cover) pays up; selling receives less.
    pub fn market_fill(&self, price: f64, buying: bool) -> f64 {
        if buying {
            price * (1.0 + self.slippage_rate)
        } else {
            price * (1.0 - self.slippage_rate)
        }
    }

    pub fn commission(&self, price: f64, quantity: u64) -> f64 {
        price * quantity as f64 * self.commission_rate
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::invalid_config(
            field,
            format!("must be a positive number (value: {})", value),
        ));
    }
    Ok(())
}

fn require_non_negative(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::invalid_config(
            field,
            format!("must be >= 0 (value: {})", value),
        ));
    }
    Ok(())
}

fn require_fraction(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..1.0).contains(&value) {
        return Err(EngineError::invalid_config(
            field,
            format!("must be in [0, 1) (value: {})", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StrategyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.longest_window(), 20);
    }

    #[test]
    fn rejects_out_of_range_risk() {
        for risk in [0.0, -0.1, 1.5, f64::NAN] {
            let config = StrategyConfig {
                risk_per_trade: risk,
                ..StrategyConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(
                err,
                EngineError::InvalidConfig {
                    field: "riskPerTrade",
                    ..
                }
            ));
        }
        let config = StrategyConfig {
            risk_per_trade: 1.0,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_windows_and_inverted_price_band() {
        let config = StrategyConfig {
            long_exit: 0,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());

        let config = StrategyConfig {
            min_price: 50.0,
            max_price: 10.0,
            ..StrategyConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("maxPrice"));
    }

    #[test]
    fn parses_dashboard_json_with_defaults() {
        let json = r#"{
            "longBreakout": 55,
            "stopLoss": 1.5,
            "useTrailingStop": true,
            "trailingStopATR": 3
        }"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.long_breakout, 55);
        assert_eq!(config.stop_loss_atr, 1.5);
        assert!(config.use_trailing_stop);
        assert_eq!(config.trailing_stop_atr, 3.0);
        assert_eq!(config.long_exit, 10);
        assert!(serde_json::from_str::<StrategyConfig>(r#"{"bogus": 1}"#).is_err());
    }

    #[test]
    fn slippage_is_always_adverse() {
        let costs = ExecutionCosts {
            commission_rate: 0.001,
            slippage_rate: 0.01,
        };
        assert!((costs.market_fill(100.0, true) - 101.0).abs() < 1e-9);
        assert!((costs.market_fill(100.0, false) - 99.0).abs() < 1e-9);
        assert!((costs.commission(50.0, 10) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn overrides_replace_whole_value() {
        let base = StrategyConfig::default();
        let mut params = HashMap::new();
        params.insert("longBreakout".to_string(), 55.0);
        params.insert("useVolatilityFilter".to_string(), 1.0);
        params.insert("riskPerTrade".to_string(), 0.01);
        let updated = base.with_parameters(&params);
        assert_eq!(updated.long_breakout, 55);
        assert!(updated.use_volatility_filter);
        assert_eq!(updated.risk_per_trade, 0.01);
        assert_eq!(updated.short_exit, base.short_exit);
        assert_eq!(base.long_breakout, 20);
    }
}
