use crate::config::StrategyConfig;
use crate::engine::{BacktestEngine, CancellationToken};
use crate::error::{EngineError, Result};
use crate::models::{BacktestResult, Signal};
use crate::series::PriceSeries;
use crate::signals::{recent_signals, SignalDetector};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CAPITAL: f64 = 100_000.0;
pub const DEFAULT_RECENT_SIGNALS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[default]
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "2Y")]
    TwoYears,
    #[serde(rename = "5Y")]
    FiveYears,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::OneMonth,
        Timeframe::ThreeMonths,
        Timeframe::SixMonths,
        Timeframe::OneYear,
        Timeframe::TwoYears,
        Timeframe::FiveYears,
    ];

    /// Calendar days covered by the timeframe.
    pub fn days(&self) -> i64 {
        match self {
            Timeframe::OneMonth => 30,
            Timeframe::ThreeMonths => 90,
            Timeframe::SixMonths => 180,
            Timeframe::OneYear => 365,
            Timeframe::TwoYears => 730,
            Timeframe::FiveYears => 1825,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMonth => "1M",
            Timeframe::ThreeMonths => "3M",
            Timeframe::SixMonths => "6M",
            Timeframe::OneYear => "1Y",
            Timeframe::TwoYears => "2Y",
            Timeframe::FiveYears => "5Y",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Timeframe::ALL
            .into_iter()
            .find(|timeframe| timeframe.as_str() == normalized)
            .ok_or_else(|| {
                EngineError::invalid_config(
                    "timeframe",
                    format!("unknown timeframe '{}' (expected 1M, 3M, 6M, 1Y, 2Y or 5Y)", value),
                )
            })
    }
}

fn default_capital() -> f64 {
    DEFAULT_CAPITAL
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub symbol: String,
    #[serde(default)]
    pub timeframe: Timeframe,
    #[serde(default = "default_capital")]
    pub capital: f64,
    #[serde(default)]
    pub config: StrategyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResponse {
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(flatten)]
    pub result: BacktestResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalQueryResponse {
    pub current_signal: Signal,
    pub recent_signals: Vec<Signal>,
}

/// Slices `series` to the request's timeframe and runs the backtest on it.
/// The full ledger is always returned; any paging is up to the caller.
pub fn run_backtest_request(
    request: &BacktestRequest,
    series: &PriceSeries,
    cancel: &CancellationToken,
) -> Result<BacktestResponse> {
    let engine = BacktestEngine::new(request.config.clone())?;
    let window = series.trailing_days(request.timeframe.days())?;
    info!(
        "Running {} backtest for {} over {} bars",
        request.timeframe,
        request.symbol,
        window.len()
    );
    let result = engine.run_with_cancellation(&window, request.capital, cancel)?;
    Ok(BacktestResponse {
        symbol: request.symbol.clone(),
        timeframe: request.timeframe,
        result,
    })
}

/// Signal at the last bar plus the most recent actionable signals, newest
/// first.
pub fn query_signals(
    series: &PriceSeries,
    config: &StrategyConfig,
    limit: usize,
) -> Result<SignalQueryResponse> {
    let detector = SignalDetector::new(config, series)?;
    let mut signals = detector.scan();
    let recent = recent_signals(&signals, limit);
    let current_signal = signals
        .pop()
        .ok_or_else(|| EngineError::invalid_series("series is empty"))?;
    Ok(SignalQueryResponse {
        current_signal,
        recent_signals: recent,
    })
}
