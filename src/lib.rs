//! Donchian-channel breakout ("turtle") signal detection and backtesting.
//!
//! A validated [`series::PriceSeries`] flows through the incremental
//! [`indicators::IndicatorEngine`], the [`signals::SignalDetector`] and the
//! [`engine::BacktestEngine`] replay, which hands its ledger and equity curve
//! to [`performance::PerformanceCalculator`].

pub mod api;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod models;
pub mod optimizer;
pub mod param_utils;
pub mod performance;
pub mod series;
pub mod signals;
pub mod trading_rules;

pub use config::StrategyConfig;
pub use engine::{BacktestEngine, CancelSignal, CancellationToken};
pub use error::{EngineError, Result};
pub use series::PriceSeries;
