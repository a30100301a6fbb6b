pub mod backtest;
pub mod input;
pub mod signals;
pub mod sweep;
