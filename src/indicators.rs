use crate::config::StrategyConfig;
use crate::models::Bar;
use crate::series::PriceSeries;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::VecDeque;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub fn true_range(bar: &Bar, prev_close: Option<f64>) -> f64 {
    let high_low = bar.high - bar.low;
    match prev_close {
        Some(prev) => high_low
            .max((bar.high - prev).abs())
            .max((bar.low - prev).abs()),
        None => high_low,
    }
}

/// Sliding-window maximum (or minimum) over the last `window` values, kept in
/// a monotonic deque so each push is amortised O(1).
#[derive(Debug, Clone)]
pub struct RollingExtremum {
    window: usize,
    keep_max: bool,
    deque: VecDeque<(usize, f64)>,
    seen: usize,
}

impl RollingExtremum {
    pub fn max(window: usize) -> Self {
        Self::with_mode(window, true)
    }

    pub fn min(window: usize) -> Self {
        Self::with_mode(window, false)
    }

    fn with_mode(window: usize, keep_max: bool) -> Self {
        Self {
            window: window.max(1),
            keep_max,
            deque: VecDeque::with_capacity(window.max(1)),
            seen: 0,
        }
    }

    /// Adds the next value and returns the extremum of the trailing window
    /// including it, or `None` until the window is full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let index = self.seen;
        self.seen += 1;

        while let Some(&(_, back)) = self.deque.back() {
            let dominated = if self.keep_max {
                back <= value
            } else {
                back >= value
            };
            if !dominated {
                break;
            }
            self.deque.pop_back();
        }
        self.deque.push_back((index, value));

        while let Some(&(front_index, _)) = self.deque.front() {
            if front_index + self.window > index {
                break;
            }
            self.deque.pop_front();
        }

        if self.seen >= self.window {
            self.deque.front().map(|&(_, extreme)| extreme)
        } else {
            None
        }
    }
}

/// Wilder-smoothed ATR. The first value appears once `period` true ranges
/// have been seen and is their simple mean.
#[derive(Debug, Clone)]
pub struct WilderAtr {
    period: usize,
    prev_close: Option<f64>,
    seed_sum: f64,
    count: usize,
    value: Option<f64>,
}

impl WilderAtr {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            seed_sum: 0.0,
            count: 0,
            value: None,
        }
    }

    pub fn push(&mut self, bar: &Bar) -> Option<f64> {
        let tr = true_range(bar, self.prev_close);
        self.prev_close = Some(bar.close);
        self.count += 1;

        let period = self.period as f64;
        if self.count <= self.period {
            self.seed_sum += tr;
            if self.count == self.period {
                self.value = Some(self.seed_sum / period);
            }
        } else {
            self.value = self
                .value
                .map(|prev| (prev * (period - 1.0) + tr) / period);
        }
        self.value
    }
}

/// Annualized standard deviation of close-to-close returns, in percent, over
/// a trailing window of returns.
#[derive(Debug, Clone)]
pub struct RollingVolatility {
    lookback: usize,
    prev_close: Option<f64>,
    returns: VecDeque<f64>,
}

impl RollingVolatility {
    pub fn new(lookback: usize) -> Self {
        let lookback = lookback.max(2);
        Self {
            lookback,
            prev_close: None,
            returns: VecDeque::with_capacity(lookback + 1),
        }
    }

    pub fn push(&mut self, close: f64) -> Option<f64> {
        if let Some(prev) = self.prev_close {
            if prev > 0.0 {
                self.returns.push_back((close - prev) / prev);
                if self.returns.len() > self.lookback {
                    self.returns.pop_front();
                }
            }
        }
        self.prev_close = Some(close);

        if self.returns.len() < self.lookback {
            return None;
        }
        let daily_std_dev = self.returns.iter().std_dev();
        if !daily_std_dev.is_finite() {
            return None;
        }
        Some(daily_std_dev * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
    }
}

/// Indicator values at one bar. `None` means the window is not full yet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IndicatorSnapshot {
    /// Highest high over `longBreakout` bars.
    pub entry_high: Option<f64>,
    /// Lowest low over `shortBreakout` bars.
    pub entry_low: Option<f64>,
    /// Lowest low over `longExit` bars.
    pub exit_low: Option<f64>,
    /// Highest high over `shortExit` bars.
    pub exit_high: Option<f64>,
    pub atr: Option<f64>,
    pub volatility: Option<f64>,
}

/// Streams bars one at a time and yields the channel, ATR and volatility
/// values at each bar. Every window includes the bar just pushed.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    entry_high: RollingExtremum,
    entry_low: RollingExtremum,
    exit_low: RollingExtremum,
    exit_high: RollingExtremum,
    atr: WilderAtr,
    volatility: RollingVolatility,
    bars_seen: usize,
}

impl IndicatorEngine {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            entry_high: RollingExtremum::max(config.long_breakout),
            entry_low: RollingExtremum::min(config.short_breakout),
            exit_low: RollingExtremum::min(config.long_exit),
            exit_high: RollingExtremum::max(config.short_exit),
            atr: WilderAtr::new(config.atr_period),
            volatility: RollingVolatility::new(config.atr_period),
            bars_seen: 0,
        }
    }

    pub fn push(&mut self, bar: &Bar) -> IndicatorSnapshot {
        self.bars_seen += 1;
        IndicatorSnapshot {
            entry_high: self.entry_high.push(bar.high),
            entry_low: self.entry_low.push(bar.low),
            exit_low: self.exit_low.push(bar.low),
            exit_high: self.exit_high.push(bar.high),
            atr: self.atr.push(bar),
            volatility: self.volatility.push(bar.close),
        }
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }
}

/// Indicator arrays aligned with the bars of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicators {
    pub entry_high: Vec<Option<f64>>,
    pub entry_low: Vec<Option<f64>>,
    pub exit_low: Vec<Option<f64>>,
    pub exit_high: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    pub volatility: Vec<Option<f64>>,
}

impl Indicators {
    pub fn compute(series: &PriceSeries, config: &StrategyConfig) -> Self {
        let n = series.len();
        let mut indicators = Self {
            entry_high: Vec::with_capacity(n),
            entry_low: Vec::with_capacity(n),
            exit_low: Vec::with_capacity(n),
            exit_high: Vec::with_capacity(n),
            atr: Vec::with_capacity(n),
            volatility: Vec::with_capacity(n),
        };

        let mut engine = IndicatorEngine::new(config);
        for bar in series.bars() {
            let snapshot = engine.push(bar);
            indicators.entry_high.push(snapshot.entry_high);
            indicators.entry_low.push(snapshot.entry_low);
            indicators.exit_low.push(snapshot.exit_low);
            indicators.exit_high.push(snapshot.exit_high);
            indicators.atr.push(snapshot.atr);
            indicators.volatility.push(snapshot.volatility);
        }
        indicators
    }

    pub fn len(&self) -> usize {
        self.atr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atr.is_empty()
    }

    pub fn snapshot(&self, index: usize) -> Option<IndicatorSnapshot> {
        if index >= self.len() {
            return None;
        }
        Some(IndicatorSnapshot {
            entry_high: self.entry_high[index],
            entry_low: self.entry_low[index],
            exit_low: self.exit_low[index],
            exit_high: self.exit_high[index],
            atr: self.atr[index],
            volatility: self.volatility[index],
        })
    }

    pub fn atr_at(&self, index: usize) -> Option<f64> {
        self.atr.get(index).copied().flatten()
    }
}
