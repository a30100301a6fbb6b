use crate::config::StrategyConfig;
use crate::error::Result;
use crate::indicators::Indicators;
use crate::models::{Bar, Direction, Signal, SignalAction, SignalStrength};
use crate::series::PriceSeries;

const STRONG_ATR_MULTIPLE: f64 = 1.5;
const MODERATE_ATR_MULTIPLE: f64 = 0.5;

/// Grades a breakout by how far the close cleared the channel level, in ATRs.
/// Missing or degenerate ATR grades as weak.
pub fn classify_strength(magnitude: f64, atr: Option<f64>) -> SignalStrength {
    let atr = match atr {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => return SignalStrength::Weak,
    };
    let multiple = magnitude.abs() / atr;
    if multiple > STRONG_ATR_MULTIPLE {
        SignalStrength::Strong
    } else if multiple >= MODERATE_ATR_MULTIPLE {
        SignalStrength::Moderate
    } else {
        SignalStrength::Weak
    }
}

/// Turns a series plus its indicators into breakout signals. Every comparison
/// at bar `i` is against the channel as it stood at the close of bar `i - 1`.
pub struct SignalDetector<'a> {
    config: StrategyConfig,
    series: &'a PriceSeries,
    indicators: Indicators,
}

impl<'a> SignalDetector<'a> {
    pub fn new(config: &StrategyConfig, series: &'a PriceSeries) -> Result<Self> {
        config.validate()?;
        let indicators = Indicators::compute(series, config);
        Ok(Self {
            config: config.clone(),
            series,
            indicators,
        })
    }

    pub fn indicators(&self) -> &Indicators {
        &self.indicators
    }

    pub fn series(&self) -> &PriceSeries {
        self.series
    }

    /// Signal at close of bar `index` given the position currently held.
    /// While in a position only the matching exit rule is checked. `None`
    /// when `index` is past the end of the series.
    pub fn evaluate(&self, index: usize, position: Option<Direction>) -> Option<Signal> {
        let bar = self.series.get(index)?;
        Some(self.signal_at(bar, index, position))
    }

    fn signal_at(&self, bar: &Bar, index: usize, position: Option<Direction>) -> Signal {
        match position {
            Some(Direction::Long) => self.evaluate_long_exit(bar, index),
            Some(Direction::Short) => self.evaluate_short_exit(bar, index),
            None => self.evaluate_entry(bar, index),
        }
    }

    /// Replays the whole series tracking position state from the signals
    /// themselves: an entry opens a position at its bar, an exit closes it.
    pub fn scan(&self) -> Vec<Signal> {
        let mut position: Option<Direction> = None;
        let mut signals = Vec::with_capacity(self.series.len());
        for (index, bar) in self.series.bars().iter().enumerate() {
            let signal = self.signal_at(bar, index, position);
            match signal.action {
                SignalAction::EnterLong => position = Some(Direction::Long),
                SignalAction::EnterShort => position = Some(Direction::Short),
                SignalAction::ExitLong | SignalAction::ExitShort => position = None,
                SignalAction::Hold => {}
            }
            signals.push(signal);
        }
        signals
    }

    fn prior(values: &[Option<f64>], index: usize, window: usize) -> Option<f64> {
        if index < window {
            return None;
        }
        values.get(index - 1).copied().flatten()
    }

    fn evaluate_long_exit(&self, bar: &Bar, index: usize) -> Signal {
        let level = Self::prior(&self.indicators.exit_low, index, self.config.long_exit);
        match level {
            Some(level) if bar.close < level => self.breakout(
                bar,
                index,
                SignalAction::ExitLong,
                level,
                format!(
                    "Close {:.2} broke below {}-bar low {:.2}",
                    bar.close, self.config.long_exit, level
                ),
            ),
            Some(_) => Signal::hold(bar, index, "Holding long position"),
            None => Signal::hold(bar, index, "Exit channel not ready"),
        }
    }

    fn evaluate_short_exit(&self, bar: &Bar, index: usize) -> Signal {
        let level = Self::prior(&self.indicators.exit_high, index, self.config.short_exit);
        match level {
            Some(level) if bar.close > level => self.breakout(
                bar,
                index,
                SignalAction::ExitShort,
                level,
                format!(
                    "Close {:.2} broke above {}-bar high {:.2}",
                    bar.close, self.config.short_exit, level
                ),
            ),
            Some(_) => Signal::hold(bar, index, "Holding short position"),
            None => Signal::hold(bar, index, "Exit channel not ready"),
        }
    }

    fn evaluate_entry(&self, bar: &Bar, index: usize) -> Signal {
        let upper = Self::prior(
            &self.indicators.entry_high,
            index,
            self.config.long_breakout,
        );
        let lower = Self::prior(
            &self.indicators.entry_low,
            index,
            self.config.short_breakout,
        );

        if upper.is_none() && lower.is_none() {
            return Signal::hold(bar, index, "Indicators not ready");
        }

        if let Some(level) = upper.filter(|level| bar.close > *level) {
            if let Some(blocked) = self.entry_filter(bar, index, Direction::Long) {
                return Signal::hold(bar, index, &format!("Long breakout filtered: {}", blocked));
            }
            return self.breakout(
                bar,
                index,
                SignalAction::EnterLong,
                level,
                format!(
                    "Close {:.2} broke above {}-bar high {:.2}",
                    bar.close, self.config.long_breakout, level
                ),
            );
        }

        if let Some(level) = lower.filter(|level| bar.close < *level) {
            if let Some(blocked) = self.entry_filter(bar, index, Direction::Short) {
                return Signal::hold(bar, index, &format!("Short breakdown filtered: {}", blocked));
            }
            return self.breakout(
                bar,
                index,
                SignalAction::EnterShort,
                level,
                format!(
                    "Close {:.2} broke below {}-bar low {:.2}",
                    bar.close, self.config.short_breakout, level
                ),
            );
        }

        Signal::hold(bar, index, "No breakout")
    }

    /// Reason the entry is blocked, if any. Exits never pass through here.
    fn entry_filter(&self, bar: &Bar, index: usize, direction: Direction) -> Option<String> {
        let config = &self.config;
        if direction == Direction::Short && !config.allow_short_selling {
            return Some("short selling disabled".to_string());
        }
        if bar.volume < config.min_volume {
            return Some(format!(
                "volume {:.0} below minimum {:.0}",
                bar.volume, config.min_volume
            ));
        }
        if bar.close < config.min_price {
            return Some(format!(
                "price {:.2} below minimum {:.2}",
                bar.close, config.min_price
            ));
        }
        if bar.close > config.max_price {
            return Some(format!(
                "price {:.2} above maximum {:.2}",
                bar.close, config.max_price
            ));
        }
        if config.use_volatility_filter {
            match self.indicators.volatility[index] {
                None => return Some("volatility not ready".to_string()),
                Some(volatility) if volatility > config.max_volatility => {
                    return Some(format!(
                        "volatility {:.1}% above maximum {:.1}%",
                        volatility, config.max_volatility
                    ));
                }
                Some(_) => {}
            }
        }
        None
    }

    fn breakout(
        &self,
        bar: &Bar,
        index: usize,
        action: SignalAction,
        level: f64,
        reason: String,
    ) -> Signal {
        Signal {
            signal_type: action.signal_type(),
            strength: classify_strength(bar.close - level, self.indicators.atr_at(index)),
            price: bar.close,
            date: bar.date,
            reason,
            index,
            action,
        }
    }
}

/// The last `limit` actionable signals, most recent first.
pub fn recent_signals(signals: &[Signal], limit: usize) -> Vec<Signal> {
    signals
        .iter()
        .rev()
        .filter(|signal| !signal.is_hold())
        .take(limit)
        .cloned()
        .collect()
}
