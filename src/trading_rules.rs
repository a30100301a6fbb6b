use crate::config::StrategyConfig;
use crate::models::{Bar, Direction, SkipReason};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionSizingOutcome {
    Sized { quantity: u64 },
    Skipped(SkipReason),
}

/// Volatility-normalised sizing: each position risks `riskPerTrade` of equity
/// between the entry and the initial ATR stop, and never commits more
/// notional than the cash on hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSizer {
    pub risk_per_trade: f64,
    pub stop_loss_atr: f64,
    pub max_positions: usize,
    pub commission_rate: f64,
}

impl PositionSizer {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            risk_per_trade: config.risk_per_trade,
            stop_loss_atr: config.stop_loss_atr,
            max_positions: config.max_positions,
            commission_rate: config.commission_rate,
        }
    }

    /// Sizes an entry expected near `price`, with `available_cash` to fund it.
    pub fn size(
        &self,
        equity: f64,
        available_cash: f64,
        price: f64,
        atr: Option<f64>,
        open_positions: usize,
    ) -> PositionSizingOutcome {
        if open_positions + 1 > self.max_positions {
            return PositionSizingOutcome::Skipped(SkipReason::MaxPositions);
        }

        let atr = match atr {
            None => return PositionSizingOutcome::Skipped(SkipReason::IndicatorNotReady),
            Some(value) if value.is_finite() && value > 0.0 => value,
            Some(_) => return PositionSizingOutcome::Skipped(SkipReason::DegenerateVolatility),
        };

        let risk_per_share = atr * self.stop_loss_atr;
        if !risk_per_share.is_finite() || risk_per_share <= 0.0 {
            return PositionSizingOutcome::Skipped(SkipReason::DegenerateVolatility);
        }

        if !equity.is_finite() || equity <= 0.0 {
            return PositionSizingOutcome::Skipped(SkipReason::ZeroQuantity);
        }

        let quantity = (equity * self.risk_per_trade / risk_per_share).floor();
        if !quantity.is_finite() || quantity < 1.0 {
            return PositionSizingOutcome::Skipped(SkipReason::ZeroQuantity);
        }

        let affordable = self.affordable_quantity(available_cash, price);
        if affordable == 0 {
            return PositionSizingOutcome::Skipped(SkipReason::InsufficientCash);
        }

        PositionSizingOutcome::Sized {
            quantity: (quantity as u64).min(affordable),
        }
    }

    /// Whole shares `cash` can pay for at `price`, commission included.
    pub fn affordable_quantity(&self, cash: f64, price: f64) -> u64 {
        let cost_per_share = price * (1.0 + self.commission_rate);
        if !cash.is_finite() || cash <= 0.0 || !cost_per_share.is_finite() || cost_per_share <= 0.0
        {
            return 0;
        }
        let shares = (cash / cost_per_share).floor();
        if shares.is_finite() && shares >= 1.0 {
            shares as u64
        } else {
            0
        }
    }
}

pub fn initial_stop(entry_price: f64, atr: f64, multiple: f64, direction: Direction) -> f64 {
    entry_price - direction.sign() * multiple * atr
}

/// Most favourable price seen: highest high for longs, lowest low for shorts.
pub fn update_high_water_mark(current: f64, bar: &Bar, direction: Direction) -> f64 {
    match direction {
        Direction::Long => current.max(bar.high),
        Direction::Short => current.min(bar.low),
    }
}

/// Moves the stop toward price as the high-water mark improves. The stop
/// never moves against the position.
pub fn ratchet_trailing_stop(
    current_stop: f64,
    high_water_mark: f64,
    atr: Option<f64>,
    multiple: f64,
    direction: Direction,
) -> f64 {
    let atr = match atr {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => return current_stop,
    };
    let candidate = high_water_mark - direction.sign() * multiple * atr;
    match direction {
        Direction::Long => current_stop.max(candidate),
        Direction::Short => current_stop.min(candidate),
    }
}

/// Whether the bar's range reaches the stop.
pub fn stop_triggered(bar: &Bar, stop: f64, direction: Direction) -> bool {
    match direction {
        Direction::Long => bar.low <= stop,
        Direction::Short => bar.high >= stop,
    }
}

/// Fill for a triggered stop: the stop price while the bar traded through it,
/// the open when the whole bar gapped past it.
pub fn stop_fill_price(bar: &Bar, stop: f64, direction: Direction) -> f64 {
    let gapped = match direction {
        Direction::Long => bar.high < stop,
        Direction::Short => bar.low > stop,
    };
    if gapped {
        bar.open
    } else {
        stop
    }
}

/// Whether the bar opens beyond the stop.
pub fn opens_through_stop(open: f64, stop: f64, direction: Direction) -> bool {
    match direction {
        Direction::Long => open <= stop,
        Direction::Short => open >= stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sizer() -> PositionSizer {
        PositionSizer {
            risk_per_trade: 0.02,
            stop_loss_atr: 2.0,
            max_positions: 1,
            commission_rate: 0.0,
        }
    }

    fn bar(high: f64, low: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 0.0,
        }
    }

    #[test]
    fn sizes_by_equity_risk_over_atr_stop() {
        // 100_000 * 0.02 / (2.5 * 2) = 400
        assert_eq!(
            sizer().size(100_000.0, 1_000_000.0, 100.0, Some(2.5), 0),
            PositionSizingOutcome::Sized { quantity: 400 }
        );
        // Floors fractional shares.
        assert_eq!(
            sizer().size(1_000.0, 1_000_000.0, 100.0, Some(3.0), 0),
            PositionSizingOutcome::Sized { quantity: 3 }
        );
    }

    #[test]
    fn degenerate_inputs_skip_instead_of_failing() {
        assert_eq!(
            sizer().size(100_000.0, 1_000_000.0, 100.0, Some(0.0), 0),
            PositionSizingOutcome::Skipped(SkipReason::DegenerateVolatility)
        );
        assert_eq!(
            sizer().size(100_000.0, 1_000_000.0, 100.0, None, 0),
            PositionSizingOutcome::Skipped(SkipReason::IndicatorNotReady)
        );
        assert_eq!(
            sizer().size(10.0, 1_000_000.0, 100.0, Some(50.0), 0),
            PositionSizingOutcome::Skipped(SkipReason::ZeroQuantity)
        );
        assert_eq!(
            sizer().size(-5.0, 1_000_000.0, 100.0, Some(1.0), 0),
            PositionSizingOutcome::Skipped(SkipReason::ZeroQuantity)
        );
        assert_eq!(
            sizer().size(100_000.0, 1_000_000.0, 100.0, Some(1.0), 1),
            PositionSizingOutcome::Skipped(SkipReason::MaxPositions)
        );
    }

    #[test]
    fn quantity_is_capped_by_available_cash() {
        // Risk alone would buy 100_000 * 0.02 / (0.01 * 2) = 100_000 shares.
        assert_eq!(
            sizer().size(100_000.0, 100_000.0, 100.0, Some(0.01), 0),
            PositionSizingOutcome::Sized { quantity: 1_000 }
        );
        assert_eq!(
            sizer().size(100_000.0, 50.0, 100.0, Some(0.01), 0),
            PositionSizingOutcome::Skipped(SkipReason::InsufficientCash)
        );

        let with_fees = PositionSizer {
            commission_rate: 0.01,
            ..sizer()
        };
        assert_eq!(with_fees.affordable_quantity(10_150.0, 100.0), 100);
        assert_eq!(with_fees.affordable_quantity(10_000.0, 100.0), 99);
        assert_eq!(with_fees.affordable_quantity(-1.0, 100.0), 0);
    }

    #[test]
    fn initial_stop_sits_on_the_losing_side() {
        assert_eq!(initial_stop(100.0, 2.0, 2.0, Direction::Long), 96.0);
        assert_eq!(initial_stop(100.0, 2.0, 2.0, Direction::Short), 104.0);
    }

    #[test]
    fn trailing_stop_never_retreats() {
        let raised = ratchet_trailing_stop(96.0, 110.0, Some(2.0), 2.0, Direction::Long);
        assert_eq!(raised, 106.0);
        // Wider ATR would loosen the stop; it must hold instead.
        let held = ratchet_trailing_stop(raised, 110.0, Some(5.0), 2.0, Direction::Long);
        assert_eq!(held, 106.0);

        let lowered = ratchet_trailing_stop(104.0, 90.0, Some(2.0), 2.0, Direction::Short);
        assert_eq!(lowered, 94.0);
        let held = ratchet_trailing_stop(lowered, 95.0, Some(2.0), 2.0, Direction::Short);
        assert_eq!(held, 94.0);

        assert_eq!(
            ratchet_trailing_stop(96.0, 120.0, None, 2.0, Direction::Long),
            96.0
        );
    }

    #[test]
    fn high_water_mark_tracks_favourable_extreme() {
        assert_eq!(
            update_high_water_mark(100.0, &bar(105.0, 95.0), Direction::Long),
            105.0
        );
        assert_eq!(
            update_high_water_mark(100.0, &bar(105.0, 95.0), Direction::Short),
            95.0
        );
    }

    #[test]
    fn stop_triggers_on_touch() {
        assert!(stop_triggered(&bar(105.0, 96.0), 96.0, Direction::Long));
        assert!(!stop_triggered(&bar(105.0, 96.5), 96.0, Direction::Long));
        assert!(stop_triggered(&bar(104.0, 99.0), 104.0, Direction::Short));
        assert!(opens_through_stop(95.0, 96.0, Direction::Long));
        assert!(!opens_through_stop(97.0, 96.0, Direction::Long));
        assert!(opens_through_stop(105.0, 104.0, Direction::Short));
    }

    #[test]
    fn stop_fills_at_open_when_bar_gaps_past_it() {
        let traded_through = Bar {
            open: 97.0,
            ..bar(98.0, 94.0)
        };
        assert_eq!(stop_fill_price(&traded_through, 96.0, Direction::Long), 96.0);

        let gapped_down = Bar {
            open: 51.0,
            ..bar(51.0, 50.0)
        };
        assert_eq!(stop_fill_price(&gapped_down, 96.0, Direction::Long), 51.0);

        let gapped_up = Bar {
            open: 112.0,
            ..bar(115.0, 110.0)
        };
        assert_eq!(stop_fill_price(&gapped_up, 104.0, Direction::Short), 112.0);
        assert_eq!(stop_fill_price(&bar(106.0, 102.0), 104.0, Direction::Short), 104.0);
    }
}
