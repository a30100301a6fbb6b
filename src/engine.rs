use crate::config::{ExecutionCosts, StrategyConfig};
use crate::error::{EngineError, Result};
use crate::models::*;
use crate::performance::PerformanceCalculator;
use crate::series::PriceSeries;
use crate::signals::SignalDetector;
use crate::trading_rules::{
    initial_stop, opens_through_stop, ratchet_trailing_stop, stop_fill_price, stop_triggered,
    update_high_water_mark, PositionSizer, PositionSizingOutcome,
};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Polled by a running replay once per bar, before the bar is processed.
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

/// Cooperative cancellation flag shared between the caller and a running
/// replay.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl CancelSignal for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}

/// Order decided at a bar's close, filled at the next bar's open.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PendingOrder {
    Enter {
        direction: Direction,
        signal_index: usize,
        quantity: u64,
    },
    Exit,
}

/// Mutable state of one replay. Owned by a single run and never shared.
struct ReplayState {
    cash: f64,
    position: Option<Position>,
    pending: Option<PendingOrder>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    signals: Vec<Signal>,
    skipped_entries: Vec<EntrySkip>,
    next_trade_id: u64,
}

impl ReplayState {
    fn new(initial_capital: f64, bar_count: usize) -> Self {
        Self {
            cash: initial_capital,
            position: None,
            pending: None,
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(bar_count),
            signals: Vec::new(),
            skipped_entries: Vec::new(),
            next_trade_id: 1,
        }
    }

    fn positions_value(&self, price: f64) -> f64 {
        self.position
            .as_ref()
            .map(|position| position.market_value(price))
            .unwrap_or(0.0)
    }

    fn equity(&self, price: f64) -> f64 {
        self.cash + self.positions_value(price)
    }
}

pub struct BacktestEngine {
    config: StrategyConfig,
    sizer: PositionSizer,
    costs: ExecutionCosts,
}

impl BacktestEngine {
    pub fn new(config: StrategyConfig) -> Result<Self> {
        config.validate()?;
        let sizer = PositionSizer::from_config(&config);
        let costs = config.execution_costs();
        Ok(Self {
            config,
            sizer,
            costs,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn run(&self, series: &PriceSeries, initial_capital: f64) -> Result<BacktestResult> {
        self.run_with_cancellation(series, initial_capital, &CancellationToken::new())
    }

    /// Replays the series bar by bar. Fails before touching any state if the
    /// inputs are unusable; once the loop starts it always yields a result.
    pub fn run_with_cancellation<C: CancelSignal + ?Sized>(
        &self,
        series: &PriceSeries,
        initial_capital: f64,
        cancel: &C,
    ) -> Result<BacktestResult> {
        if !initial_capital.is_finite() || initial_capital <= 0.0 {
            return Err(EngineError::invalid_config(
                "capital",
                format!("must be a positive number (value: {})", initial_capital),
            ));
        }
        series.ensure_history(self.config.longest_window())?;

        let detector = SignalDetector::new(&self.config, series)?;
        let bars = series.bars();
        let bar_count = bars.len();
        let first_close = series.first().close;

        info!(
            "Backtest starting: {} bars {} to {}, capital {:.2}",
            bar_count,
            series.start_date(),
            series.end_date(),
            initial_capital
        );

        let mut state = ReplayState::new(initial_capital, bar_count);
        let mut status = RunStatus::Complete;

        for (index, bar) in bars.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "Backtest cancelled after {} of {} bars",
                    index, bar_count
                );
                status = RunStatus::Cancelled {
                    bars_processed: index,
                };
                break;
            }

            self.fill_pending_order(&mut state, &detector, bar, index);
            self.apply_stop(&mut state, bar, index);
            self.trail_stop(&mut state, &detector, bar, index);
            self.act_on_signal(&mut state, &detector, bar, index, bar_count);

            if index + 1 == bar_count {
                if let Some(position) = state.position.take() {
                    let buying = position.direction == Direction::Short;
                    let exit_price = self.costs.market_fill(bar.close, buying);
                    self.close_position(
                        &mut state,
                        position,
                        exit_price,
                        bar,
                        index,
                        ExitReason::EndOfPeriod,
                    );
                }
            }

            let positions_value = state.positions_value(bar.close);
            state.equity_curve.push(EquityPoint {
                date: bar.date,
                equity: state.cash + positions_value,
                benchmark_equity: initial_capital * bar.close / first_close,
                cash: state.cash,
                positions_value,
                open_positions: usize::from(state.position.is_some()),
            });
        }

        let summary = PerformanceCalculator::calculate_summary(
            &state.trades,
            &state.equity_curve,
            initial_capital,
        );
        let monthly_returns =
            PerformanceCalculator::calculate_monthly_returns(&state.equity_curve, initial_capital);

        info!(
            "Backtest finished: {} trades, final equity {:.2}, return {:.2}%, max drawdown {:.2}%",
            summary.total_trades,
            summary.final_equity,
            summary.total_return_percent,
            summary.max_drawdown
        );

        Ok(BacktestResult {
            initial_capital,
            start_date: series.start_date(),
            end_date: series.end_date(),
            trades: state.trades,
            equity_curve: state.equity_curve,
            summary,
            monthly_returns,
            signals: state.signals,
            skipped_entries: state.skipped_entries,
            open_position: state.position,
            status,
        })
    }

    fn fill_pending_order(
        &self,
        state: &mut ReplayState,
        detector: &SignalDetector,
        bar: &Bar,
        index: usize,
    ) {
        match state.pending.take() {
            Some(PendingOrder::Enter {
                direction,
                signal_index,
                quantity,
            }) => {
                let Some(atr) = detector.indicators().atr_at(signal_index) else {
                    return;
                };
                let entry_price = self
                    .costs
                    .market_fill(bar.open, direction == Direction::Long);
                // Re-checked at the fill open, which may have gapped since sizing.
                let affordable = self.sizer.affordable_quantity(state.cash, entry_price);
                if affordable == 0 {
                    let signal_bar = detector.series().get(signal_index).unwrap_or(bar);
                    self.skip_entry(
                        state,
                        signal_bar,
                        signal_index,
                        direction,
                        SkipReason::InsufficientCash,
                    );
                    return;
                }
                let quantity = quantity.min(affordable);
                let entry_fee = self.costs.commission(entry_price, quantity);
                let stop_price =
                    initial_stop(entry_price, atr, self.config.stop_loss_atr, direction);

                state.cash -= direction.sign() * quantity as f64 * entry_price + entry_fee;
                debug!(
                    "{} {} entered at {:.4} on {} (stop {:.4})",
                    direction.as_str(),
                    quantity,
                    entry_price,
                    bar.date,
                    stop_price
                );
                state.position = Some(Position {
                    entry_date: bar.date,
                    entry_index: index,
                    entry_price,
                    quantity,
                    direction,
                    stop_price,
                    high_water_mark: entry_price,
                    entry_fee,
                });
            }
            Some(PendingOrder::Exit) => {
                let Some(position) = state.position.take() else {
                    return;
                };
                // An open beyond the stop means the resting stop fills first.
                let (exit_price, reason) =
                    if opens_through_stop(bar.open, position.stop_price, position.direction) {
                        (
                            stop_fill_price(bar, position.stop_price, position.direction),
                            ExitReason::StopLoss,
                        )
                    } else {
                        let buying = position.direction == Direction::Short;
                        (
                            self.costs.market_fill(bar.open, buying),
                            ExitReason::ExitSignal,
                        )
                    };
                self.close_position(state, position, exit_price, bar, index, reason);
            }
            None => {}
        }
    }

    fn apply_stop(&self, state: &mut ReplayState, bar: &Bar, index: usize) {
        let triggered = state.position.as_ref().is_some_and(|position| {
            position.entry_index < index
                && stop_triggered(bar, position.stop_price, position.direction)
        });
        if !triggered {
            return;
        }
        if let Some(position) = state.position.take() {
            let exit_price = stop_fill_price(bar, position.stop_price, position.direction);
            self.close_position(state, position, exit_price, bar, index, ExitReason::StopLoss);
        }
    }

    fn trail_stop(
        &self,
        state: &mut ReplayState,
        detector: &SignalDetector,
        bar: &Bar,
        index: usize,
    ) {
        if !self.config.use_trailing_stop {
            return;
        }
        let Some(position) = state.position.as_mut() else {
            return;
        };
        position.high_water_mark =
            update_high_water_mark(position.high_water_mark, bar, position.direction);
        let updated = ratchet_trailing_stop(
            position.stop_price,
            position.high_water_mark,
            detector.indicators().atr_at(index),
            self.config.trailing_stop_atr,
            position.direction,
        );
        if updated != position.stop_price {
            debug!(
                "Trailing stop moved {:.4} -> {:.4} on {}",
                position.stop_price, updated, bar.date
            );
            position.stop_price = updated;
        }
    }

    fn act_on_signal(
        &self,
        state: &mut ReplayState,
        detector: &SignalDetector,
        bar: &Bar,
        index: usize,
        bar_count: usize,
    ) {
        let held = state.position.as_ref().map(|position| position.direction);
        let Some(signal) = detector.evaluate(index, held) else {
            return;
        };
        if signal.is_hold() {
            return;
        }
        let action = signal.action;
        state.signals.push(signal);

        if let Some(direction) = action.entry_direction() {
            // The fill bar must exist and must not be the bar that force-closes.
            if index + 2 >= bar_count {
                self.skip_entry(state, bar, index, direction, SkipReason::NoFillBar);
                return;
            }
            let equity = state.equity(bar.close);
            let open_positions = usize::from(state.position.is_some());
            let atr = detector.indicators().atr_at(index);
            match self
                .sizer
                .size(equity, state.cash, bar.close, atr, open_positions)
            {
                PositionSizingOutcome::Sized { quantity } => {
                    state.pending = Some(PendingOrder::Enter {
                        direction,
                        signal_index: index,
                        quantity,
                    });
                }
                PositionSizingOutcome::Skipped(reason) => {
                    self.skip_entry(state, bar, index, direction, reason);
                }
            }
        } else if action.is_exit() && index + 1 < bar_count {
            state.pending = Some(PendingOrder::Exit);
        }
    }

    fn skip_entry(
        &self,
        state: &mut ReplayState,
        bar: &Bar,
        index: usize,
        direction: Direction,
        reason: SkipReason,
    ) {
        debug!(
            "Skipped {} entry on {}: {}",
            direction.as_str(),
            bar.date,
            reason.as_str()
        );
        state.skipped_entries.push(EntrySkip {
            date: bar.date,
            index,
            direction,
            reason,
        });
    }

    /// Converts the position into a ledger entry and settles cash in one step.
    fn close_position(
        &self,
        state: &mut ReplayState,
        position: Position,
        exit_price: f64,
        bar: &Bar,
        index: usize,
        reason: ExitReason,
    ) {
        let sign = position.direction.sign();
        let quantity = position.quantity as f64;
        let exit_fee = self.costs.commission(exit_price, position.quantity);
        let fees = position.entry_fee + exit_fee;
        let pnl = sign * (exit_price - position.entry_price) * quantity - fees;
        let notional = position.entry_price * quantity;
        let return_percent = if notional > 0.0 {
            pnl / notional * 100.0
        } else {
            0.0
        };

        state.cash += sign * quantity * exit_price - exit_fee;

        let trade = Trade {
            id: state.next_trade_id,
            entry_date: position.entry_date,
            exit_date: bar.date,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            direction: position.direction,
            pnl,
            fees,
            return_percent,
            bars_held: index - position.entry_index,
            reason,
        };
        state.next_trade_id += 1;

        debug!(
            "Trade {} closed on {}: {} {} @ {:.4} -> {:.4}, pnl {:.2} ({})",
            trade.id,
            trade.exit_date,
            trade.direction.as_str(),
            trade.quantity,
            trade.entry_price,
            trade.exit_price,
            trade.pnl,
            trade.reason
        );
        state.trades.push(trade);
    }
}
