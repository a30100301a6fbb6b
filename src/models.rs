use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// +1 for longs, -1 for shorts. Multiplying a price move by this gives the
    /// move in the position's favour.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "buy",
            SignalType::Sell => "sell",
            SignalType::Hold => "hold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    Strong,
    Moderate,
    Weak,
}

impl SignalStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStrength::Strong => "strong",
            SignalStrength::Moderate => "moderate",
            SignalStrength::Weak => "weak",
        }
    }
}

/// What a signal asks the replay to do. `SignalType` is the coarse view the
/// dashboard renders; the action keeps entry and exit apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
    Hold,
}

impl SignalAction {
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalAction::EnterLong | SignalAction::ExitShort => SignalType::Buy,
            SignalAction::EnterShort | SignalAction::ExitLong => SignalType::Sell,
            SignalAction::Hold => SignalType::Hold,
        }
    }

    pub fn entry_direction(&self) -> Option<Direction> {
        match self {
            SignalAction::EnterLong => Some(Direction::Long),
            SignalAction::EnterShort => Some(Direction::Short),
            _ => None,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, SignalAction::ExitLong | SignalAction::ExitShort)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    pub price: f64,
    pub date: NaiveDate,
    pub reason: String,
    pub index: usize,
    pub action: SignalAction,
}

impl Signal {
    pub fn hold(bar: &Bar, index: usize, reason: &str) -> Self {
        Self {
            signal_type: SignalType::Hold,
            strength: SignalStrength::Weak,
            price: bar.close,
            date: bar.date,
            reason: reason.to_string(),
            index,
            action: SignalAction::Hold,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action == SignalAction::Hold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub entry_date: NaiveDate,
    pub entry_index: usize,
    pub entry_price: f64,
    pub quantity: u64,
    pub direction: Direction,
    pub stop_price: f64,
    /// Most favourable extreme since entry: highest high for longs, lowest
    /// low for shorts.
    pub high_water_mark: f64,
    pub entry_fee: f64,
}

impl Position {
    /// Signed contribution to equity when marked at `price`.
    pub fn market_value(&self, price: f64) -> f64 {
        self.direction.sign() * self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price) * self.quantity as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "Stop loss")]
    StopLoss,
    #[serde(rename = "Exit signal")]
    ExitSignal,
    #[serde(rename = "End of period")]
    EndOfPeriod,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "Stop loss",
            ExitReason::ExitSignal => "Exit signal",
            ExitReason::EndOfPeriod => "End of period",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: u64,
    pub direction: Direction,
    pub pnl: f64,
    pub fees: f64,
    pub return_percent: f64,
    pub bars_held: usize,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub benchmark_equity: f64,
    pub cash: f64,
    pub positions_value: f64,
    pub open_positions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    /// Calendar month key, `YYYY-MM`.
    pub month: String,
    /// Short month name as shown on the chart axis.
    pub label: String,
    pub return_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub total_return: f64,
    pub total_return_percent: f64,
    pub final_equity: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_trade: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub profit_factor: Option<f64>,
    pub avg_bars_held: f64,
    pub max_drawdown: f64,
    pub max_drawdown_amount: f64,
    pub sharpe_ratio: f64,
    pub benchmark_return_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    IndicatorNotReady,
    DegenerateVolatility,
    ZeroQuantity,
    MaxPositions,
    InsufficientCash,
    NoFillBar,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::IndicatorNotReady => "indicator_not_ready",
            SkipReason::DegenerateVolatility => "degenerate_volatility",
            SkipReason::ZeroQuantity => "zero_quantity",
            SkipReason::MaxPositions => "max_positions",
            SkipReason::InsufficientCash => "insufficient_cash",
            SkipReason::NoFillBar => "no_fill_bar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySkip {
    pub date: NaiveDate,
    pub index: usize,
    pub direction: Direction,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Cancelled { bars_processed: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub summary: BacktestSummary,
    pub monthly_returns: Vec<MonthlyReturn>,
    pub signals: Vec<Signal>,
    pub skipped_entries: Vec<EntrySkip>,
    /// Only populated for cancelled runs; a completed run always closes out.
    pub open_position: Option<Position>,
    pub status: RunStatus,
}

impl BacktestResult {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }
}
