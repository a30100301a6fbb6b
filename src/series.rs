use crate::error::{EngineError, Result};
use crate::models::Bar;
use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// Validated, immutable bar history for one instrument. Dates are strictly
/// increasing; calendar gaps (weekends, holidays) are allowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        if bars.is_empty() {
            return Err(EngineError::invalid_series("series is empty"));
        }

        for (index, bar) in bars.iter().enumerate() {
            validate_bar(index, bar)?;
            if index > 0 {
                let previous = bars[index - 1].date;
                if bar.date == previous {
                    return Err(EngineError::invalid_bar(
                        index,
                        format!("duplicate date {}", bar.date),
                    ));
                }
                if bar.date < previous {
                    return Err(EngineError::invalid_bar(
                        index,
                        format!("date {} precedes {}", bar.date, previous),
                    ));
                }
            }
        }

        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed series; kept for slice-like ergonomics.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn first(&self) -> &Bar {
        &self.bars[0]
    }

    pub fn last(&self) -> &Bar {
        &self.bars[self.bars.len() - 1]
    }

    pub fn start_date(&self) -> NaiveDate {
        self.first().date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.last().date
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    /// Fails unless the series holds at least `required` bars.
    pub fn ensure_history(&self, required: usize) -> Result<()> {
        if self.bars.len() < required {
            return Err(EngineError::invalid_series(format!(
                "series has {} bars but the longest window needs {}",
                self.bars.len(),
                required
            )));
        }
        Ok(())
    }

    /// Bars dated within `days` calendar days of the last bar (inclusive).
    pub fn trailing_days(&self, days: i64) -> Result<PriceSeries> {
        if days <= 0 {
            return Err(EngineError::invalid_series(format!(
                "window of {} days is empty",
                days
            )));
        }
        let cutoff = self.end_date() - Duration::days(days);
        let start = self.bars.partition_point(|bar| bar.date < cutoff);
        PriceSeries::new(self.bars[start..].to_vec())
    }
}

impl TryFrom<Vec<Bar>> for PriceSeries {
    type Error = EngineError;

    fn try_from(bars: Vec<Bar>) -> Result<Self> {
        PriceSeries::new(bars)
    }
}

fn validate_bar(index: usize, bar: &Bar) -> Result<()> {
    let fields = [
        ("open", bar.open),
        ("high", bar.high),
        ("low", bar.low),
        ("close", bar.close),
        ("volume", bar.volume),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(EngineError::invalid_bar(
                index,
                format!("{} is not finite", name),
            ));
        }
    }
    if bar.low <= 0.0 {
        return Err(EngineError::invalid_bar(
            index,
            format!("low {} must be positive", bar.low),
        ));
    }
    if bar.high < bar.open.max(bar.close).max(bar.low) {
        return Err(EngineError::invalid_bar(
            index,
            format!(
                "high {} is below open/close/low ({}, {}, {})",
                bar.high, bar.open, bar.close, bar.low
            ),
        ));
    }
    if bar.low > bar.open.min(bar.close).min(bar.high) {
        return Err(EngineError::invalid_bar(
            index,
            format!(
                "low {} is above open/close/high ({}, {}, {})",
                bar.low, bar.open, bar.close, bar.high
            ),
        ));
    }
    if bar.volume < 0.0 {
        return Err(EngineError::invalid_bar(
            index,
            format!("volume {} is negative", bar.volume),
        ));
    }
    Ok(())
}
