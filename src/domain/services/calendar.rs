//! Calendar buckets and strategy-adherence intervals

use crate::domain::entities::calendar::{CalendarDay, CalendarMonth};
use crate::domain::entities::history::parse_datetime;
use crate::domain::entities::position::Position;
use crate::domain::errors::{IntervalError, ValidationError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

/// Periods during which the strategy plugin was active
///
/// `active[i]..inactive[i]` are half-open intervals. When `active` holds one
/// more entry than `inactive`, the last interval is still running.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyIntervals {
    active: Vec<DateTime<Utc>>,
    inactive: Vec<DateTime<Utc>>,
}

impl StrategyIntervals {
    pub fn new(active: Vec<DateTime<Utc>>, inactive: Vec<DateTime<Utc>>) -> Result<Self, IntervalError> {
        if inactive.len() > active.len() {
            return Err(IntervalError::InactiveLongerThanActive {
                active: active.len(),
                inactive: inactive.len(),
            });
        }
        if active.len() > inactive.len() + 1 {
            return Err(IntervalError::TooManyOpenIntervals {
                active: active.len(),
                inactive: inactive.len(),
            });
        }
        if let Some(index) = active
            .iter()
            .zip(inactive.iter())
            .position(|(start, end)| end < start)
        {
            return Err(IntervalError::InvertedInterval { index });
        }

        Ok(Self { active, inactive })
    }

    /// Parse RFC 3339 or epoch-millisecond strings
    pub fn from_date_strings<S: AsRef<str>>(active: &[S], inactive: &[S]) -> Result<Self, IntervalError> {
        let parse_all = |dates: &[S]| -> Result<Vec<DateTime<Utc>>, IntervalError> {
            dates
                .iter()
                .map(|raw| {
                    parse_datetime(raw.as_ref())
                        .ok_or_else(|| IntervalError::InvalidDate(raw.as_ref().to_string()))
                })
                .collect()
        };

        Self::new(parse_all(active)?, parse_all(inactive)?)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Whether `at` falls inside any interval; an open interval runs through `now`
    pub fn contains(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.active.iter().enumerate().any(|(i, start)| {
            match self.inactive.get(i) {
                Some(end) => *start <= at && at < *end,
                None => *start <= at && at <= now,
            }
        })
    }
}

/// Build one calendar day per date of `year`-`month`
///
/// Only closed positions are bucketed, by the UTC date they closed on. A day
/// is checked against the intervals at its latest close, or at noon when no
/// trade closed that day.
pub fn build_month(
    year: i32,
    month: u32,
    positions: &[Position],
    intervals: &StrategyIntervals,
    now: DateTime<Utc>,
) -> Result<CalendarMonth, ValidationError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(ValidationError::InvalidMonth { year, month })?;

    let mut days = Vec::with_capacity(31);
    let mut date = first;
    while date.month() == month {
        days.push(build_day(date, positions, intervals, now));
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    Ok(CalendarMonth::new(year, month, days))
}

fn build_day(
    date: NaiveDate,
    positions: &[Position],
    intervals: &StrategyIntervals,
    now: DateTime<Utc>,
) -> CalendarDay {
    let closing_today: Vec<Position> = positions
        .iter()
        .filter(|p| !p.is_open && p.closed_at.map(|at| at.date_naive()) == Some(date))
        .cloned()
        .collect();

    let trade_count = closing_today.len();
    let pnl = closing_today.iter().map(|p| p.pnl.value()).sum();
    let wins = closing_today.iter().filter(|p| p.is_won).count();
    let win_percent = if trade_count > 0 {
        wins as f64 / trade_count as f64 * 100.0
    } else {
        0.0
    };

    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
    let representative = closing_today
        .iter()
        .filter_map(|p| p.closed_at)
        .max()
        .unwrap_or_else(|| date.and_time(noon).and_utc());

    CalendarDay {
        date,
        positions: closing_today,
        pnl,
        trade_count,
        win_percent,
        followed_strategy: intervals.contains(representative, now),
    }
}
