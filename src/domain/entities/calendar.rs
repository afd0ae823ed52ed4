use crate::domain::entities::position::Position;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One date of the displayed month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    /// Closed positions whose close falls on this date
    pub positions: Vec<Position>,
    pub pnl: f64,
    pub trade_count: usize,
    pub win_percent: f64,
    pub followed_strategy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDay>,
    pub total_pnl: f64,
    pub total_trades: usize,
    pub days_traded: usize,
    pub days_followed: usize,
}

impl CalendarMonth {
    pub fn new(year: i32, month: u32, days: Vec<CalendarDay>) -> Self {
        let total_pnl = days.iter().map(|day| day.pnl).sum();
        let total_trades = days.iter().map(|day| day.trade_count).sum();
        let days_traded = days.iter().filter(|day| day.trade_count > 0).count();
        let days_followed = days.iter().filter(|day| day.followed_strategy).count();

        Self {
            year,
            month,
            days,
            total_pnl,
            total_trades,
            days_traded,
            days_followed,
        }
    }

    pub fn day(&self, date: NaiveDate) -> Option<&CalendarDay> {
        self.days.iter().find(|day| day.date == date)
    }
}
