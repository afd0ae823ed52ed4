use crate::domain::entities::position::Position;
use serde::{Deserialize, Serialize};

/// Ratio reported when there is profit but no loss to divide by
pub const RATIO_SENTINEL: f64 = 999.99;

/// Summary statistics over the closed positions of an account
///
/// Values are kept unrounded; use [`TradingMetrics::summary`] at the
/// presentation boundary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingMetrics {
    /// Sum of realized P&L
    pub net_pnl: f64,
    /// Winning trades as a percentage of closed trades (0.0 to 100.0)
    pub win_percent: f64,
    /// Gross profit / gross loss
    pub profit_factor: f64,
    /// Average win / average loss
    pub avg_win_loss_ratio: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub gross_profit: f64,
    /// Absolute value of the summed losses
    pub gross_loss: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub open_positions: usize,
}

impl TradingMetrics {
    /// Recompute from scratch; open positions are only counted
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Self {
        let mut metrics = TradingMetrics::default();

        for position in positions {
            if position.is_open {
                metrics.open_positions += 1;
                continue;
            }

            let pnl = position.pnl.value();
            metrics.total_trades += 1;
            metrics.net_pnl += pnl;

            // A trade's win flag decides its bucket, never the sign of its P&L
            if position.is_won {
                metrics.winning_trades += 1;
                metrics.gross_profit += pnl;
                metrics.largest_win = metrics.largest_win.max(pnl);
            } else if pnl < 0.0 {
                metrics.losing_trades += 1;
                metrics.gross_loss += pnl.abs();
                metrics.largest_loss = metrics.largest_loss.min(pnl);
            } else {
                metrics.breakeven_trades += 1;
            }
        }

        if metrics.total_trades > 0 {
            metrics.win_percent =
                metrics.winning_trades as f64 / metrics.total_trades as f64 * 100.0;
        }
        if metrics.winning_trades > 0 {
            metrics.average_win = metrics.gross_profit / metrics.winning_trades as f64;
        }
        if metrics.losing_trades > 0 {
            metrics.average_loss = metrics.gross_loss / metrics.losing_trades as f64;
        }

        metrics.profit_factor = capped_ratio(metrics.gross_profit, metrics.gross_loss);
        metrics.avg_win_loss_ratio = capped_ratio(metrics.average_win, metrics.average_loss);
        metrics
    }

    /// Rounded view: P&L to 2 decimals, win percent to 1, ratios to 2
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            net_pnl: round_to(self.net_pnl, 2),
            win_percent: round_to(self.win_percent, 1),
            profit_factor: round_to(self.profit_factor, 2),
            avg_win_loss_ratio: round_to(self.avg_win_loss_ratio, 2),
            total_trades: self.total_trades,
        }
    }
}

/// Presentation-ready metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub net_pnl: f64,
    pub win_percent: f64,
    pub profit_factor: f64,
    pub avg_win_loss_ratio: f64,
    pub total_trades: usize,
}

/// `numerator / denominator`, or the sentinel when the denominator is zero
pub fn capped_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        if numerator > 0.0 {
            RATIO_SENTINEL
        } else {
            0.0
        }
    } else {
        numerator / denominator
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
