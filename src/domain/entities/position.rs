use crate::domain::entities::order::{NormalizedOrder, OrderSide};
use crate::domain::value_objects::pnl::PnL;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A matched or unmatched pair of opening/closing orders sharing a position id
///
/// `exit_price`, `closing_order_id` and `closed_at` are set together when the
/// position closes. `pnl` stays zero and `is_won` false while open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub position_id: String,
    pub opening_order_id: String,
    pub closing_order_id: Option<String>,
    pub instrument_id: String,
    pub route_id: String,
    pub instrument_name: String,
    pub lot_size: f64,
    pub side: OrderSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl: PnL,
    pub is_open: bool,
    pub is_won: bool,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_modified: DateTime<Utc>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub strategy_id: Option<String>,
}

impl Position {
    /// Open position from its opening order
    pub fn open(order: &NormalizedOrder, instrument_name: String, lot_size: f64) -> Self {
        Position {
            position_id: order.position_id.clone(),
            opening_order_id: order.id.clone(),
            closing_order_id: None,
            instrument_id: order.instrument_id.clone(),
            route_id: order.route_id.clone(),
            instrument_name,
            lot_size,
            side: order.side,
            quantity: order.executed_quantity(),
            entry_price: order.fill_price(),
            exit_price: None,
            pnl: PnL::zero(),
            is_open: true,
            is_won: false,
            opened_at: order.created_date,
            closed_at: None,
            last_modified: order.last_modified,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            strategy_id: order.strategy_id.clone(),
        }
    }

    /// Apply the closing order, computing realized P&L
    ///
    /// A position that is already closed is left untouched.
    pub fn close(&mut self, closing: &NormalizedOrder) {
        if !self.is_open {
            return;
        }

        let exit_price = closing.fill_price();
        let (pnl, is_won) = realized_pnl(
            self.side,
            closing.side,
            self.entry_price,
            exit_price,
            self.quantity,
            self.lot_size,
        );

        self.closing_order_id = Some(closing.id.clone());
        self.exit_price = Some(exit_price);
        self.pnl = pnl;
        self.is_won = is_won;
        self.is_open = false;
        self.closed_at = Some(closing.created_date);
        self.last_modified = closing.last_modified;
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open
    }
}

/// Realized P&L and win flag for an opening/closing side pair
///
/// Non-finite products collapse to zero.
pub fn realized_pnl(
    open_side: OrderSide,
    close_side: OrderSide,
    entry_price: f64,
    exit_price: f64,
    quantity: f64,
    lot_size: f64,
) -> (PnL, bool) {
    let (raw, is_won) = match (open_side, close_side) {
        (OrderSide::Buy, OrderSide::Sell) => (
            (exit_price - entry_price) * quantity * lot_size,
            exit_price > entry_price,
        ),
        (OrderSide::Sell, OrderSide::Buy) => (
            (entry_price - exit_price) * quantity * lot_size,
            entry_price > exit_price,
        ),
        _ => {
            let raw = (exit_price - entry_price) * quantity * lot_size;
            (raw, raw > 0.0)
        }
    };

    let pnl = PnL::new(raw).unwrap_or_default();
    (pnl, is_won)
}
