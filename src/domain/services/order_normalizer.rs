//! Order normalization
//!
//! Turns a resolved [`HistoryPayload`] into [`NormalizedOrder`]s usable for
//! position pairing. The filter is strict: only orders whose status is
//! `filled` (case-insensitive) and that carry a position id survive.
//! Cancelled, pending, rejected and unknown statuses are dropped, as are
//! records that cannot be parsed.

use crate::domain::entities::history::{slot, GroupedTrade, HistoryPayload, RawOrderRecord};
use crate::domain::entities::order::{NormalizedOrder, OrderSide, OrderStatus};
use tracing::{debug, warn};

/// Why an individual record did not make it through
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Malformed(String),
    NotFilled(OrderStatus),
    MissingPositionId,
}

/// Counters for one normalization pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizationStats {
    pub accepted: usize,
    pub malformed: usize,
    pub not_filled: usize,
    pub missing_position_id: usize,
}

impl NormalizationStats {
    fn record(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::Malformed(_) => self.malformed += 1,
            Rejection::NotFilled(_) => self.not_filled += 1,
            Rejection::MissingPositionId => self.missing_position_id += 1,
        }
    }
}

/// Normalize a history payload, dropping everything unfit for pairing
pub fn normalize(payload: &HistoryPayload) -> (Vec<NormalizedOrder>, NormalizationStats) {
    let mut stats = NormalizationStats::default();
    let mut orders = Vec::with_capacity(payload.len());

    let results: Vec<Result<NormalizedOrder, Rejection>> = match payload {
        HistoryPayload::Legacy(records) => records.iter().map(normalize_record).collect(),
        HistoryPayload::Grouped(trades) => trades.iter().flat_map(expand_trade).collect(),
    };

    for result in results {
        match result {
            Ok(order) => {
                stats.accepted += 1;
                orders.push(order);
            }
            Err(rejection) => {
                match &rejection {
                    Rejection::Malformed(reason) => warn!("Dropping malformed order record: {}", reason),
                    other => debug!(reason = ?other, "Dropping order record"),
                }
                stats.record(&rejection);
            }
        }
    }

    debug!(
        accepted = stats.accepted,
        malformed = stats.malformed,
        not_filled = stats.not_filled,
        missing_position_id = stats.missing_position_id,
        "Normalized order history"
    );

    (orders, stats)
}

/// Map one positional record to a named order
pub fn normalize_record(record: &RawOrderRecord) -> Result<NormalizedOrder, Rejection> {
    if record.len() < slot::COUNT {
        return Err(Rejection::Malformed(format!(
            "expected {} slots, got {}",
            slot::COUNT,
            record.len()
        )));
    }

    let status = record
        .text(slot::STATUS)
        .map(|s| OrderStatus::parse(&s))
        .unwrap_or(OrderStatus::Unknown);
    if status != OrderStatus::Filled {
        return Err(Rejection::NotFilled(status));
    }

    let position_id = record
        .text(slot::POSITION_ID)
        .ok_or(Rejection::MissingPositionId)?;

    let id = required(record.text(slot::ID), "id")?;
    let instrument_id = required(record.text(slot::INSTRUMENT_ID), "instrumentId")?;
    let route_id = required(record.text(slot::ROUTE_ID), "routeId")?;
    let side_raw = required(record.text(slot::SIDE), "side")?;
    let side = OrderSide::parse(&side_raw)
        .ok_or_else(|| Rejection::Malformed(format!("unknown side '{}' on order {}", side_raw, id)))?;
    let created_date = required(record.timestamp(slot::CREATED_DATE), "createdDate")?;
    let is_open = required(record.flag(slot::IS_OPEN), "isOpen")?;

    Ok(NormalizedOrder {
        quantity: record.number(slot::QUANTITY).unwrap_or(0.0),
        order_type: record.text(slot::ORDER_TYPE).unwrap_or_default(),
        filled_quantity: record.number(slot::FILLED_QUANTITY).unwrap_or(0.0),
        average_price: record.number(slot::AVERAGE_PRICE).unwrap_or(0.0),
        price: record.number(slot::PRICE).unwrap_or(0.0),
        stop_price: record.number(slot::STOP_PRICE).filter(|p| *p > 0.0),
        validity: record.text(slot::VALIDITY),
        expire_date: record.timestamp(slot::EXPIRE_DATE),
        last_modified: record.timestamp(slot::LAST_MODIFIED).unwrap_or(created_date),
        stop_loss: record.number(slot::STOP_LOSS).filter(|p| *p > 0.0),
        take_profit: record.number(slot::TAKE_PROFIT).filter(|p| *p > 0.0),
        strategy_id: record.text(slot::STRATEGY_ID),
        id,
        instrument_id,
        route_id,
        side,
        status,
        created_date,
        is_open,
        position_id,
    })
}

/// Split a grouped trade into its opening and (when closed) closing order
pub fn expand_trade(trade: &GroupedTrade) -> Vec<Result<NormalizedOrder, Rejection>> {
    let opening = match opening_order(trade) {
        Ok(order) => order,
        Err(rejection) => return vec![Err(rejection)],
    };

    if trade.still_open() {
        return vec![Ok(opening)];
    }

    let Some(close_price) = trade.close_price else {
        warn!(
            position_id = %opening.position_id,
            "Closed trade without a close price, keeping it open"
        );
        return vec![Ok(opening)];
    };

    let closed_at = trade.close_date.unwrap_or(opening.created_date);
    let closing = NormalizedOrder {
        id: trade
            .close_order_id
            .clone()
            .unwrap_or_else(|| format!("{}-close", opening.position_id)),
        side: match opening.side {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        },
        average_price: close_price,
        price: close_price,
        created_date: closed_at,
        last_modified: closed_at,
        is_open: false,
        stop_loss: None,
        take_profit: None,
        ..opening.clone()
    };

    vec![Ok(opening), Ok(closing)]
}

fn opening_order(trade: &GroupedTrade) -> Result<NormalizedOrder, Rejection> {
    let status = trade
        .status
        .as_deref()
        .map(OrderStatus::parse)
        .unwrap_or(OrderStatus::Filled);
    if status != OrderStatus::Filled {
        return Err(Rejection::NotFilled(status));
    }

    let position_id = trade.position_id.clone().ok_or(Rejection::MissingPositionId)?;
    let instrument_id = required(trade.instrument_id.clone(), "instrumentId")?;
    let route_id = required(trade.route_id.clone(), "routeId")?;
    let side_raw = required(trade.side.clone(), "side")?;
    let side = OrderSide::parse(&side_raw).ok_or_else(|| {
        Rejection::Malformed(format!("unknown side '{}' on position {}", side_raw, position_id))
    })?;
    let quantity = required(trade.quantity, "quantity")?;
    let open_price = required(trade.open_price, "openPrice")?;
    let opened_at = required(trade.open_date, "openDate")?;

    Ok(NormalizedOrder {
        id: trade
            .open_order_id
            .clone()
            .unwrap_or_else(|| format!("{}-open", position_id)),
        instrument_id,
        route_id,
        quantity,
        side,
        order_type: "market".to_string(),
        status,
        filled_quantity: quantity,
        average_price: open_price,
        price: open_price,
        stop_price: None,
        validity: None,
        expire_date: None,
        created_date: opened_at,
        last_modified: opened_at,
        is_open: true,
        position_id,
        stop_loss: trade.stop_loss,
        take_profit: trade.take_profit,
        strategy_id: trade.strategy_id.clone(),
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, Rejection> {
    value.ok_or_else(|| Rejection::Malformed(format!("missing {}", field)))
}
