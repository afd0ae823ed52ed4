//! Broker history payloads
//!
//! The history endpoint answers in one of two shapes: the legacy
//! `d.ordersHistory` array of positional order arrays, or the newer
//! `trades` array of pre-grouped trade objects. The shape is resolved once,
//! here, into a [`HistoryPayload`].

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Slot positions of the legacy positional order record
pub mod slot {
    pub const ID: usize = 0;
    pub const INSTRUMENT_ID: usize = 1;
    pub const ROUTE_ID: usize = 2;
    pub const QUANTITY: usize = 3;
    pub const SIDE: usize = 4;
    pub const ORDER_TYPE: usize = 5;
    pub const STATUS: usize = 6;
    pub const FILLED_QUANTITY: usize = 7;
    pub const AVERAGE_PRICE: usize = 8;
    pub const PRICE: usize = 9;
    pub const STOP_PRICE: usize = 10;
    pub const VALIDITY: usize = 11;
    pub const EXPIRE_DATE: usize = 12;
    pub const CREATED_DATE: usize = 13;
    pub const LAST_MODIFIED: usize = 14;
    pub const IS_OPEN: usize = 15;
    pub const POSITION_ID: usize = 16;
    pub const STOP_LOSS: usize = 17;
    pub const TAKE_PROFIT: usize = 18;
    pub const STRATEGY_ID: usize = 19;

    pub const COUNT: usize = 20;
}

/// One order event in the legacy positional format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawOrderRecord(pub Vec<Value>);

impl RawOrderRecord {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn text(&self, index: usize) -> Option<String> {
        self.0.get(index).and_then(value_to_string)
    }

    pub fn number(&self, index: usize) -> Option<f64> {
        self.0.get(index).and_then(value_to_f64)
    }

    pub fn flag(&self, index: usize) -> Option<bool> {
        self.0.get(index).and_then(value_to_bool)
    }

    pub fn timestamp(&self, index: usize) -> Option<DateTime<Utc>> {
        self.0.get(index).and_then(value_to_datetime)
    }
}

/// A trade object from the newer history format
///
/// One object carries both legs of a position. `close_*` fields are absent
/// while the position is open.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedTrade {
    #[serde(default, deserialize_with = "flex_string")]
    pub position_id: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub instrument_id: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub route_id: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub side: Option<String>,
    #[serde(default, alias = "qty", deserialize_with = "flex_f64")]
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "flex_f64")]
    pub open_price: Option<f64>,
    #[serde(default, deserialize_with = "flex_f64")]
    pub close_price: Option<f64>,
    #[serde(default, deserialize_with = "flex_datetime")]
    pub open_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flex_datetime")]
    pub close_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flex_string")]
    pub open_order_id: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub close_order_id: Option<String>,
    #[serde(default, deserialize_with = "flex_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "flex_bool")]
    pub is_open: Option<bool>,
    #[serde(default, deserialize_with = "flex_f64")]
    pub stop_loss: Option<f64>,
    #[serde(default, deserialize_with = "flex_f64")]
    pub take_profit: Option<f64>,
    #[serde(default, deserialize_with = "flex_string")]
    pub strategy_id: Option<String>,
}

impl GroupedTrade {
    /// Open unless flagged otherwise or a close leg is present
    pub fn still_open(&self) -> bool {
        match self.is_open {
            Some(flag) => flag,
            None => self.close_price.is_none() && self.close_date.is_none(),
        }
    }
}

/// History response with its shape resolved
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryPayload {
    Legacy(Vec<RawOrderRecord>),
    Grouped(Vec<GroupedTrade>),
}

impl HistoryPayload {
    /// Resolve the response shape from the JSON body
    ///
    /// Looks under `details` when present, otherwise at the root. `trades`
    /// takes precedence over `d.ordersHistory`. Entries that do not match the
    /// detected shape are skipped.
    pub fn sniff(body: &Value) -> Result<Self, String> {
        let root = body.get("details").unwrap_or(body);

        if let Some(trades) = root.get("trades").and_then(Value::as_array) {
            let parsed = trades
                .iter()
                .filter_map(|trade| match GroupedTrade::deserialize(trade) {
                    Ok(trade) => Some(trade),
                    Err(e) => {
                        warn!("Skipping malformed grouped trade: {}", e);
                        None
                    }
                })
                .collect();
            return Ok(HistoryPayload::Grouped(parsed));
        }

        if let Some(orders) = root.pointer("/d/ordersHistory").and_then(Value::as_array) {
            let parsed = orders
                .iter()
                .filter_map(|order| match order {
                    Value::Array(slots) => Some(RawOrderRecord(slots.clone())),
                    other => {
                        warn!("Skipping non-array order record: {}", other);
                        None
                    }
                })
                .collect();
            return Ok(HistoryPayload::Legacy(parsed));
        }

        Err("response has neither `trades` nor `d.ordersHistory`".to_string())
    }

    pub fn len(&self) -> usize {
        match self {
            HistoryPayload::Legacy(records) => records.len(),
            HistoryPayload::Grouped(trades) => trades.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

pub(crate) fn value_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// Epoch milliseconds (number or numeric string) or an RFC 3339 string
pub(crate) fn value_to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(millis_to_datetime),
        Value::String(s) => parse_datetime(s),
        _ => None,
    }
}

pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(millis) = trimmed.parse::<i64>() {
        return millis_to_datetime(millis);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn flex_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_to_string))
}

fn flex_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_to_f64))
}

fn flex_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_to_bool))
}

fn flex_datetime<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?
        .as_ref()
        .and_then(value_to_datetime))
}
