use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Case-insensitive parse of the broker's side string
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order status reported by the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Unknown,
}

impl OrderStatus {
    pub fn parse(value: &str) -> Self {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "filled" => OrderStatus::Filled,
            "partiallyfilled" => OrderStatus::PartiallyFilled,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            "rejected" => OrderStatus::Rejected,
            "new" | "accepted" | "pending" | "working" => OrderStatus::Pending,
            _ => OrderStatus::Unknown,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Named-field order produced by the normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    pub id: String,
    pub instrument_id: String,
    pub route_id: String,
    pub quantity: f64,
    pub side: OrderSide,
    pub order_type: String,
    pub status: OrderStatus,
    pub filled_quantity: f64,
    pub average_price: f64,
    pub price: f64,
    pub stop_price: Option<f64>,
    pub validity: Option<String>,
    pub expire_date: Option<DateTime<Utc>>,
    pub created_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub is_open: bool,
    pub position_id: String,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub strategy_id: Option<String>,
}

impl NormalizedOrder {
    /// Filled quantity when the broker reports one, requested quantity otherwise
    pub fn executed_quantity(&self) -> f64 {
        if self.filled_quantity > 0.0 {
            self.filled_quantity
        } else {
            self.quantity
        }
    }

    /// Average fill price when available, limit price otherwise
    pub fn fill_price(&self) -> f64 {
        if self.average_price > 0.0 {
            self.average_price
        } else {
            self.price
        }
    }

    pub fn instrument_key(&self) -> String {
        instrument_key(&self.instrument_id, &self.route_id)
    }
}

/// Cache key for an instrument on a given route
pub fn instrument_key(instrument_id: &str, route_id: &str) -> String {
    format!("{}-{}", instrument_id, route_id)
}
