use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOT_SIZE: f64 = 1.0;

/// Details returned by the broker's instrument endpoint
///
/// Either field may be missing from the response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentDetails {
    pub name: Option<String>,
    pub lot_size: Option<f64>,
}

/// Cached instrument details, keyed by `instrumentId-routeId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentCacheEntry {
    pub name: String,
    pub lot_size: f64,
    pub fetched_at: DateTime<Utc>,
}

impl InstrumentCacheEntry {
    /// Build an entry from a lookup response, defaulting missing fields
    pub fn from_details(instrument_id: &str, details: InstrumentDetails, fetched_at: DateTime<Utc>) -> Self {
        let lot_size = details
            .lot_size
            .filter(|lot| lot.is_finite() && *lot > 0.0)
            .unwrap_or(DEFAULT_LOT_SIZE);
        let name = details
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| instrument_id.to_string());

        Self {
            name,
            lot_size,
            fetched_at,
        }
    }

    /// Placeholder used when the lookup fails
    pub fn fallback(instrument_id: &str, fetched_at: DateTime<Utc>) -> Self {
        Self::from_details(instrument_id, InstrumentDetails::default(), fetched_at)
    }
}
