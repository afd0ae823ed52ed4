use crate::domain::entities::instrument::InstrumentCacheEntry;
use crate::domain::entities::position::Position;
use crate::domain::services::metrics::TradingMetrics;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Broker account the service synchronizes
#[derive(Clone, PartialEq)]
pub struct AccountRef {
    pub account_id: String,
    pub account_number: String,
    pub access_token: String,
    pub user_id: Option<String>,
}

impl std::fmt::Debug for AccountRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRef")
            .field("account_id", &self.account_id)
            .field("account_number", &self.account_number)
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Per-account sync bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub last_sync: DateTime<Utc>,
    pub open_positions: usize,
    pub closed_positions: usize,
    pub total_positions: usize,
}

impl SyncMetadata {
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a Position>, synced_at: DateTime<Utc>) -> Self {
        let (mut open, mut closed) = (0, 0);
        for position in positions {
            if position.is_open {
                open += 1;
            } else {
                closed += 1;
            }
        }

        Self {
            last_sync: synced_at,
            open_positions: open,
            closed_positions: closed,
            total_positions: open + closed,
        }
    }

    /// True once strictly more than `threshold` has elapsed since the last sync
    pub fn needs_resync(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.last_sync > threshold
    }
}

/// Persisted document for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDocument {
    pub positions: BTreeMap<String, Position>,
    pub metrics: TradingMetrics,
    pub sync_metadata: SyncMetadata,
    #[serde(default)]
    pub instrument_cache: BTreeMap<String, InstrumentCacheEntry>,
}

impl AccountDocument {
    /// Zeroed document, as served when nothing better is available
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            positions: BTreeMap::new(),
            metrics: TradingMetrics::default(),
            sync_metadata: SyncMetadata::from_positions(std::iter::empty(), at),
            instrument_cache: BTreeMap::new(),
        }
    }

    /// Positions ordered by open time, then id
    pub fn positions_sorted(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.position_id.cmp(&b.position_id))
        });
        positions
    }
}
