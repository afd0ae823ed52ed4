//! Position grouping
//!
//! Pairs normalized orders that share a position id into [`Position`]s and
//! merges fresh results into the positions already persisted for an account.

use crate::domain::entities::instrument::{InstrumentCacheEntry, DEFAULT_LOT_SIZE};
use crate::domain::entities::order::NormalizedOrder;
use crate::domain::entities::position::Position;
use crate::domain::services::instrument_resolver::InstrumentLookup;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Group orders by position id and pair opening with closing orders
///
/// Instruments of closed positions are resolved first, once per key, before
/// any position is built. Open positions reuse those details, or whatever
/// the lookup already had cached, so the result depends only on the orders
/// and the lookup's state at entry. Ordered by open time, then position id.
pub async fn group_positions<L>(orders: &[NormalizedOrder], lookup: &mut L) -> Vec<Position>
where
    L: InstrumentLookup + ?Sized,
{
    let mut partitions: HashMap<&str, Vec<&NormalizedOrder>> = HashMap::new();
    for order in orders {
        let position_id = order.position_id.trim();
        if position_id.is_empty() || position_id.eq_ignore_ascii_case("null") {
            continue;
        }
        partitions.entry(position_id).or_default().push(order);
    }

    // Deterministic lookup order keeps instrument calls stable across runs
    let mut position_ids: Vec<&str> = partitions.keys().copied().collect();
    position_ids.sort_unstable();

    let mut pairs = Vec::with_capacity(position_ids.len());
    for position_id in position_ids {
        let mut legs = partitions.remove(position_id).unwrap_or_default();
        legs.sort_by(|a, b| {
            a.created_date
                .cmp(&b.created_date)
                .then_with(|| a.id.cmp(&b.id))
        });

        let Some(opening) = legs.iter().copied().find(|order| order.is_open) else {
            debug!(position_id, "No opening order, discarding position");
            continue;
        };
        let closing = legs
            .iter()
            .copied()
            .find(|order| !order.is_open && order.created_date >= opening.created_date);
        pairs.push((opening, closing));
    }

    let mut resolved: HashMap<String, InstrumentCacheEntry> = HashMap::new();
    for (opening, _) in pairs.iter().filter(|(_, closing)| closing.is_some()) {
        let key = opening.instrument_key();
        if !resolved.contains_key(&key) {
            let entry = lookup
                .resolve(&opening.instrument_id, &opening.route_id)
                .await;
            resolved.insert(key, entry);
        }
    }

    let mut positions: Vec<Position> = pairs
        .into_iter()
        .map(|(opening, closing)| {
            let instrument = resolved
                .get(&opening.instrument_key())
                .cloned()
                .or_else(|| lookup.peek(&opening.instrument_id, &opening.route_id));
            let (name, lot_size) = instrument
                .map(|entry| (entry.name, entry.lot_size))
                .unwrap_or_else(|| (opening.instrument_id.clone(), DEFAULT_LOT_SIZE));

            let mut position = Position::open(opening, name, lot_size);
            if let Some(closing) = closing {
                position.close(closing);
            }
            position
        })
        .collect();

    positions.sort_by(|a, b| {
        a.opened_at
            .cmp(&b.opened_at)
            .then_with(|| a.position_id.cmp(&b.position_id))
    });
    positions
}

/// Outcome counters of a merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeSummary {
    pub inserted: usize,
    pub closed: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Merge freshly grouped positions into the persisted map
///
/// Nothing is ever removed. A known position keeps its original open time and
/// opening order; a closed position is never reopened.
pub fn merge_positions(existing: &mut BTreeMap<String, Position>, fresh: Vec<Position>) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for incoming in fresh {
        match existing.get_mut(&incoming.position_id) {
            None => {
                summary.inserted += 1;
                existing.insert(incoming.position_id.clone(), incoming);
            }
            Some(current) if current.is_closed() => {
                if incoming.is_closed() && *current != with_identity_of(current, incoming.clone()) {
                    *current = with_identity_of(current, incoming);
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
            Some(current) => {
                if incoming.is_closed() {
                    *current = with_identity_of(current, incoming);
                    summary.closed += 1;
                } else if *current != with_identity_of(current, incoming.clone()) {
                    *current = with_identity_of(current, incoming);
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
        }
    }

    summary
}

fn with_identity_of(current: &Position, mut incoming: Position) -> Position {
    incoming.opened_at = current.opened_at;
    incoming.opening_order_id = current.opening_order_id.clone();
    incoming
}
