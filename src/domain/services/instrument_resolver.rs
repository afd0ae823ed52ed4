//! Instrument lot-size resolution
//!
//! Cache-first lookups of instrument details. Misses go to the broker one at a
//! time, each call waiting on a shared rate limiter. A failed lookup yields
//! lot size 1 and the raw instrument id as name. The failure is remembered for
//! the rest of the session but never cached, so the next sync tries again.

use crate::domain::entities::account::AccountRef;
use crate::domain::entities::instrument::InstrumentCacheEntry;
use crate::domain::entities::order::instrument_key;
use crate::domain::repositories::broker_client::BrokerClient;
use crate::rate_limit::LookupRateLimiter;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Source of lot sizes for the position grouper
#[async_trait]
pub trait InstrumentLookup: Send {
    /// Resolve details, going to the network on a miss
    async fn resolve(&mut self, instrument_id: &str, route_id: &str) -> InstrumentCacheEntry;

    /// Cached details only, never a network call
    fn peek(&self, instrument_id: &str, route_id: &str) -> Option<InstrumentCacheEntry>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverStats {
    pub hits: u64,
    pub fetched: u64,
    pub failures: u64,
}

pub struct InstrumentResolver<'a> {
    client: &'a dyn BrokerClient,
    account: &'a AccountRef,
    limiter: Option<LookupRateLimiter>,
    cache: BTreeMap<String, InstrumentCacheEntry>,
    // Keys that failed during this session; kept out of the cache
    failed: HashSet<String>,
    stats: ResolverStats,
}

impl<'a> InstrumentResolver<'a> {
    pub fn new(
        client: &'a dyn BrokerClient,
        account: &'a AccountRef,
        cache: BTreeMap<String, InstrumentCacheEntry>,
        limiter: Option<LookupRateLimiter>,
    ) -> Self {
        Self {
            client,
            account,
            limiter,
            cache,
            failed: HashSet::new(),
            stats: ResolverStats::default(),
        }
    }

    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    /// Hand the cache back for persistence
    pub fn into_cache(self) -> BTreeMap<String, InstrumentCacheEntry> {
        self.cache
    }
}

#[async_trait]
impl<'a> InstrumentLookup for InstrumentResolver<'a> {
    async fn resolve(&mut self, instrument_id: &str, route_id: &str) -> InstrumentCacheEntry {
        let key = instrument_key(instrument_id, route_id);
        if let Some(entry) = self.cache.get(&key) {
            self.stats.hits += 1;
            return entry.clone();
        }
        if self.failed.contains(&key) {
            return InstrumentCacheEntry::fallback(instrument_id, Utc::now());
        }

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        match self
            .client
            .fetch_instrument(self.account, instrument_id, route_id)
            .await
        {
            Ok(details) => {
                let entry = InstrumentCacheEntry::from_details(instrument_id, details, Utc::now());
                debug!(
                    account_id = %self.account.account_id,
                    instrument_key = %key,
                    lot_size = entry.lot_size,
                    "Fetched instrument details"
                );
                self.stats.fetched += 1;
                self.cache.insert(key, entry.clone());
                entry
            }
            Err(e) => {
                warn!(
                    account_id = %self.account.account_id,
                    instrument_key = %key,
                    "Instrument lookup failed, using lot size 1: {}",
                    e
                );
                self.stats.failures += 1;
                self.failed.insert(key);
                InstrumentCacheEntry::fallback(instrument_id, Utc::now())
            }
        }
    }

    fn peek(&self, instrument_id: &str, route_id: &str) -> Option<InstrumentCacheEntry> {
        self.cache.get(&instrument_key(instrument_id, route_id)).cloned()
    }
}
