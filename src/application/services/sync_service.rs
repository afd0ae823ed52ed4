//! Account sync orchestration
//!
//! Decides per request whether the persisted document is fresh enough to
//! serve, runs the fetch → normalize → group → merge → metrics pipeline when
//! it is not, and assembles the dashboard view.
//!
//! ## Freshness
//! - fresh document: served as is
//! - stale document: served immediately, resync spawned in the background
//!   (at most one in flight per account)
//! - no document, or one that cannot be read: resync inline
//!
//! Concurrent writers are last-writer-wins, except that a result whose sync
//! started before the stored document's `last_sync` is discarded.

use crate::config::{FallbackPolicy, SyncConfig};
use crate::domain::entities::account::{AccountDocument, AccountRef, SyncMetadata};
use crate::domain::entities::calendar::CalendarMonth;
use crate::domain::entities::position::Position;
use crate::domain::errors::{BrokerError, IntervalError, ValidationError};
use crate::domain::repositories::broker_client::BrokerClient;
use crate::domain::repositories::document_store::{AccountDocumentStore, StoreError};
use crate::domain::services::calendar::{build_month, StrategyIntervals};
use crate::domain::services::instrument_resolver::{InstrumentResolver, ResolverStats};
use crate::domain::services::metrics::{MetricsSummary, TradingMetrics};
use crate::domain::services::order_normalizer::{normalize, NormalizationStats};
use crate::domain::services::position_grouper::{group_positions, merge_positions, MergeSummary};
use crate::rate_limit::LookupRateLimiter;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Interval(#[from] IntervalError),

    #[error(transparent)]
    InvalidMonth(#[from] ValidationError),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Broker(e) if e.is_auth())
    }
}

/// What the caller wants to look at
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub year: i32,
    pub month: u32,
    pub intervals: StrategyIntervals,
}

/// Where the dashboard data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Synced during this request
    Fresh,
    /// Persisted document within the resync threshold
    Cached,
    /// Persisted document past the threshold; a resync was scheduled
    Stale,
    /// Zeroed values standing in for a failed sync
    Defaults,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub positions: Vec<Position>,
    pub metrics: TradingMetrics,
    pub summary: MetricsSummary,
    pub calendar: CalendarMonth,
    pub sync_metadata: SyncMetadata,
    pub source: DataSource,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct ResyncReport {
    pub sync_metadata: SyncMetadata,
    pub normalization: NormalizationStats,
    pub merge: MergeSummary,
    pub instruments: ResolverStats,
    /// A newer sync finished first and this result was thrown away
    pub discarded: bool,
}

#[derive(Clone)]
pub struct SyncService {
    broker: Arc<dyn BrokerClient>,
    store: Arc<dyn AccountDocumentStore>,
    accounts: Arc<HashMap<String, AccountRef>>,
    lookup_limiter: Option<LookupRateLimiter>,
    resync_threshold: chrono::Duration,
    fallback_policy: FallbackPolicy,
    in_flight: Arc<Mutex<HashSet<String>>>,
    // Serializes the compare-and-save step of concurrent resyncs
    save_lock: Arc<Mutex<()>>,
}

impl SyncService {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        store: Arc<dyn AccountDocumentStore>,
        lookup_limiter: Option<LookupRateLimiter>,
        config: &SyncConfig,
    ) -> Self {
        let accounts = config
            .accounts
            .iter()
            .map(|account| (account.account_id.clone(), account.clone()))
            .collect();

        Self {
            broker,
            store,
            accounts: Arc::new(accounts),
            lookup_limiter,
            resync_threshold: config.resync_threshold,
            fallback_policy: config.fallback_policy,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn account(&self, account_id: &str) -> Option<&AccountRef> {
        self.accounts.get(account_id)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub async fn is_resyncing(&self, account_id: &str) -> bool {
        self.in_flight.lock().await.contains(account_id)
    }

    /// Serve the dashboard for an account, syncing when needed
    pub async fn load_or_sync(&self, account_id: &str, view: &DashboardView) -> Result<Dashboard, SyncError> {
        let account = self
            .account(account_id)
            .ok_or_else(|| SyncError::UnknownAccount(account_id.to_string()))?
            .clone();
        NaiveDate::from_ymd_opt(view.year, view.month, 1).ok_or(ValidationError::InvalidMonth {
            year: view.year,
            month: view.month,
        })?;

        let now = Utc::now();
        match self.load_cached(account_id).await {
            Some(document) if !document.sync_metadata.needs_resync(now, self.resync_threshold) => {
                debug!(account_id, "Serving cached document");
                build_dashboard(&document, view, now, DataSource::Cached)
            }
            Some(document) => {
                info!(
                    account_id,
                    last_sync = %document.sync_metadata.last_sync,
                    "Document is stale, scheduling background resync"
                );
                self.spawn_background_resync(account).await;
                build_dashboard(&document, view, now, DataSource::Stale)
            }
            None => match self.resync(&account).await {
                Ok((document, _)) => build_dashboard(&document, view, Utc::now(), DataSource::Fresh),
                Err(e) if e.is_auth() || self.fallback_policy == FallbackPolicy::Propagate => Err(e),
                Err(e) => {
                    warn!(account_id, error = %e, "Sync failed, serving zeroed defaults");
                    let defaults = AccountDocument::empty(DateTime::<Utc>::default());
                    build_dashboard(&defaults, view, now, DataSource::Defaults)
                }
            },
        }
    }

    /// Run the pipeline now, regardless of document age
    ///
    /// Errors are always returned to the caller.
    pub async fn force_resync(&self, account_id: &str) -> Result<ResyncReport, SyncError> {
        let account = self
            .account(account_id)
            .ok_or_else(|| SyncError::UnknownAccount(account_id.to_string()))?
            .clone();
        let (_, report) = self.resync(&account).await?;
        Ok(report)
    }

    async fn load_cached(&self, account_id: &str) -> Option<AccountDocument> {
        match self.store.load(account_id).await {
            Ok(document) => document,
            Err(e) => {
                warn!(account_id, error = %e, "Cannot read cached document, treating as a miss");
                None
            }
        }
    }

    /// Returns false when a resync for this account is already running
    async fn spawn_background_resync(&self, account: AccountRef) -> bool {
        if !self.in_flight.lock().await.insert(account.account_id.clone()) {
            debug!(account_id = %account.account_id, "Background resync already in flight");
            return false;
        }

        let service = self.clone();
        tokio::spawn(async move {
            let account_id = account.account_id.clone();
            match service.resync(&account).await {
                Ok((_, report)) => info!(
                    account_id = %account_id,
                    total_positions = report.sync_metadata.total_positions,
                    discarded = report.discarded,
                    "Background resync finished"
                ),
                Err(e) => error!(account_id = %account_id, error = %e, "Background resync failed"),
            }
            service.in_flight.lock().await.remove(&account_id);
        });
        true
    }

    async fn resync(&self, account: &AccountRef) -> Result<(AccountDocument, ResyncReport), SyncError> {
        let account_id = account.account_id.as_str();
        let started_at = Utc::now();

        let prior = self.load_cached(account_id).await;
        let history = self.broker.fetch_history(account).await?;
        let (orders, normalization) = normalize(&history);

        let (mut positions, cache) = match prior {
            Some(document) => (document.positions, document.instrument_cache),
            None => Default::default(),
        };

        let mut resolver =
            InstrumentResolver::new(self.broker.as_ref(), account, cache, self.lookup_limiter.clone());
        let fresh = group_positions(&orders, &mut resolver).await;
        let instruments = resolver.stats().clone();
        let instrument_cache = resolver.into_cache();

        let merge = merge_positions(&mut positions, fresh);
        let document = AccountDocument {
            metrics: TradingMetrics::from_positions(positions.values()),
            sync_metadata: SyncMetadata::from_positions(positions.values(), started_at),
            positions,
            instrument_cache,
        };

        let _guard = self.save_lock.lock().await;
        if let Some(current) = self.load_cached(account_id).await {
            if current.sync_metadata.last_sync > started_at {
                info!(account_id, "A newer sync already finished, discarding this result");
                let report = ResyncReport {
                    sync_metadata: current.sync_metadata.clone(),
                    normalization,
                    merge,
                    instruments,
                    discarded: true,
                };
                return Ok((current, report));
            }
        }
        self.store.save(account_id, &document).await?;

        info!(
            account_id,
            accepted_orders = normalization.accepted,
            inserted = merge.inserted,
            closed = merge.closed,
            open_positions = document.sync_metadata.open_positions,
            closed_positions = document.sync_metadata.closed_positions,
            instrument_lookups = instruments.fetched,
            "Account synced"
        );

        let report = ResyncReport {
            sync_metadata: document.sync_metadata.clone(),
            normalization,
            merge,
            instruments,
            discarded: false,
        };
        Ok((document, report))
    }
}

fn build_dashboard(
    document: &AccountDocument,
    view: &DashboardView,
    now: DateTime<Utc>,
    source: DataSource,
) -> Result<Dashboard, SyncError> {
    let positions = document.positions_sorted();
    let calendar = build_month(view.year, view.month, &positions, &view.intervals, now)?;

    Ok(Dashboard {
        summary: document.metrics.summary(),
        metrics: document.metrics.clone(),
        sync_metadata: document.sync_metadata.clone(),
        positions,
        calendar,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_accounts;
    use crate::domain::entities::history::HistoryPayload;
    use crate::domain::entities::instrument::InstrumentDetails;
    use crate::domain::repositories::broker_client::BrokerResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct MockBrokerClient {
        history: StdMutex<Result<Value, BrokerError>>,
        history_calls: AtomicUsize,
        instrument_calls: AtomicUsize,
        delay: Duration,
    }

    impl MockBrokerClient {
        fn with_history(body: Value) -> Arc<Self> {
            Arc::new(Self {
                history: StdMutex::new(Ok(body)),
                history_calls: AtomicUsize::new(0),
                instrument_calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn failing(error: BrokerError) -> Arc<Self> {
            Arc::new(Self {
                history: StdMutex::new(Err(error)),
                history_calls: AtomicUsize::new(0),
                instrument_calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(body: Value, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                history: StdMutex::new(Ok(body)),
                history_calls: AtomicUsize::new(0),
                instrument_calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn set_history(&self, body: Value) {
            *self.history.lock().unwrap() = Ok(body);
        }
    }

    #[async_trait]
    impl BrokerClient for MockBrokerClient {
        async fn fetch_history(&self, _account: &AccountRef) -> BrokerResult<HistoryPayload> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let body = self.history.lock().unwrap().clone()?;
            HistoryPayload::sniff(&body).map_err(BrokerError::InvalidResponse)
        }

        async fn fetch_instrument(
            &self,
            _account: &AccountRef,
            instrument_id: &str,
            _route_id: &str,
        ) -> BrokerResult<InstrumentDetails> {
            self.instrument_calls.fetch_add(1, Ordering::SeqCst);
            Ok(InstrumentDetails {
                name: Some(format!("INST-{}", instrument_id)),
                lot_size: Some(10.0),
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        documents: StdMutex<HashMap<String, AccountDocument>>,
        fail_reads: bool,
        saves: AtomicUsize,
    }

    impl MemoryStore {
        fn get(&self, account_id: &str) -> Option<AccountDocument> {
            self.documents.lock().unwrap().get(account_id).cloned()
        }

        fn put(&self, account_id: &str, document: AccountDocument) {
            self.documents
                .lock()
                .unwrap()
                .insert(account_id.to_string(), document);
        }
    }

    #[async_trait]
    impl AccountDocumentStore for MemoryStore {
        async fn load(&self, account_id: &str) -> Result<Option<AccountDocument>, StoreError> {
            if self.fail_reads {
                return Err(StoreError("disk I/O error".into()));
            }
            Ok(self.get(account_id))
        }

        async fn save(&self, account_id: &str, document: &AccountDocument) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.put(account_id, document.clone());
            Ok(())
        }
    }

    fn trade(position_id: i64, open: f64, close: Option<f64>) -> Value {
        let mut trade = json!({
            "positionId": position_id,
            "instrumentId": "206",
            "routeId": "9",
            "side": "buy",
            "qty": 1,
            "openPrice": open,
            "openDate": "2024-03-04T09:00:00Z",
        });
        if let Some(close) = close {
            trade["closePrice"] = json!(close);
            trade["closeDate"] = json!("2024-03-04T15:00:00Z");
        }
        trade
    }

    fn grouped(trades: Vec<Value>) -> Value {
        json!({ "details": { "trades": trades } })
    }

    fn config(policy: FallbackPolicy) -> SyncConfig {
        SyncConfig {
            accounts: parse_accounts("acc-1:1:token"),
            fallback_policy: policy,
            ..SyncConfig::default()
        }
    }

    fn view() -> DashboardView {
        DashboardView {
            year: 2024,
            month: 3,
            intervals: StrategyIntervals::default(),
        }
    }

    fn service(
        broker: Arc<MockBrokerClient>,
        store: Arc<MemoryStore>,
        policy: FallbackPolicy,
    ) -> SyncService {
        SyncService::new(broker, store, None, &config(policy))
    }

    #[tokio::test]
    async fn test_cold_start_syncs_inline_and_persists() {
        let broker = MockBrokerClient::with_history(grouped(vec![
            trade(1, 100.0, Some(102.0)),
            trade(2, 50.0, None),
        ]));
        let store = Arc::new(MemoryStore::default());
        let service = service(broker.clone(), store.clone(), FallbackPolicy::SafeDefaults);

        let dashboard = service.load_or_sync("acc-1", &view()).await.unwrap();

        assert_eq!(dashboard.source, DataSource::Fresh);
        assert_eq!(dashboard.positions.len(), 2);
        assert_eq!(dashboard.metrics.net_pnl, 20.0);
        assert_eq!(dashboard.metrics.total_trades, 1);
        assert_eq!(dashboard.sync_metadata.open_positions, 1);
        assert_eq!(dashboard.calendar.total_trades, 1);
        assert_eq!(broker.instrument_calls.load(Ordering::SeqCst), 1);

        let stored = store.get("acc-1").unwrap();
        assert_eq!(stored.positions.len(), 2);
        assert!(stored.instrument_cache.contains_key("206-9"));
    }

    #[tokio::test]
    async fn test_fresh_document_is_served_without_broker_calls() {
        let broker = MockBrokerClient::with_history(grouped(vec![trade(1, 100.0, Some(102.0))]));
        let store = Arc::new(MemoryStore::default());
        let service = service(broker.clone(), store, FallbackPolicy::SafeDefaults);

        service.load_or_sync("acc-1", &view()).await.unwrap();
        let second = service.load_or_sync("acc-1", &view()).await.unwrap();

        assert_eq!(second.source, DataSource::Cached);
        assert_eq!(broker.history_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_document_served_then_refreshed_in_background() {
        let broker = MockBrokerClient::with_history(grouped(vec![trade(1, 100.0, None)]));
        let store = Arc::new(MemoryStore::default());
        let service = service(broker.clone(), store.clone(), FallbackPolicy::SafeDefaults);

        service.force_resync("acc-1").await.unwrap();
        let mut document = store.get("acc-1").unwrap();
        document.sync_metadata.last_sync = Utc::now() - chrono::Duration::hours(48);
        store.put("acc-1", document);

        broker.set_history(grouped(vec![trade(1, 100.0, Some(101.0))]));
        let dashboard = service.load_or_sync("acc-1", &view()).await.unwrap();
        assert_eq!(dashboard.source, DataSource::Stale);
        assert!(dashboard.positions[0].is_open);

        for _ in 0..50 {
            if !service.is_resyncing("acc-1").await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let refreshed = store.get("acc-1").unwrap();
        let position = &refreshed.positions["1"];
        assert!(!position.is_open);
        assert_eq!(position.pnl.value(), 10.0);
        assert!(!refreshed
            .sync_metadata
            .needs_resync(Utc::now(), chrono::Duration::hours(24)));
    }

    #[tokio::test]
    async fn test_background_resync_is_deduplicated() {
        let broker = MockBrokerClient::slow(grouped(vec![]), Duration::from_millis(100));
        let store = Arc::new(MemoryStore::default());
        store.put("acc-1", AccountDocument::empty(Utc::now() - chrono::Duration::hours(48)));
        let service = service(broker.clone(), store, FallbackPolicy::SafeDefaults);

        for _ in 0..3 {
            let dashboard = service.load_or_sync("acc-1", &view()).await.unwrap();
            assert_eq!(dashboard.source, DataSource::Stale);
        }
        assert!(service.is_resyncing("acc-1").await);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(broker.history_calls.load(Ordering::SeqCst), 1);
        assert!(!service.is_resyncing("acc-1").await);
    }

    #[tokio::test]
    async fn test_upstream_failure_serves_defaults() {
        let broker = MockBrokerClient::failing(BrokerError::Timeout);
        let store = Arc::new(MemoryStore::default());
        let service = service(broker, store.clone(), FallbackPolicy::SafeDefaults);

        let dashboard = service.load_or_sync("acc-1", &view()).await.unwrap();
        assert_eq!(dashboard.source, DataSource::Defaults);
        assert!(dashboard.positions.is_empty());
        assert_eq!(dashboard.metrics, TradingMetrics::default());
        assert!(store.get("acc-1").is_none());
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates_when_configured() {
        let broker = MockBrokerClient::failing(BrokerError::Timeout);
        let service = service(broker, Arc::new(MemoryStore::default()), FallbackPolicy::Propagate);

        let err = service.load_or_sync("acc-1", &view()).await.unwrap_err();
        assert!(matches!(err, SyncError::Broker(BrokerError::Timeout)));
    }

    #[tokio::test]
    async fn test_auth_failure_always_propagates() {
        let broker = MockBrokerClient::failing(BrokerError::Unauthorized("expired".into()));
        let service = service(broker, Arc::new(MemoryStore::default()), FallbackPolicy::SafeDefaults);

        let err = service.load_or_sync("acc-1", &view()).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_unreadable_cache_is_a_miss() {
        let broker = MockBrokerClient::with_history(grouped(vec![trade(1, 100.0, Some(99.0))]));
        let store = Arc::new(MemoryStore {
            fail_reads: true,
            ..MemoryStore::default()
        });
        let service = service(broker.clone(), store.clone(), FallbackPolicy::SafeDefaults);

        let dashboard = service.load_or_sync("acc-1", &view()).await.unwrap();
        assert_eq!(dashboard.source, DataSource::Fresh);
        assert_eq!(dashboard.metrics.net_pnl, -10.0);
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_account_and_invalid_month() {
        let broker = MockBrokerClient::with_history(grouped(vec![]));
        let service = service(broker.clone(), Arc::new(MemoryStore::default()), FallbackPolicy::SafeDefaults);

        let err = service.load_or_sync("nope", &view()).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownAccount(_)));

        let bad_month = DashboardView { month: 13, ..view() };
        let err = service.load_or_sync("acc-1", &bad_month).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidMonth(_)));
        assert_eq!(broker.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resync_never_deletes_or_reopens() {
        let broker = MockBrokerClient::with_history(grouped(vec![
            trade(1, 100.0, Some(102.0)),
            trade(2, 50.0, None),
        ]));
        let store = Arc::new(MemoryStore::default());
        let service = service(broker.clone(), store.clone(), FallbackPolicy::SafeDefaults);
        service.force_resync("acc-1").await.unwrap();

        // Broker history window moved on: position 1 dropped out, 2 closed
        broker.set_history(grouped(vec![trade(2, 50.0, Some(49.0))]));
        let report = service.force_resync("acc-1").await.unwrap();

        assert_eq!(report.merge.closed, 1);
        assert_eq!(report.sync_metadata.total_positions, 2);
        assert_eq!(report.sync_metadata.closed_positions, 2);
        // instrument cache carried over from the first run
        assert_eq!(report.instruments.fetched, 0);
        assert_eq!(broker.instrument_calls.load(Ordering::SeqCst), 1);

        let document = store.get("acc-1").unwrap();
        assert_eq!(document.metrics.net_pnl, 10.0);
    }

    #[tokio::test]
    async fn test_older_result_is_discarded() {
        let broker = MockBrokerClient::slow(grouped(vec![trade(1, 100.0, None)]), Duration::from_millis(50));
        let store = Arc::new(MemoryStore::default());
        let service = service(broker, store.clone(), FallbackPolicy::SafeDefaults);

        let slow = {
            let service = service.clone();
            tokio::spawn(async move { service.force_resync("acc-1").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut newer = AccountDocument::empty(Utc::now() + chrono::Duration::seconds(5));
        newer.metrics.net_pnl = 123.0;
        store.put("acc-1", newer);

        let report = slow.await.unwrap().unwrap();
        assert!(report.discarded);
        assert_eq!(store.get("acc-1").unwrap().metrics.net_pnl, 123.0);
    }
}
