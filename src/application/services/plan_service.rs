use crate::domain::entities::plan::PlanLimits;
use crate::domain::repositories::document_store::{PlanSource, StoreError};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type PendingLookup = Shared<BoxFuture<'static, Result<Option<PlanLimits>, StoreError>>>;
type PendingLookups = Arc<Mutex<HashMap<String, (u64, PendingLookup)>>>;

/// Subscription limits per user
///
/// Concurrent lookups for the same user share one call to the source, and
/// answers are kept for a short TTL. A user without a subscription gets the
/// Free tier. Source failures also yield the Free tier but are not cached.
pub struct PlanService {
    source: Arc<dyn PlanSource>,
    ttl: Duration,
    cache: Mutex<LruCache<String, (Instant, PlanLimits)>>,
    // In-flight lookups tagged with a generation; each removes its own entry
    pending: PendingLookups,
    generation: AtomicU64,
}

impl PlanService {
    pub fn new(source: Arc<dyn PlanSource>, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            ttl,
            cache: Mutex::new(LruCache::new(capacity)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn limits(&self, user_id: &str) -> PlanLimits {
        if let Some(plan) = self.cached(user_id).await {
            debug!(user_id, "Plan cache hit");
            return plan;
        }

        let lookup = {
            let mut pending = self.pending.lock().await;
            let (_, lookup) = pending.entry(user_id.to_string()).or_insert_with(|| {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let source = self.source.clone();
                let registry = self.pending.clone();
                let user = user_id.to_string();
                let lookup = async move {
                    let result = source.find_plan(&user).await;
                    let mut pending = registry.lock().await;
                    if pending
                        .get(&user)
                        .is_some_and(|(current, _)| *current == generation)
                    {
                        pending.remove(&user);
                    }
                    result
                }
                .boxed()
                .shared();
                (generation, lookup)
            });
            lookup.clone()
        };

        let result = lookup.await;

        match result {
            Ok(found) => {
                let plan = found.unwrap_or_else(|| {
                    debug!(user_id, "No subscription, applying Free tier");
                    PlanLimits::free()
                });
                self.cache
                    .lock()
                    .await
                    .put(user_id.to_string(), (Instant::now(), plan.clone()));
                plan
            }
            Err(e) => {
                warn!(user_id, error = %e, "Plan lookup failed, applying Free tier");
                PlanLimits::free()
            }
        }
    }

    async fn cached(&self, user_id: &str) -> Option<PlanLimits> {
        let mut cache = self.cache.lock().await;
        match cache.get(user_id) {
            Some((stored_at, plan)) if stored_at.elapsed() < self.ttl => Some(plan.clone()),
            Some(_) => {
                cache.pop(user_id);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
impl PlanService {
    async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingSource {
        calls: AtomicUsize,
        plan: Option<PlanLimits>,
        fail: bool,
    }

    impl CountingSource {
        fn new(plan: Option<PlanLimits>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                plan,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                plan: None,
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlanSource for CountingSource {
        async fn find_plan(&self, _user_id: &str) -> Result<Option<PlanLimits>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            if self.fail {
                return Err(StoreError("database is locked".into()));
            }
            Ok(self.plan.clone())
        }
    }

    fn pro_plan() -> PlanLimits {
        PlanLimits {
            max_accounts: 10,
            max_strategies: 5,
            plan_name: "Pro".into(),
            is_active: true,
            is_banned: false,
            is_cancelled: false,
        }
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_call() {
        let source = CountingSource::new(Some(pro_plan()));
        let service = PlanService::new(source.clone(), Duration::from_secs(2), 16);

        let (a, b, c) = tokio::join!(
            service.limits("user-1"),
            service.limits("user-1"),
            service.limits("user-1")
        );

        assert_eq!(a.plan_name, "Pro");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_within_ttl() {
        let source = CountingSource::new(Some(pro_plan()));
        let service = PlanService::new(source.clone(), Duration::from_secs(2), 16);

        service.limits("user-1").await;
        service.limits("user-1").await;
        assert_eq!(source.calls(), 1);

        service.limits("user-2").await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let source = CountingSource::new(Some(pro_plan()));
        let service = PlanService::new(source.clone(), Duration::ZERO, 16);

        service.limits("user-1").await;
        service.limits("user-1").await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_subscription_is_free_tier() {
        let source = CountingSource::new(None);
        let service = PlanService::new(source, Duration::from_secs(2), 16);

        assert_eq!(service.limits("user-1").await, PlanLimits::free());
    }

    #[tokio::test]
    async fn test_source_failure_is_free_tier_and_not_cached() {
        let source = CountingSource::failing();
        let service = PlanService::new(source.clone(), Duration::from_secs(2), 16);

        assert_eq!(service.limits("user-1").await, PlanLimits::free());
        assert_eq!(service.limits("user-1").await, PlanLimits::free());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_pending_entry_cleared_after_lookup() {
        let source = CountingSource::new(Some(pro_plan()));
        let service = PlanService::new(source.clone(), Duration::from_secs(2), 16);

        service.limits("user-1").await;
        assert_eq!(service.pending_len().await, 0);

        let failing = PlanService::new(CountingSource::failing(), Duration::from_secs(2), 16);
        failing.limits("user-1").await;
        assert_eq!(failing.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_abandoned_lookup_is_reused_then_cleared() {
        let source = CountingSource::new(Some(pro_plan()));
        let service = PlanService::new(source.clone(), Duration::from_secs(2), 16);

        let abandoned = tokio::time::timeout(Duration::from_millis(5), service.limits("user-1")).await;
        assert!(abandoned.is_err());
        assert_eq!(service.pending_len().await, 1);

        assert_eq!(service.limits("user-1").await.plan_name, "Pro");
        assert_eq!(service.pending_len().await, 0);
        assert_eq!(source.calls(), 1);
    }
}
