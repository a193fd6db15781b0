//! Freshness cache holding the current snapshot.
//!
//! Readers clone an `Arc<Snapshot>` out of a read lock and never wait on the
//! network. Refreshes are serialised by a separate mutex so at most one
//! upstream fetch is in flight; callers that arrive while one is running wait
//! for it and reuse its result instead of fetching again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::FetchError;
use crate::fetcher::Fetcher;
use crate::index::{IdentifierIndex, build_index};
use crate::model::Dataset;

/// Time source for freshness decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A dataset paired with the index derived from it. Immutable.
#[derive(Debug)]
pub struct Snapshot {
    dataset: Dataset,
    index: IdentifierIndex,
    fetched_at: DateTime<Utc>,
    generation: u64,
}

impl Snapshot {
    pub fn new(dataset: Dataset, fetched_at: DateTime<Utc>, generation: u64) -> Self {
        let index = build_index(&dataset);
        Self {
            dataset,
            index,
            fetched_at,
            generation,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn index(&self) -> &IdentifierIndex {
        &self.index
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Increments by one for every snapshot installed by the same cache.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub populated: bool,
    pub generation: Option<u64>,
    pub items: usize,
    pub indexed: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
    pub ttl_secs: u64,
    pub stale: bool,
}

pub struct SnapshotCache {
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entry: RwLock<Option<Arc<Snapshot>>>,
    /// Outcome of the most recent fetch attempt.
    refresh: Mutex<Option<Result<Arc<Snapshot>, FetchError>>>,
    /// Number of finished fetch attempts. Only written under `refresh`.
    attempts: AtomicU64,
}

impl SnapshotCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, ttl: Duration) -> Self {
        Self::with_clock(fetcher, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(fetcher: Arc<dyn Fetcher>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            clock,
            ttl,
            entry: RwLock::new(None),
            refresh: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        self.clock.now() - snapshot.fetched_at < ttl
    }

    /// Return a usable snapshot, fetching a new one if there is none, the
    /// current one has expired, or `force` is set.
    ///
    /// Callers that queue up behind a fetch already in progress receive that
    /// fetch's outcome, success or failure, instead of starting another one.
    /// A failed fetch leaves the installed snapshot untouched.
    pub async fn get_snapshot(&self, force: bool) -> Result<Arc<Snapshot>, FetchError> {
        let observed_attempts = self.attempts.load(Ordering::Acquire);
        if !force {
            let current = self.entry.read().await.clone();
            if let Some(snapshot) = current.filter(|s| self.is_fresh(s)) {
                return Ok(snapshot);
            }
        }

        let mut last_outcome = self.refresh.lock().await;

        if self.attempts.load(Ordering::Acquire) != observed_attempts {
            if let Some(outcome) = last_outcome.as_ref() {
                return outcome.clone();
            }
        }

        let previous = self.entry.read().await.clone();
        let generation = previous.as_ref().map_or(0, |s| s.generation) + 1;
        let outcome = match self.fetcher.fetch().await {
            Ok(dataset) => {
                let snapshot = Arc::new(Snapshot::new(dataset, self.clock.now(), generation));
                info!(
                    source = self.fetcher.source(),
                    generation,
                    items = snapshot.dataset.items().len(),
                    indexed = snapshot.index.len(),
                    forced = force,
                    "dataset snapshot installed"
                );
                if snapshot.index.is_empty() {
                    warn!(generation, "installed snapshot has no bangumi identifiers");
                }
                *self.entry.write().await = Some(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    source = self.fetcher.source(),
                    error = %e,
                    has_previous = previous.is_some(),
                    "dataset fetch failed"
                );
                Err(e)
            }
        };

        *last_outcome = Some(outcome.clone());
        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Describe the installed snapshot without fetching.
    pub async fn status(&self) -> CacheStatus {
        let current = self.entry.read().await.clone();
        let ttl_secs = self.ttl.as_secs();
        match current {
            Some(snapshot) => CacheStatus {
                populated: true,
                generation: Some(snapshot.generation),
                items: snapshot.dataset.items().len(),
                indexed: snapshot.index.len(),
                fetched_at: Some(snapshot.fetched_at),
                age_secs: Some((self.clock.now() - snapshot.fetched_at).num_seconds()),
                ttl_secs,
                stale: !self.is_fresh(&snapshot),
            },
            None => CacheStatus {
                populated: false,
                generation: None,
                items: 0,
                indexed: 0,
                fetched_at: None,
                age_secs: None,
                ttl_secs,
                stale: true,
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::model::tests::sample_json;

    /// Serves the sample dataset, counting calls and tracking overlap.
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        pub calls: AtomicUsize,
        pub fail: AtomicBool,
        pub delay_ms: u64,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl StubFetcher {
        pub(crate) fn slow(delay_ms: u64) -> Self {
            Self {
                delay_ms,
                ..Default::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Fetcher for StubFetcher {
        fn source(&self) -> &str {
            "stub"
        }

        async fn fetch(&self) -> Result<Dataset, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Status(500));
            }
            Ok(serde_json::from_value(sample_json()).unwrap())
        }
    }

    pub(crate) struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self(StdMutex::new(
                DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ))
        }

        pub(crate) fn advance(&self, secs: i64) {
            *self.0.lock().unwrap() += TimeDelta::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn cache(fetcher: &Arc<StubFetcher>, clock: &Arc<ManualClock>) -> SnapshotCache {
        SnapshotCache::with_clock(
            fetcher.clone(),
            Duration::from_secs(3600),
            clock.clone(),
        )
    }

    #[tokio::test]
    async fn empty_cache_fetches_once_then_serves_from_memory() {
        let fetcher = Arc::new(StubFetcher::default());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&fetcher, &clock);

        let first = cache.get_snapshot(false).await.unwrap();
        clock.advance(3599);
        for _ in 0..5 {
            let again = cache.get_snapshot(false).await.unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(first.generation(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_replaced() {
        let fetcher = Arc::new(StubFetcher::default());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&fetcher, &clock);

        let first = cache.get_snapshot(false).await.unwrap();
        clock.advance(3600);
        let second = cache.get_snapshot(false).await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.generation(), 2);
        assert_eq!(second.fetched_at(), clock.now());
    }

    #[tokio::test]
    async fn failed_fetch_on_empty_cache_stays_empty() {
        let fetcher = Arc::new(StubFetcher::default());
        fetcher.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&fetcher, &clock);

        assert_eq!(
            cache.get_snapshot(false).await.unwrap_err(),
            FetchError::Status(500)
        );
        assert!(!cache.status().await.populated);

        fetcher.fail.store(false, Ordering::SeqCst);
        assert_eq!(cache.get_snapshot(false).await.unwrap().generation(), 1);
    }

    #[tokio::test]
    async fn failed_forced_refresh_keeps_previous_entry() {
        let fetcher = Arc::new(StubFetcher::default());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&fetcher, &clock);

        let first = cache.get_snapshot(false).await.unwrap();
        fetcher.fail.store(true, Ordering::SeqCst);

        assert!(cache.get_snapshot(true).await.is_err());
        let after = cache.get_snapshot(false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &after));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_of_expired_entry_is_reported() {
        let fetcher = Arc::new(StubFetcher::default());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&fetcher, &clock);

        cache.get_snapshot(false).await.unwrap();
        clock.advance(7200);
        fetcher.fail.store(true, Ordering::SeqCst);

        assert!(cache.get_snapshot(false).await.is_err());
        let status = cache.status().await;
        assert!(status.populated);
        assert!(status.stale);
        assert_eq!(status.generation, Some(1));
    }

    #[tokio::test]
    async fn concurrent_callers_at_expiry_share_one_fetch() {
        let fetcher = Arc::new(StubFetcher::slow(50));
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(cache(&fetcher, &clock));

        cache.get_snapshot(false).await.unwrap();
        clock.advance(3600);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_snapshot(false).await.unwrap().generation() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 2);
        }

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failed_fetch() {
        let fetcher = Arc::new(StubFetcher::slow(50));
        fetcher.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(cache(&fetcher, &clock));

        let started = tokio::time::Instant::now();
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_snapshot(false).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap_err(), FetchError::Status(500));
        }

        assert_eq!(fetcher.calls(), 1);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(!cache.status().await.populated);

        // A caller arriving after the failure tries again.
        fetcher.fail.store(false, Ordering::SeqCst);
        assert_eq!(cache.get_snapshot(false).await.unwrap().generation(), 1);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_forced_refreshes_are_coalesced() {
        let fetcher = Arc::new(StubFetcher::slow(50));
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(cache(&fetcher, &clock));

        cache.get_snapshot(false).await.unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_snapshot(true).await.unwrap().generation() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 2);
        }

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn readers_are_not_blocked_by_a_slow_refresh() {
        let fetcher = Arc::new(StubFetcher::slow(200));
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(cache(&fetcher, &clock));

        cache.get_snapshot(false).await.unwrap();

        let refresher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_snapshot(true).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let read = tokio::time::timeout(Duration::from_millis(100), cache.get_snapshot(false))
            .await
            .expect("read should not wait for the refresh")
            .unwrap();
        assert_eq!(read.generation(), 1);

        assert_eq!(refresher.await.unwrap().unwrap().generation(), 2);
    }

    #[tokio::test]
    async fn status_reports_age_and_ttl() {
        let fetcher = Arc::new(StubFetcher::default());
        let clock = Arc::new(ManualClock::new());
        let cache = cache(&fetcher, &clock);

        let empty = cache.status().await;
        assert!(!empty.populated);
        assert_eq!(empty.ttl_secs, 3600);

        cache.get_snapshot(false).await.unwrap();
        clock.advance(120);
        let status = cache.status().await;
        assert_eq!(status.items, 2);
        assert_eq!(status.indexed, 1);
        assert_eq!(status.age_secs, Some(120));
        assert!(!status.stale);
        assert_eq!(fetcher.calls(), 1);
    }
}
