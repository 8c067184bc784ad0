//! Leased Periodic Jobs
//!
//! Background loops that must run on one instance at a time (SLA monitor,
//! dashboard reporter, case-sync reconciler). Each tick first takes or renews
//! a TTL lease in the shared cache; instances that do not hold it skip the
//! tick. The lease is advisory: a tick that outlives its TTL can overlap with
//! the next holder, so every job keeps its writes idempotent.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tix_database::CacheStore;
use tix_utils::TixResult;

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn tick(&self) -> TixResult<()>;
}

#[derive(Clone)]
pub struct Lease {
    cache: Arc<dyn CacheStore>,
    key: String,
    owner: String,
    ttl: Duration,
}

impl Lease {
    pub fn new(cache: Arc<dyn CacheStore>, key: String, owner: String, ttl: Duration) -> Self {
        Self { cache, key, owner, ttl }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn acquire(&self) -> TixResult<bool> {
        self.cache.acquire_lease(&self.key, &self.owner, self.ttl).await
    }

    pub async fn release(&self) {
        match self.cache.release_lease(&self.key, &self.owner).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(lease = %self.key, "Lease already gone at release"),
            Err(e) => tracing::warn!(lease = %self.key, error = %e, "Lease release failed"),
        }
    }
}

/// Outcome of one scheduled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ran,
    Failed,
    NotLeader,
    LeaseUnavailable,
}

/// Run a single tick under the lease.
pub async fn run_once(job: &dyn PeriodicJob, lease: &Lease) -> TickOutcome {
    match lease.acquire().await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(job = job.name(), lease = %lease.key, "Another instance holds the lease");
            return TickOutcome::NotLeader;
        }
        Err(e) => {
            tracing::warn!(job = job.name(), lease = %lease.key, error = %e, "Lease store unavailable, skipping tick");
            return TickOutcome::LeaseUnavailable;
        }
    }

    let outcome = match job.tick().await {
        Ok(()) => TickOutcome::Ran,
        Err(e) => {
            tracing::error!(job = job.name(), error = %e, "Scheduled tick failed");
            TickOutcome::Failed
        }
    };

    lease.release().await;
    outcome
}

/// Tick every `interval` until `cancel` fires.
pub async fn run_leased(job: Arc<dyn PeriodicJob>, lease: Lease, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        job = job.name(),
        lease = %lease.key,
        interval_secs = interval.as_secs(),
        "Scheduled job started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job = job.name(), "Scheduled job stopping");
                break;
            }
            _ = ticker.tick() => {
                run_once(job.as_ref(), &lease).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tix_database::memory::InMemoryStore;
    use tix_utils::TixError;

    struct Counting {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PeriodicJob for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn tick(&self) -> TixResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TixError::internal("boom"))
            } else {
                Ok(())
            }
        }
    }

    fn lease(store: &Arc<InMemoryStore>, owner: &str) -> Lease {
        Lease::new(store.clone(), "tix:lease:test".into(), owner.into(), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_only_lease_holder_ticks() {
        let store = Arc::new(InMemoryStore::new());
        let job = Counting { runs: AtomicUsize::new(0), fail: false };

        store.acquire_lease("tix:lease:test", "other", Duration::from_secs(30)).await.unwrap();
        assert_eq!(run_once(&job, &lease(&store, "me")).await, TickOutcome::NotLeader);
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        store.expire_lease("tix:lease:test").await;
        assert_eq!(run_once(&job, &lease(&store, "me")).await, TickOutcome::Ran);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        // Released after the tick.
        assert!(store.lease_holder("tix:lease:test").await.is_none());
    }

    #[tokio::test]
    async fn test_lease_store_failure_skips_tick() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_leases(true);
        let job = Counting { runs: AtomicUsize::new(0), fail: false };

        assert_eq!(run_once(&job, &lease(&store, "me")).await, TickOutcome::LeaseUnavailable);
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_tick_still_releases() {
        let store = Arc::new(InMemoryStore::new());
        let job = Counting { runs: AtomicUsize::new(0), fail: true };

        assert_eq!(run_once(&job, &lease(&store, "me")).await, TickOutcome::Failed);
        assert!(store.lease_holder("tix:lease:test").await.is_none());
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancel() {
        let store = Arc::new(InMemoryStore::new());
        let job = Arc::new(Counting { runs: AtomicUsize::new(0), fail: false });
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_leased(
            job.clone(),
            lease(&store, "me"),
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(job.runs.load(Ordering::SeqCst) >= 1);
    }
}
