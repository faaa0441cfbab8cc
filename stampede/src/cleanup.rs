//! Compensating deletion of everything a run created.
use metrics_util::AtomicBucket;
use stampede_core::{CleanupError, DEFAULT_CLEANUP_TIMEOUT};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Issues the compensating delete for one created resource.
pub trait Deleter: Send + Sync {
    fn delete(&self, id: &str) -> impl Future<Output = Result<(), CleanupError>> + Send;
}

/// A [`Deleter`] backed by a closure. See [`delete_fn`].
#[derive(Clone)]
pub struct DeleteFn<T> {
    func: T,
}

/// Wraps a closure taking the owned resource id into a [`Deleter`].
pub fn delete_fn<T, F>(func: T) -> DeleteFn<T>
where
    T: Fn(String) -> F + Send + Sync,
    F: Future<Output = Result<(), CleanupError>> + Send,
{
    DeleteFn { func }
}

impl<T, F> Deleter for DeleteFn<T>
where
    T: Fn(String) -> F + Send + Sync,
    F: Future<Output = Result<(), CleanupError>> + Send,
{
    fn delete(&self, id: &str) -> impl Future<Output = Result<(), CleanupError>> + Send {
        (self.func)(id.to_string())
    }
}

/// Used by runs that create nothing worth deleting.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCleanup;

impl Deleter for NoCleanup {
    async fn delete(&self, _id: &str) -> Result<(), CleanupError> {
        Ok(())
    }
}

/// Counted outcome of a cleanup pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_ids: Vec<String>,
}

impl CleanupReport {
    /// Folds a later pass into this one.
    pub fn absorb(&mut self, other: CleanupReport) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.failed_ids.extend(other.failed_ids);
    }
}

/// Collects created resource ids from concurrent workers and deletes each exactly once.
pub struct CleanupCoordinator {
    ids: AtomicBucket<String>,
    timeout: Duration,
}

impl Default for CleanupCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupCoordinator {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CLEANUP_TIMEOUT)
    }

    /// Each deletion is abandoned and counted as failed after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            ids: AtomicBucket::new(),
            timeout,
        }
    }

    pub fn track(&self, id: &str) {
        self.ids.push(id.to_string());
    }

    /// Distinct tracked ids.
    pub fn ids(&self) -> Vec<String> {
        dedup(self.ids.data())
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.data().is_empty()
    }

    /// Deletes every tracked id once. Ids are drained, so a second pass only sees new ones.
    ///
    /// Failures are logged and counted; nothing is raised to the caller.
    #[instrument(name = "cleanup", skip_all)]
    pub async fn cleanup<D: Deleter>(&self, deleter: &D) -> CleanupReport {
        let mut drained = vec![];
        self.ids.clear_with(|ids| drained.extend_from_slice(ids));
        let ids = dedup(drained);

        let mut report = CleanupReport {
            attempted: ids.len(),
            ..CleanupReport::default()
        };
        debug!("Deleting {} created resources.", ids.len());

        for id in ids {
            let res = match tokio::time::timeout(self.timeout, deleter.delete(&id)).await {
                Ok(res) => res,
                Err(_) => Err(CleanupError::Timeout(self.timeout)),
            };

            match res {
                Ok(()) => {
                    report.succeeded += 1;
                    #[cfg(feature = "metrics")]
                    metrics::counter!("stampede_cleanup_success").increment(1);
                }
                Err(err) => {
                    warn!("Failed to delete {id}: {err}");
                    report.failed += 1;
                    report.failed_ids.push(id);
                    #[cfg(feature = "metrics")]
                    metrics::counter!("stampede_cleanup_error").increment(1);
                }
            }
        }

        info!(
            "Cleaned up {}/{} created resources.",
            report.succeeded, report.attempted
        );
        report
    }
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
