use metrics_util::AtomicBucket;
use stampede_core::{AggregateStatistics, ErrorTally, StatsError, WorkResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Concurrent accumulator of every invocation outcome for a single run.
///
/// Results are appended to a lock-free bucket. The error tally sits behind a mutex that is
/// only taken for failed results, and only for the duration of one map update.
pub struct MetricsLedger {
    results: AtomicBucket<WorkResult>,
    success: AtomicU64,
    error: AtomicU64,
    errors: Mutex<ErrorTally>,
}

impl Default for MetricsLedger {
    fn default() -> Self {
        Self::new(stampede_core::DEFAULT_ERROR_CAP)
    }
}

impl MetricsLedger {
    /// Creates an empty ledger keeping at most `error_cap` distinct error messages.
    pub fn new(error_cap: usize) -> Self {
        Self {
            results: AtomicBucket::new(),
            success: AtomicU64::new(0),
            error: AtomicU64::new(0),
            errors: Mutex::new(ErrorTally::new(error_cap)),
        }
    }

    pub fn record(&self, result: WorkResult) {
        if let Some(msg) = result.error() {
            // A panic while holding the lock cannot leave the tally half-updated.
            let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
            errors.add(msg);
            drop(errors);
            self.error.fetch_add(1, Ordering::Relaxed);
        } else {
            self.success.fetch_add(1, Ordering::Relaxed);
        }
        self.results.push(result);
    }

    pub fn succeeded(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.error.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> u64 {
        self.succeeded() + self.failed()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything recorded so far. Safe to call while workers keep recording.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let errors = self
            .errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        LedgerSnapshot {
            results: self.results.data(),
            errors,
        }
    }
}

/// Frozen view of a [`MetricsLedger`].
#[derive(Clone, Debug)]
pub struct LedgerSnapshot {
    pub results: Vec<WorkResult>,
    pub errors: ErrorTally,
}

impl LedgerSnapshot {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> u64 {
        self.results.iter().filter(|r| r.succeeded()).count() as u64
    }

    pub fn statistics(&self, wall_duration: Duration) -> Result<AggregateStatistics, StatsError> {
        AggregateStatistics::from_results(&self.results, wall_duration)
    }
}
