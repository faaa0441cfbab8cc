//! One load test scenario end to end: execute, summarize, clean up.
use crate::cleanup::{CleanupCoordinator, CleanupReport, Deleter, NoCleanup};
use crate::executor::{Executor, Progress, RunSummary};
use crate::ledger::MetricsLedger;
use crate::workload::WorkUnit;
use futures_util::FutureExt;
use stampede_core::{
    AggregateStatistics, ConfigError, ErrorTally, RunConfiguration, StatsError,
    DEFAULT_CLEANUP_TIMEOUT,
};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Executor, statistics and cleanup wired together for a single scenario.
pub struct LoadTest<W: WorkUnit, D = NoCleanup> {
    executor: Executor<W>,
    deleter: D,
    cleanup_timeout: Duration,
}

/// Everything a finished [`LoadTest`] produced.
#[derive(Clone, Debug)]
pub struct LoadTestReport {
    pub summary: RunSummary,
    pub statistics: Result<AggregateStatistics, StatsError>,
    pub errors: ErrorTally,
    pub cleanup: CleanupReport,
}

impl LoadTestReport {
    pub fn statistics(&self) -> Result<&AggregateStatistics, StatsError> {
        self.statistics.as_ref().map_err(|e| *e)
    }
}

impl<W: WorkUnit> LoadTest<W> {
    /// Validates `config` up front; nothing runs on error.
    pub fn new(work: W, context: W::Context, config: RunConfiguration) -> Result<Self, ConfigError> {
        Ok(Self {
            executor: Executor::new(work, context, config)?,
            deleter: NoCleanup,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        })
    }
}

impl<W: WorkUnit, D: Deleter> LoadTest<W, D> {
    /// Deletes every resource created by a successful invocation once the run ends.
    pub fn cleanup_with<N: Deleter>(self, deleter: N) -> LoadTest<W, N> {
        LoadTest {
            executor: self.executor,
            deleter,
            cleanup_timeout: self.cleanup_timeout,
        }
    }

    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.executor.progress()
    }

    /// Runs the scenario. Cleanup always happens, including when the run itself panics, in
    /// which case the panic is resumed after cleanup.
    pub async fn run(self) -> LoadTestReport {
        let ledger = Arc::new(MetricsLedger::new(self.executor.config().error_cap));
        let resources = Arc::new(CleanupCoordinator::with_timeout(self.cleanup_timeout));

        let (outcome, cleanup) = cleaned_up(
            self.executor.run(&ledger, &resources),
            &resources,
            &self.deleter,
        )
        .await;

        let summary = match outcome {
            Ok(summary) => summary,
            Err(panic) => {
                error!("Run aborted by a panic; created resources were cleaned up.");
                panic::resume_unwind(panic);
            }
        };

        let snapshot = ledger.snapshot();
        let statistics = snapshot.statistics(summary.wall_duration);
        if let Err(err) = &statistics {
            warn!("No statistics for this run: {err}");
        }

        LoadTestReport {
            summary,
            statistics,
            errors: snapshot.errors,
            cleanup,
        }
    }
}

/// Drives `run` to completion or panic, then cleans up whatever was tracked either way.
async fn cleaned_up<T, D: Deleter>(
    run: impl Future<Output = T>,
    resources: &CleanupCoordinator,
    deleter: &D,
) -> (thread::Result<T>, CleanupReport) {
    let outcome = AssertUnwindSafe(run).catch_unwind().await;
    let cleanup = resources.cleanup(deleter).await;
    (outcome, cleanup)
}
