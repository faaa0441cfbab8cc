//! Bounded worker pool driving a [`WorkUnit`] in batch or duration mode.
use crate::cleanup::CleanupCoordinator;
use crate::ledger::MetricsLedger;
use crate::limiter::rate_limiter;
use crate::workload::WorkUnit;
use futures_util::FutureExt;
use governor::DefaultDirectRateLimiter;
use stampede_core::{
    ConfigError, InvocationError, RunConfiguration, RunMode, ShutdownPolicy, WorkResult,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Live counters published while a run is in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Progress {
    pub dispatched: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: usize,
    pub elapsed: Duration,
}

impl Progress {
    /// Completions per second so far.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0. {
            self.completed as f64 / secs
        } else {
            0.
        }
    }
}

/// What the executor did, independent of the recorded outcomes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub mode: RunMode,
    pub dispatched: u64,
    pub wall_duration: Duration,
}

/// Drives a [`WorkUnit`] according to a validated [`RunConfiguration`].
///
/// The executor never prints. Progress is observable through [`Executor::progress`], and
/// outcomes land in the [`MetricsLedger`] handed to [`Executor::run`].
pub struct Executor<W: WorkUnit> {
    work: Arc<W>,
    context: Arc<W::Context>,
    config: RunConfiguration,
    mode: RunMode,
    limiter: Option<DefaultDirectRateLimiter>,
    progress: watch::Sender<Progress>,
}

impl<W: WorkUnit> Executor<W> {
    pub fn new(work: W, context: W::Context, config: RunConfiguration) -> Result<Self, ConfigError> {
        Self::from_shared(Arc::new(work), Arc::new(context), config)
    }

    pub fn from_shared(
        work: Arc<W>,
        context: Arc<W::Context>,
        config: RunConfiguration,
    ) -> Result<Self, ConfigError> {
        let mode = config.validate()?;
        let limiter = config.rate_limit.map(rate_limiter);
        let (progress, _) = watch::channel(Progress::default());
        Ok(Self {
            work,
            context,
            config,
            mode,
            limiter,
            progress,
        })
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Receiver updated every `poll_interval` and once more when the run ends.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Runs to completion, recording every admitted invocation exactly once in `ledger`.
    ///
    /// Created resource ids from successful results are handed to `resources`.
    #[instrument(name = "run", skip_all, fields(mode = ?self.mode, concurrency = self.config.max_concurrency))]
    pub async fn run(
        &self,
        ledger: &Arc<MetricsLedger>,
        resources: &Arc<CleanupCoordinator>,
    ) -> RunSummary {
        info!("Starting run with config {:?}", &self.config);

        let start = Instant::now();
        let (limit, deadline) = match self.mode {
            RunMode::Batch { total_requests } => (Some(total_requests), None),
            RunMode::Duration { duration } => (None, Some(start + duration)),
        };

        let task_data = TaskData {
            ledger: ledger.clone(),
            resources: resources.clone(),
        };
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut tasks = JoinSet::new();
        let mut dispatched = 0u64;
        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            while tasks.len() < self.config.max_concurrency && admitting(dispatched, limit, deadline)
            {
                if !self.throttle(deadline).await {
                    break;
                }

                tasks.spawn(invoke_once(
                    self.work.clone(),
                    self.context.clone(),
                    dispatched,
                    self.config.per_request_timeout,
                    stop_rx.clone(),
                    task_data.clone(),
                ));
                dispatched += 1;
            }

            if !admitting(dispatched, limit, deadline) {
                break;
            }

            tokio::select! {
                Some(joined) = tasks.join_next() => reap(joined, &task_data),
                _ = until(deadline) => trace!("Deadline reached."),
                _ = tick.tick() => self.publish(ledger, dispatched, tasks.len(), start),
            }
        }

        debug!(
            "Admission closed after {dispatched} invocations; {} in flight.",
            tasks.len()
        );

        if deadline.is_some() && self.config.shutdown == ShutdownPolicy::Abandon && !tasks.is_empty()
        {
            debug!("Abandoning {} in-flight invocations.", tasks.len());
            let _ = stop_tx.send(true);
        }

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(joined) => reap(joined, &task_data),
                    None => break,
                },
                _ = tick.tick() => self.publish(ledger, dispatched, tasks.len(), start),
            }
        }

        let wall_duration = start.elapsed();
        self.publish(ledger, dispatched, 0, start);

        info!(
            "Run complete: {} recorded in {}",
            ledger.len(),
            humantime::format_duration(wall_duration)
        );

        RunSummary {
            mode: self.mode,
            dispatched,
            wall_duration,
        }
    }

    /// Waits for the rate limiter, if any. Returns `false` if the deadline passed first.
    async fn throttle(&self, deadline: Option<Instant>) -> bool {
        let Some(limiter) = &self.limiter else {
            return true;
        };

        tokio::select! {
            _ = limiter.until_ready() => true,
            _ = until(deadline) => false,
        }
    }

    fn publish(&self, ledger: &MetricsLedger, dispatched: u64, in_flight: usize, start: Instant) {
        let succeeded = ledger.succeeded();
        let failed = ledger.failed();
        self.progress.send_replace(Progress {
            dispatched,
            completed: succeeded + failed,
            succeeded,
            failed,
            in_flight,
            elapsed: start.elapsed(),
        });
    }
}

fn admitting(dispatched: u64, limit: Option<u64>, deadline: Option<Instant>) -> bool {
    limit.map_or(true, |limit| dispatched < limit)
        && deadline.map_or(true, |deadline| Instant::now() < deadline)
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handles cloned into every invocation task.
#[derive(Clone)]
struct TaskData {
    ledger: Arc<MetricsLedger>,
    resources: Arc<CleanupCoordinator>,
}

impl TaskData {
    fn record(&self, result: WorkResult) {
        #[cfg(feature = "metrics")]
        {
            metrics::histogram!("stampede_invocation_latency").record(result.latency().as_secs_f64());
            if result.succeeded() {
                metrics::counter!("stampede_invocation_success").increment(1);
            } else {
                metrics::counter!("stampede_invocation_error").increment(1);
            }
        }

        if result.succeeded() {
            if let Some(id) = result.created_resource_id() {
                self.resources.track(id);
            }
        }
        self.ledger.record(result);
    }
}

async fn invoke_once<W: WorkUnit>(
    work: Arc<W>,
    ctx: Arc<W::Context>,
    iteration: u64,
    timeout: Duration,
    stop: watch::Receiver<bool>,
    data: TaskData,
) {
    let start = Instant::now();
    let call = AssertUnwindSafe(work.invoke(iteration, &ctx)).catch_unwind();

    let outcome = tokio::select! {
        res = tokio::time::timeout(timeout, call) => match res {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(InvocationError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(InvocationError::Timeout(timeout)),
        },
        _ = stopped(stop) => Err(InvocationError::Abandoned),
    };

    if let Err(err) = &outcome {
        trace!("Invocation {iteration} failed: {err}");
    }
    data.record(WorkResult::from_outcome(start.elapsed(), outcome));
}

/// Resolves once the stop flag is raised. Never resolves if the sender goes away.
async fn stopped(mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Invocation tasks record their own result; a join error means the task died before it could.
fn reap(joined: Result<(), JoinError>, data: &TaskData) {
    if let Err(err) = joined {
        error!("Invocation task failed before recording: {err}");
        let msg = if err.is_panic() {
            panic_message(err.into_panic().as_ref())
        } else {
            err.to_string()
        };
        data.record(WorkResult::failure(Duration::ZERO, &InvocationError::Panicked(msg)));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::work_fn;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, SkewNormal};
    use stampede_core::Completion;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn sinks(config: &RunConfiguration) -> (Arc<MetricsLedger>, Arc<CleanupCoordinator>) {
        (
            Arc::new(MetricsLedger::new(config.error_cap)),
            Arc::new(CleanupCoordinator::new()),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn batch_records_exactly_n() {
        let config = RunConfiguration::batch(500).max_concurrency(50);
        let (ledger, resources) = sinks(&config);
        let executor =
            Executor::new(work_fn(|_| async { Ok(Completion::empty()) }), (), config).unwrap();

        let summary = executor.run(&ledger, &resources).await;

        assert_eq!(summary.dispatched, 500);
        assert_eq!(ledger.len(), 500);
        assert_eq!(ledger.snapshot().len(), 500);
        assert_eq!(ledger.succeeded(), 500);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn batch_count_is_stable_across_repeats() {
        for _ in 0..20 {
            let config = RunConfiguration::batch(500).max_concurrency(50);
            let (ledger, resources) = sinks(&config);
            let executor = Executor::new(
                work_fn(|i| async move { Ok(Completion::created(i.to_string())) }),
                (),
                config,
            )
            .unwrap();
            executor.run(&ledger, &resources).await;

            assert_eq!(ledger.len(), 500);
            assert_eq!(resources.len(), 500);
        }
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn seeded_failures_give_eighty_percent() {
        let config = RunConfiguration::batch(25)
            .max_concurrency(5)
            .per_request_timeout(Duration::from_secs(5));
        let (ledger, resources) = sinks(&config);
        let executor = Executor::new(
            work_fn(|i| async move {
                if i % 5 == 0 {
                    Err(InvocationError::Status(500))
                } else {
                    Ok(Completion::empty())
                }
            }),
            (),
            config,
        )
        .unwrap();

        let summary = executor.run(&ledger, &resources).await;
        let stats = ledger.snapshot().statistics(summary.wall_duration).unwrap();

        assert_eq!(stats.succeeded, 20);
        assert_eq!(stats.failed, 5);
        assert_eq!(stats.success_rate, 80.);
        assert_eq!(ledger.snapshot().errors.get("HTTP 500"), 5);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn never_exceeds_max_concurrency() {
        let active = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));

        let work = {
            let active = active.clone();
            let peak = peak.clone();
            work_fn(move |_| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(Completion::empty())
                }
            })
        };

        let config = RunConfiguration::batch(60).max_concurrency(7);
        let (ledger, resources) = sinks(&config);
        Executor::new(work, (), config)
            .unwrap()
            .run(&ledger, &resources)
            .await;

        assert_eq!(ledger.len(), 60);
        assert_eq!(peak.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn timeouts_are_recorded_not_retried() {
        let calls = Arc::new(AtomicU64::new(0));
        let work = {
            let calls = calls.clone();
            work_fn(move |i| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if i % 2 == 0 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok(Completion::empty())
                }
            })
        };

        let config = RunConfiguration::batch(10)
            .max_concurrency(2)
            .per_request_timeout(Duration::from_millis(50));
        let (ledger, resources) = sinks(&config);
        Executor::new(work, (), config)
            .unwrap()
            .run(&ledger, &resources)
            .await;

        let snapshot = ledger.snapshot();
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(snapshot.len(), 10);
        assert_eq!(snapshot.errors.get("Timeout after 50ms"), 5);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn panics_become_failed_results() {
        let work = work_fn(|i| async move {
            if i == 3 {
                panic!("boom");
            }
            Ok(Completion::empty())
        });

        let config = RunConfiguration::batch(8).max_concurrency(3);
        let (ledger, resources) = sinks(&config);
        Executor::new(work, (), config)
            .unwrap()
            .run(&ledger, &resources)
            .await;

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 8);
        assert_eq!(snapshot.errors.get("Work unit panicked: boom"), 1);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn panics_before_the_future_starts_are_recorded_once() {
        let work = work_fn(|i| {
            if i == 3 || i == 5 {
                panic!("sync boom");
            }
            async { Ok(Completion::empty()) }
        });

        let config = RunConfiguration::batch(8).max_concurrency(3);
        let (ledger, resources) = sinks(&config);
        let summary = Executor::new(work, (), config)
            .unwrap()
            .run(&ledger, &resources)
            .await;

        let snapshot = ledger.snapshot();
        assert_eq!(summary.dispatched, 8);
        assert_eq!(snapshot.len(), 8);
        assert_eq!(ledger.succeeded(), 6);
        assert_eq!(snapshot.errors.get("Work unit panicked: sync boom"), 2);
        assert_eq!(snapshot.errors.distinct(), 1);
    }

    #[tokio::test]
    async fn only_successful_ids_are_tracked() {
        let work = work_fn(|i| async move {
            if i < 2 {
                Err(InvocationError::rejected("no"))
            } else {
                Ok(Completion::created(format!("id-{i}")))
            }
        });

        let config = RunConfiguration::batch(5).max_concurrency(5);
        let (ledger, resources) = sinks(&config);
        Executor::new(work, (), config)
            .unwrap()
            .run(&ledger, &resources)
            .await;

        let mut ids = resources.ids();
        ids.sort();
        assert_eq!(ids, vec!["id-2", "id-3", "id-4"]);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn duration_mode_returns_within_bound() {
        let mut rng = SmallRng::seed_from_u64(7);
        let normal = SkewNormal::new(0.02f64, 0.01, 20.).unwrap();
        let delays: Vec<f64> = (0..10_000)
            .map(|_| normal.sample(&mut rng).max(0.))
            .collect();
        let delays = Arc::new(delays);

        let work = work_fn(move |i| {
            let delay = delays[i as usize % delays.len()];
            async move {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                Ok(Completion::empty())
            }
        });

        let duration = Duration::from_secs(2);
        let timeout = Duration::from_millis(500);
        let poll = Duration::from_millis(100);
        let config = RunConfiguration::timed(duration)
            .max_concurrency(10)
            .per_request_timeout(timeout)
            .poll_interval(poll);
        let (ledger, resources) = sinks(&config);
        let executor = Executor::new(work, (), config).unwrap();

        let started = std::time::Instant::now();
        let summary = executor.run(&ledger, &resources).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= duration);
        assert!(elapsed <= duration + timeout + poll, "took {elapsed:?}");
        assert_eq!(ledger.len(), summary.dispatched);
        assert!(summary.dispatched > 10);

        let progress = *executor.progress().borrow();
        assert_eq!(progress.completed, summary.dispatched);
        assert_eq!(progress.in_flight, 0);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn drain_waits_for_slow_invocations() {
        let work = work_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(Completion::empty())
        });

        let config = RunConfiguration::timed(Duration::from_millis(100))
            .max_concurrency(4)
            .per_request_timeout(Duration::from_secs(1));
        let (ledger, resources) = sinks(&config);
        let summary = Executor::new(work, (), config)
            .unwrap()
            .run(&ledger, &resources)
            .await;

        assert_eq!(summary.dispatched, 4);
        assert_eq!(ledger.succeeded(), 4);
        assert!(summary.wall_duration >= Duration::from_millis(300));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn abandon_stops_in_flight_work_at_deadline() {
        let work = work_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Completion::empty())
        });

        let config = RunConfiguration::timed(Duration::from_millis(100))
            .max_concurrency(4)
            .per_request_timeout(Duration::from_secs(30))
            .shutdown(ShutdownPolicy::Abandon);
        let (ledger, resources) = sinks(&config);
        let summary = Executor::new(work, (), config)
            .unwrap()
            .run(&ledger, &resources)
            .await;

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.errors.get("Abandoned at shutdown"), 4);
        assert!(summary.wall_duration < Duration::from_secs(1));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn rate_limit_throttles_admission() {
        let config = RunConfiguration::batch(6)
            .max_concurrency(6)
            .rate_limit(std::num::NonZeroU32::new(20).unwrap());
        let (ledger, resources) = sinks(&config);
        let summary = Executor::new(work_fn(|_| async { Ok(Completion::empty()) }), (), config)
            .unwrap()
            .run(&ledger, &resources)
            .await;

        assert_eq!(ledger.len(), 6);
        // First cell is free, the remaining five are spaced 50ms apart.
        assert!(summary.wall_duration >= Duration::from_millis(240));
    }

    #[test]
    fn invalid_config_fails_fast() {
        let err = Executor::new(
            work_fn(|_| async { Ok(Completion::empty()) }),
            (),
            RunConfiguration::batch(10).max_concurrency(0),
        )
        .err();
        assert_eq!(err, Some(ConfigError::ZeroConcurrency));
    }
}
