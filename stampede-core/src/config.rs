use crate::{ConfigError, DEFAULT_ERROR_CAP, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::num::NonZeroU32;
use std::time::Duration;

/// What happens to in-flight invocations once a duration-mode deadline passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPolicy {
    /// Let every in-flight invocation finish or hit its own timeout.
    #[default]
    Drain,
    /// Signal in-flight invocations to stop; each is recorded as abandoned.
    Abandon,
}

/// Execution mode selected by a validated [`RunConfiguration`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Batch { total_requests: u64 },
    Duration { duration: Duration },
}

/// Parameters of a single load run.
///
/// Exactly one of `total_requests` (batch mode) or `duration` (duration mode) must be set.
///
/// # Example
/// ```
/// use stampede_core::{RunConfiguration, RunMode};
/// use std::time::Duration;
///
/// let config = RunConfiguration::batch(25)
///     .max_concurrency(5)
///     .per_request_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.validate(), Ok(RunMode::Batch { total_requests: 25 }));
/// ```
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub total_requests: Option<u64>,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub duration: Option<Duration>,
    pub max_concurrency: usize,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub per_request_timeout: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub poll_interval: Duration,
    pub shutdown: ShutdownPolicy,
    pub rate_limit: Option<NonZeroU32>,
    pub error_cap: usize,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            total_requests: None,
            duration: None,
            max_concurrency: 1,
            per_request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown: ShutdownPolicy::default(),
            rate_limit: None,
            error_cap: DEFAULT_ERROR_CAP,
        }
    }
}

impl RunConfiguration {
    /// Fixed-count run of `total_requests` invocations.
    pub fn batch(total_requests: u64) -> Self {
        Self {
            total_requests: Some(total_requests),
            ..Self::default()
        }
    }

    /// Fixed-duration run admitting new work until `duration` has elapsed.
    pub fn timed(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..Self::default()
        }
    }

    pub fn total_requests(mut self, total_requests: u64) -> Self {
        self.total_requests = Some(total_requests);
        self
    }

    pub fn run_for(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn per_request_timeout(mut self, timeout: Duration) -> Self {
        self.per_request_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn shutdown(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown = policy;
        self
    }

    /// Throttle admission to at most `per_second` new invocations per second.
    pub fn rate_limit(mut self, per_second: NonZeroU32) -> Self {
        self.rate_limit = Some(per_second);
        self
    }

    pub fn error_cap(mut self, cap: usize) -> Self {
        self.error_cap = cap;
        self
    }

    pub fn validate(&self) -> Result<RunMode, ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.per_request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }

        match (self.total_requests, self.duration) {
            (None, None) => Err(ConfigError::MissingMode),
            (Some(_), Some(_)) => Err(ConfigError::ConflictingMode),
            (Some(0), None) => Err(ConfigError::ZeroRequests),
            (Some(total_requests), None) => Ok(RunMode::Batch { total_requests }),
            (None, Some(duration)) if duration.is_zero() => Err(ConfigError::ZeroDuration),
            (None, Some(duration)) => Ok(RunMode::Duration { duration }),
        }
    }
}
