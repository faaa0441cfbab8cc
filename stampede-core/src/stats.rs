use crate::{StatsError, WorkResult};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::fmt;
use std::time::Duration;

/// Linear interpolation between closest ranks over an ascending slice.
///
/// `p` is in `[0, 100]` (values outside are clamped). For `n` samples the rank is
/// `p / 100 * (n - 1)`; a fractional rank interpolates between its neighbours.
/// Returns `None` on an empty slice or a NaN `p`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || p.is_nan() {
        return None;
    }

    let p = p.clamp(0., 100.);
    let rank = (p / 100.) * (sorted.len() - 1) as f64;
    let lower = rank.floor();
    let idx = lower as usize;
    let frac = rank - lower;

    if frac == 0. {
        Some(sorted[idx])
    } else {
        let (lo, hi) = (sorted[idx], sorted[idx + 1]);
        Some(lo + (hi - lo) * frac)
    }
}

/// [`percentile`] over ascending latencies, interpolated at nanosecond resolution.
pub fn latency_percentile(sorted: &[Duration], p: f64) -> Option<Duration> {
    let nanos: Vec<f64> = sorted.iter().map(|d| d.as_nanos() as f64).collect();
    percentile(&nanos, p).map(|n| Duration::from_nanos(n.round() as u64))
}

/// Read-only summary of a run, derived from a ledger snapshot.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatistics {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub mean: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub min: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub max: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub median: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub p95: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub p99: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub std_dev: Duration,
    /// Completed invocations per second of wall time. Zero when no wall time elapsed.
    pub throughput: f64,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub wall_duration: Duration,
}

impl AggregateStatistics {
    /// Computes statistics from every latency sample (successes and failures) of a run.
    pub fn compute(
        latencies: &[Duration],
        succeeded: u64,
        wall_duration: Duration,
    ) -> Result<Self, StatsError> {
        if latencies.is_empty() {
            return Err(StatsError::EmptyResultSet);
        }

        let total = latencies.len() as u64;
        let succeeded = succeeded.min(total);
        let failed = total - succeeded;

        let mut sorted = latencies.to_vec();
        sorted.sort_unstable();

        let sum: u128 = sorted.iter().map(Duration::as_nanos).sum();
        let mean = Duration::from_nanos((sum / total as u128) as u64);

        let secs: Vec<f64> = sorted.iter().map(Duration::as_secs_f64).collect();
        let std_dev = statistical::population_standard_deviation(&secs, None);
        let std_dev = if std_dev.is_finite() {
            Duration::from_secs_f64(std_dev)
        } else {
            Duration::ZERO
        };

        let wall_secs = wall_duration.as_secs_f64();
        let throughput = if wall_secs > 0. {
            total as f64 / wall_secs
        } else {
            0.
        };

        // `sorted` is non-empty from here on.
        let pct = |p: f64| latency_percentile(&sorted, p).unwrap_or_default();

        Ok(Self {
            total,
            succeeded,
            failed,
            success_rate: succeeded as f64 / total as f64 * 100.,
            mean,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            median: pct(50.),
            p95: pct(95.),
            p99: pct(99.),
            std_dev,
            throughput,
            wall_duration,
        })
    }

    pub fn from_results(results: &[WorkResult], wall_duration: Duration) -> Result<Self, StatsError> {
        let latencies: Vec<Duration> = results.iter().map(WorkResult::latency).collect();
        let succeeded = results.iter().filter(|r| r.succeeded()).count() as u64;
        Self::compute(&latencies, succeeded, wall_duration)
    }
}

impl fmt::Display for AggregateStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total={}, Success={:.1}%, RPS={:.2}, mean={:?}, p50={:?}, p95={:?}, p99={:?}",
            self.total,
            self.success_rate,
            self.throughput,
            self.mean,
            self.median,
            self.p95,
            self.p99,
        )
    }
}
