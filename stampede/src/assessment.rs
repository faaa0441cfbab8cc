//! Overall grading of a load run, optionally paired with a stress run.
use stampede_core::AggregateStatistics;
use std::fmt;
use std::time::Duration;

const EXCELLENT_LOAD_RPS: f64 = 10.;
const EXCELLENT_STRESS_RPS: f64 = 5.;
const EXCELLENT_SUCCESS_RATE: f64 = 95.;

const GOOD_LOAD_RPS: f64 = 5.;
const GOOD_STRESS_RPS: f64 = 2.;
const GOOD_SUCCESS_RATE: f64 = 90.;

const MODERATE_LOAD_RPS: f64 = 2.;
const MODERATE_SUCCESS_RATE: f64 = 80.;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rating {
    Issues,
    Moderate,
    Good,
    Excellent,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rating::Excellent => "EXCELLENT PERFORMANCE",
            Rating::Good => "GOOD PERFORMANCE",
            Rating::Moderate => "MODERATE PERFORMANCE",
            Rating::Issues => "PERFORMANCE ISSUES DETECTED",
        };
        f.write_str(text)
    }
}

impl Rating {
    pub fn advice(&self) -> &'static str {
        match self {
            Rating::Excellent => "The target can handle production load well.",
            Rating::Good => "The target performs well under normal conditions.",
            Rating::Moderate => "The target works but may need optimization for high load.",
            Rating::Issues => "Consider optimizing the target for better performance.",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Assessment {
    pub load_rps: f64,
    pub stress_rps: f64,
    pub load_success_rate: f64,
    pub stress_success_rate: Option<f64>,
    pub rating: Rating,
}

impl Assessment {
    /// Grades a load run. A missing stress run counts as zero requests per second.
    pub fn grade(load: &AggregateStatistics, stress: Option<&AggregateStatistics>) -> Self {
        let load_rps = load.throughput;
        let load_success_rate = load.success_rate;
        let stress_rps = stress.map_or(0., |s| s.throughput);

        let rating = if load_rps >= EXCELLENT_LOAD_RPS
            && stress_rps >= EXCELLENT_STRESS_RPS
            && load_success_rate >= EXCELLENT_SUCCESS_RATE
        {
            Rating::Excellent
        } else if load_rps >= GOOD_LOAD_RPS
            && stress_rps >= GOOD_STRESS_RPS
            && load_success_rate >= GOOD_SUCCESS_RATE
        {
            Rating::Good
        } else if load_rps >= MODERATE_LOAD_RPS && load_success_rate >= MODERATE_SUCCESS_RATE {
            Rating::Moderate
        } else {
            Rating::Issues
        };

        Self {
            load_rps,
            stress_rps,
            load_success_rate,
            stress_success_rate: stress.map(|s| s.success_rate),
            rating,
        }
    }
}

/// Average upload time and throughput for one payload size.
#[derive(Clone, Debug, PartialEq)]
pub struct PayloadSizeResult {
    pub description: String,
    pub size_bytes: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `None` when no upload of this size succeeded.
    pub mean: Option<Duration>,
}

impl PayloadSizeResult {
    /// Kilobytes per second over the mean successful upload time.
    pub fn throughput_kbps(&self) -> Option<f64> {
        let secs = self.mean?.as_secs_f64();
        (secs > 0.).then(|| self.size_bytes as f64 / secs / 1024.)
    }
}
