#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod assessment;
pub mod cleanup;
pub mod error;
pub mod executor;
pub mod harness;
pub mod ledger;
pub mod reporter;
pub mod workload;

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;

pub(crate) mod limiter;

/// Plain data types shared with `stampede-core`.
pub use stampede_core as core;

pub use executor::Executor;
pub use harness::LoadTest;
pub use ledger::MetricsLedger;

pub mod prelude {
    pub use crate::assessment::{Assessment, Rating};
    pub use crate::cleanup::{delete_fn, CleanupCoordinator, CleanupReport, Deleter};
    pub use crate::error::HarnessError;
    pub use crate::executor::{Executor, Progress, RunSummary};
    pub use crate::harness::{LoadTest, LoadTestReport};
    pub use crate::ledger::{LedgerSnapshot, MetricsLedger};
    pub use crate::reporter::Reporter;
    pub use crate::workload::{work_fn, WorkUnit};

    #[cfg(feature = "http")]
    pub use crate::http::{
        payload_sweep, HttpContext, HttpDeleter, MultipartUpload, Payload, PayloadSweep,
    };

    pub use stampede_core::{
        AggregateStatistics, CleanupError, Completion, ConfigError, ErrorTally, InvocationError,
        RunConfiguration, RunMode, ShutdownPolicy, StatsError, WorkResult,
    };
}
