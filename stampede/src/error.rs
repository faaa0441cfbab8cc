use stampede_core::{ConfigError, StatsError};
use thiserror::Error;

/// Errors surfaced synchronously to the caller of a run.
///
/// Invocation and cleanup failures never show up here; they are folded into the ledger and
/// the cleanup report respectively.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("Invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stats(#[from] StatsError),
}
