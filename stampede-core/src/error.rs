use std::time::Duration;
use thiserror::Error;

/// Rejections raised by [`crate::RunConfiguration::validate`] before any work starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Neither a request count nor a duration was configured")]
    MissingMode,

    #[error("Both a request count and a duration were configured; pick one")]
    ConflictingMode,

    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("per_request_timeout must be non-zero")]
    ZeroTimeout,

    #[error("total_requests must be at least 1")]
    ZeroRequests,

    #[error("duration must be non-zero")]
    ZeroDuration,

    #[error("poll_interval must be non-zero")]
    ZeroPollInterval,
}

/// A single work unit invocation failed. Always folded into the ledger, never escalated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Timeout after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Work unit panicked: {0}")]
    Panicked(String),

    #[error("Abandoned at shutdown")]
    Abandoned,
}

impl InvocationError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    #[error("Statistics requested over an empty result set")]
    EmptyResultSet,
}

/// A single compensating deletion failed. Logged and counted, never raised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CleanupError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl CleanupError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
