use crate::InvocationError;
use std::time::Duration;

/// What a work unit hands back on success.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub created_resource_id: Option<String>,
}

impl Completion {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Success that created a resource needing compensating deletion after the run.
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            created_resource_id: Some(id.into()),
        }
    }
}

/// Outcome of one invocation. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkResult {
    latency: Duration,
    error: Option<String>,
    created_resource_id: Option<String>,
}

impl WorkResult {
    pub fn success(latency: Duration, completion: Completion) -> Self {
        Self {
            latency,
            error: None,
            created_resource_id: completion.created_resource_id,
        }
    }

    pub fn failure(latency: Duration, error: &InvocationError) -> Self {
        Self {
            latency,
            error: Some(error.to_string()),
            created_resource_id: None,
        }
    }

    pub fn from_outcome(latency: Duration, outcome: Result<Completion, InvocationError>) -> Self {
        match outcome {
            Ok(completion) => Self::success(latency, completion),
            Err(err) => Self::failure(latency, &err),
        }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_resource_id(&self) -> Option<&str> {
        self.created_resource_id.as_deref()
    }
}
