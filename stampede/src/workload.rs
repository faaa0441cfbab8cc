//! The seam between the harness and the system under test.
use stampede_core::{Completion, InvocationError};
use std::future::Future;

/// One parameterized unit of simulated client load.
///
/// Called once per iteration with the iteration index and the run's shared context (an auth
/// token, a target resource id, a client). Errors are converted into failed results by the
/// executor; they never abort the run.
pub trait WorkUnit: Send + Sync + 'static {
    type Context: Send + Sync + 'static;

    fn invoke(
        &self,
        iteration: u64,
        ctx: &Self::Context,
    ) -> impl Future<Output = Result<Completion, InvocationError>> + Send;
}

/// A [`WorkUnit`] backed by a closure over the iteration index. See [`work_fn`].
#[derive(Clone)]
pub struct WorkFn<T> {
    func: T,
}

/// Wraps a closure into a [`WorkUnit`] with a unit context.
///
/// # Example
/// ```
/// use stampede::prelude::*;
///
/// let work = work_fn(|i| async move {
///     if i % 2 == 0 {
///         Ok(Completion::empty())
///     } else {
///         Err(InvocationError::rejected("odd"))
///     }
/// });
/// # let _ = work;
/// ```
pub fn work_fn<T, F>(func: T) -> WorkFn<T>
where
    T: Fn(u64) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Completion, InvocationError>> + Send + 'static,
{
    WorkFn { func }
}

impl<T, F> WorkUnit for WorkFn<T>
where
    T: Fn(u64) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Completion, InvocationError>> + Send + 'static,
{
    type Context = ();

    fn invoke(
        &self,
        iteration: u64,
        _ctx: &(),
    ) -> impl Future<Output = Result<Completion, InvocationError>> + Send {
        (self.func)(iteration)
    }
}
