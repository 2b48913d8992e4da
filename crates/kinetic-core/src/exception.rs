//! The exception router contract.
//!
//! Any error that escapes a task body, a worker's run loop, or a service
//! listener callback is routed here instead of propagating to a submitter
//! or crashing a worker thread. Implementations must tolerate concurrent
//! calls from every worker and may route their own internal errors back
//! through themselves.

use std::fmt;

use crate::task::{BoxError, TaskId};

/// Where an error came from, handed to the [`ExceptionHandler`] alongside
/// the error itself.
#[derive(Debug, Clone, Copy)]
pub enum ExceptionSource {
    /// Raised from inside a task body (event, result, or one cycle of a
    /// cyclic task).
    TaskBody,
    /// Raised from a worker's own run loop, outside any task body.
    WorkerLoop,
    /// Raised from a [`ServiceListener`](crate::listener::ServiceListener)
    /// callback.
    Listener,
}

impl fmt::Display for ExceptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskBody => write!(f, "task body"),
            Self::WorkerLoop => write!(f, "worker loop"),
            Self::Listener => write!(f, "listener"),
        }
    }
}

/// Context accompanying a routed error.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionContext<'a> {
    /// Which task raised the error, if any (worker-loop errors have none).
    pub task_id: Option<TaskId>,
    /// The name of the worker thread the error occurred on.
    pub worker_name: &'a str,
    /// Where in the pipeline the error was caught.
    pub source: ExceptionSource,
}

/// Receives every error that a service or worker catches instead of
/// letting it propagate.
///
/// Guaranteed to be called for every escaped error; implementations
/// should not panic or throw back into the caller.
pub trait ExceptionHandler: Send + Sync {
    /// Handle one routed error. Must return.
    fn handle(&self, ctx: ExceptionContext<'_>, error: BoxError);
}

/// Turn a `catch_unwind` payload into a displayable message, falling back
/// to a generic message for panics that didn't use a `&str` or `String`.
pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with no string payload".to_string()
    }
}

/// An [`ExceptionHandler`] that forwards every error to `tracing::error!`.
///
/// The default handler for services that don't configure their own; this
/// mirrors how `horizon-lattice-core` logs through `tracing` rather than
/// printing directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExceptionHandler;

impl ExceptionHandler for TracingExceptionHandler {
    fn handle(&self, ctx: ExceptionContext<'_>, error: BoxError) {
        tracing::error!(
            target: "kinetic_core::exception",
            worker = ctx.worker_name,
            task_id = ctx.task_id.map(|id| id.as_u64()),
            source = %ctx.source,
            error = %error,
            "task error routed to exception handler"
        );
    }
}
