//! Error types for Kinetic's services and workers.
//!
//! User task bodies never surface their errors here — those are routed to
//! the submitter's [`ExceptionHandler`](crate::exception::ExceptionHandler)
//! instead. This module only covers invariant violations and configuration
//! mistakes that a caller should see synchronously.

/// Result type alias for Kinetic operations.
pub type Result<T> = std::result::Result<T, KineticError>;

/// Errors that can occur when configuring or driving a service.
#[derive(Debug, thiserror::Error)]
pub enum KineticError {
    /// A task was submitted to a service that has not been activated yet.
    #[error("service has not been activated")]
    ServiceNotActive,

    /// A task was submitted after `shutdown()` (or a variant) was called.
    #[error("service is shutting down or has already shut down")]
    ServiceShuttingDown,

    /// A [`ScaleWorker`](crate::scale_worker::ScaleWorker) was assigned a task
    /// while its single slot was already occupied.
    ///
    /// The dispatcher guarantees this should never happen; seeing it
    /// indicates a bug in the service's worker-selection logic.
    #[error("scale worker slot already occupied")]
    SlotOccupied,

    /// The Scalable service was asked to run a cyclic task, which it does
    /// not support (see the Open Questions in DESIGN.md).
    #[error("the scalable service does not accept cyclic tasks")]
    CyclicNotSupported,

    /// `worker_count` (assisted) or `max` (scalable) was zero, or `min` >
    /// `max`.
    #[error("invalid service configuration: {0}")]
    InvalidConfig(&'static str),
}
