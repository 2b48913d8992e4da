//! Task traits and the unique identifier assigned to every submission.

use std::sync::atomic::{AtomicU64, Ordering};

/// An error escaped from a task body.
///
/// Routed to an [`ExceptionHandler`](crate::exception::ExceptionHandler);
/// never surfaced to a handle's waiter.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A unique identifier assigned to every submitted task, in submission
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// The raw counter value of this id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

/// A side-effecting unit of work with no result.
///
/// Any `FnMut() -> Result<(), BoxError> + Send + 'static` implements this
/// automatically; most callers never name the trait.
pub trait EventTask: Send + 'static {
    /// Run the task body once.
    fn run(&mut self) -> Result<(), BoxError>;
}

impl<F> EventTask for F
where
    F: FnMut() -> Result<(), BoxError> + Send + 'static,
{
    fn run(&mut self) -> Result<(), BoxError> {
        self()
    }
}

/// A unit of work producing a value of type `R`.
pub trait ResultTask<R>: Send + 'static
where
    R: Send + 'static,
{
    /// Run the task body once, producing its result.
    fn run(&mut self) -> Result<R, BoxError>;
}

impl<F, R> ResultTask<R> for F
where
    F: FnMut() -> Result<R, BoxError> + Send + 'static,
    R: Send + 'static,
{
    fn run(&mut self) -> Result<R, BoxError> {
        self()
    }
}

/// A unit of work executed repeatedly by a [`CyclicExecutable`](crate::cyclic::CyclicExecutable).
///
/// `execute` returns `Ok(true)` to continue cycling, `Ok(false)` to request
/// self-termination after the current cycle. An `Err` is routed to the
/// exception handler; the cycle still counts as complete and the next cycle
/// proceeds.
pub trait CyclicTask: Send + 'static {
    /// Run one cycle of the task body.
    fn execute(&mut self) -> Result<bool, BoxError>;

    /// Called once, after the last cycle, regardless of how the loop ended.
    fn on_cleanup(&mut self) {}

    /// Called when `terminate()` is requested, so a long-running cycle body
    /// may observe the request and exit early. Best-effort: the spec makes
    /// no promise the current cycle will notice in time.
    fn on_terminate_requested(&mut self) {}
}
