//! The tagged Executable a worker actually runs.
//!
//! Per the Design Notes, this is a sum type rather than a polymorphic
//! executable hierarchy: an [`Executable`] is either a one-shot event/result
//! task bound to an outer [`Handle`], or a long-running cyclic loop bound to
//! a [`CyclicHandle`]. Workers store these behind one type so the deque and
//! dispatch logic never need to be generic over task or result types.

use std::sync::Arc;
use std::time::Duration;

use crate::cyclic::{CyclicConfig, CyclicExecutable};
use crate::exception::{ExceptionContext, ExceptionHandler, ExceptionSource};
use crate::handle::{self, Handle};
use crate::task::{CyclicTask, EventTask, ResultTask, TaskId};

/// Drives a type-erased cyclic executable so a worker's run loop need not
/// be generic over the task type it happens to be running.
pub(crate) trait CyclicRunner: Send + Sync {
    fn run(&self, exceptions: &dyn ExceptionHandler);
    fn terminate(&self);
}

struct CyclicRunnerImpl<T: CyclicTask> {
    cyclic: Arc<CyclicExecutable<T>>,
    executor: handle::Executor<u64>,
}

impl<T: CyclicTask> CyclicRunner for CyclicRunnerImpl<T> {
    fn run(&self, exceptions: &dyn ExceptionHandler) {
        let cyclic = &self.cyclic;
        self.executor.execute(|| Some(cyclic.run(exceptions)));
    }

    fn terminate(&self) {
        self.cyclic.terminate();
    }
}

/// One unit of work pulled off a worker's queue.
///
/// The `Once` closure form captures everything it needs (the task body,
/// the outer handle's [`Executor`](handle::Executor)); it only still needs
/// the executing worker's name and exception router, supplied at call
/// time since work-stealing means the worker running it isn't necessarily
/// the one that created it.
pub(crate) enum Executable {
    Once(Box<dyn FnOnce(&str, &dyn ExceptionHandler) + Send>),
    Cyclic(Arc<dyn CyclicRunner>),
}

impl Executable {
    /// `true` if this is a cyclic executable — used by a dispatcher to
    /// skip workers currently occupied running one.
    pub(crate) fn is_cyclic(&self) -> bool {
        matches!(self, Executable::Cyclic(_))
    }

    /// If this is a cyclic executable, the type-erased runner, so the
    /// owning worker can stash a back-pointer for `request_terminate` to
    /// cut an in-progress inter-cycle sleep short.
    pub(crate) fn cyclic_runner(&self) -> Option<Arc<dyn CyclicRunner>> {
        match self {
            Executable::Cyclic(runner) => Some(runner.clone()),
            Executable::Once(_) => None,
        }
    }

    /// Run this item to completion on the calling (worker) thread.
    pub(crate) fn run(self, worker_name: &str, exceptions: &dyn ExceptionHandler) {
        match self {
            Executable::Once(body) => body(worker_name, exceptions),
            Executable::Cyclic(runner) => runner.run(exceptions),
        }
    }
}

/// A handle to a submitted [`CyclicTask`].
///
/// `cancel` follows the same pre-execution-only semantics as event/result
/// handles (it races the outer execute's execution lock, so it only
/// succeeds before the loop starts at all). `terminate` is the
/// cyclic-specific, best-effort stop that cuts a loop short mid-run, after
/// its current cycle finishes.
pub struct CyclicHandle<T: CyclicTask> {
    handle: Handle<u64>,
    cyclic: Arc<CyclicExecutable<T>>,
}

impl<T: CyclicTask> Clone for CyclicHandle<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            cyclic: self.cyclic.clone(),
        }
    }
}

impl<T: CyclicTask> CyclicHandle<T> {
    /// The id assigned to this cyclic task at submission time.
    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    /// Attempt to cancel the task before its loop has started running at
    /// all. Once the loop has begun, use [`terminate`](Self::terminate)
    /// instead — this always returns `false` after that point.
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// Request the cycle loop stop after its current cycle. Best-effort:
    /// the in-progress cycle body always runs to completion; cleanup
    /// always runs; no subsequent cycle starts.
    pub fn terminate(&self) {
        self.cyclic.terminate();
    }

    /// `true` once `terminate()` has been called.
    pub fn is_terminate_requested(&self) -> bool {
        self.cyclic.is_terminate_requested()
    }

    /// Block until the loop has ended, whether by self-termination,
    /// exhausting its declared cycle count, or explicit `terminate()`.
    pub fn await_completion(&self) -> bool {
        self.handle.await_completion()
    }

    /// Block with a timeout; see [`Handle::await_timeout`].
    pub fn await_timeout(&self, timeout: Duration) -> bool {
        self.handle.await_timeout(timeout)
    }

    /// `true` once the loop has reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.handle.is_done()
    }

    /// The number of cycles executed so far. Available mid-run (updated
    /// live) as well as after completion, since it is a non-blocking peek
    /// rather than a consuming wait.
    pub fn cycles_run(&self) -> u64 {
        self.cyclic.cycles_run()
    }
}

/// Wrap an [`EventTask`] in its outer [`Handle`] and a runnable item.
pub(crate) fn event_item(task_id: TaskId, mut task: impl EventTask) -> (Handle<()>, Executable) {
    let (handle, executor) = handle::new_pair::<()>(task_id);
    let item = Executable::Once(Box::new(move |worker_name, exceptions| {
        executor.execute(|| match task.run() {
            Ok(()) => Some(()),
            Err(error) => {
                exceptions.handle(
                    ExceptionContext {
                        task_id: Some(task_id),
                        worker_name,
                        source: ExceptionSource::TaskBody,
                    },
                    error,
                );
                None
            }
        });
    }));
    (handle, item)
}

/// Wrap a [`ResultTask`] in its outer [`Handle`] and a runnable item.
pub(crate) fn result_item<R>(task_id: TaskId, mut task: impl ResultTask<R>) -> (Handle<R>, Executable)
where
    R: Send + 'static,
{
    let (handle, executor) = handle::new_pair::<R>(task_id);
    let item = Executable::Once(Box::new(move |worker_name, exceptions| {
        executor.execute(|| match task.run() {
            Ok(value) => Some(value),
            Err(error) => {
                exceptions.handle(
                    ExceptionContext {
                        task_id: Some(task_id),
                        worker_name,
                        source: ExceptionSource::TaskBody,
                    },
                    error,
                );
                None
            }
        });
    }));
    (handle, item)
}

/// Wrap a [`CyclicTask`] in a [`CyclicHandle`] and a runnable item.
pub(crate) fn cyclic_item<T>(
    task_id: TaskId,
    task: T,
    config: CyclicConfig,
) -> (CyclicHandle<T>, Executable)
where
    T: CyclicTask,
{
    let cyclic = Arc::new(CyclicExecutable::new(task_id, task, config));
    let (outer_handle, executor) = handle::new_pair::<u64>(task_id);
    let runner = Arc::new(CyclicRunnerImpl {
        cyclic: cyclic.clone(),
        executor,
    });
    let cyclic_handle = CyclicHandle {
        handle: outer_handle,
        cyclic,
    };
    (cyclic_handle, Executable::Cyclic(runner))
}
