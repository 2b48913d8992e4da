//! A single-slot worker used by the elastic [`ScalableService`](crate::scalable_service::ScalableService).
//!
//! Unlike an [`AssistWorker`](crate::assist_worker::AssistWorker), a scale
//! worker holds at most one task at a time: the service hands it a task,
//! it runs, then re-inserts itself into the service's `availables` queue.
//! On-demand workers (created above the configured minimum) additionally
//! time out and remove themselves when idle for too long.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{KineticError, Result};
use crate::exception::{panic_message, ExceptionContext, ExceptionHandler, ExceptionSource};
use crate::executable::{self, Executable};
use crate::handle::Handle;
use crate::logging::{span_names, targets, PerfSpan};
use crate::scalable_service::ScalableServiceShared;
use crate::task::{EventTask, ResultTask, TaskId};
use crate::worker_base::WorkerBase;

/// A worker owned by a [`ScalableService`](crate::scalable_service::ScalableService).
pub struct ScaleWorker {
    base: WorkerBase,
    slot: Mutex<Option<Executable>>,
    wait_lock: Mutex<()>,
    wait_cv: Condvar,
    on_demand: bool,
    timeout: Option<Duration>,
    exceptions: Arc<dyn ExceptionHandler>,
    service: Weak<ScalableServiceShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ScaleWorker {
    pub(crate) fn new(
        name: String,
        on_demand: bool,
        timeout: Option<Duration>,
        exceptions: Arc<dyn ExceptionHandler>,
        service: Weak<ScalableServiceShared>,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: WorkerBase::new(name),
            slot: Mutex::new(None),
            wait_lock: Mutex::new(()),
            wait_cv: Condvar::new(),
            on_demand,
            timeout,
            exceptions,
            service,
            thread: Mutex::new(None),
        })
    }

    /// This worker's thread name.
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// `true` if this worker was created above the configured minimum
    /// (and so is subject to idle-timeout self-removal).
    pub fn is_on_demand(&self) -> bool {
        self.on_demand
    }

    pub(crate) fn start(self: &Arc<Self>) {
        let worker = self.clone();
        let name = self.base.name().to_string();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run_loop())
            .expect("failed to spawn scale worker thread");
        *self.thread.lock() = Some(handle);
    }

    pub(crate) fn request_terminate(&self) {
        self.base.request_terminate();
        let _guard = self.wait_lock.lock();
        self.wait_cv.notify_all();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.base.is_terminated()
    }

    pub(crate) fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Assign an event task to this worker's single slot.
    pub(crate) fn assign_event(&self, task_id: TaskId, task: impl EventTask) -> Result<Handle<()>> {
        let (handle, item) = executable::event_item(task_id, task);
        self.assign(item)?;
        Ok(handle)
    }

    /// Assign a result task to this worker's single slot.
    pub(crate) fn assign_result<R>(&self, task_id: TaskId, task: impl ResultTask<R>) -> Result<Handle<R>>
    where
        R: Send + 'static,
    {
        let (handle, item) = executable::result_item(task_id, task);
        self.assign(item)?;
        Ok(handle)
    }

    /// Compare-and-set the slot from empty to `item`. Fails with
    /// [`KineticError::SlotOccupied`] if already occupied — the dispatcher
    /// guarantees it only ever assigns to a worker it believes is free, so
    /// seeing this indicates a bug in worker selection, not a normal race.
    fn assign(&self, item: Executable) -> Result<()> {
        {
            let mut slot = self.slot.lock();
            if slot.is_some() {
                return Err(KineticError::SlotOccupied);
            }
            *slot = Some(item);
        }
        let _guard = self.wait_lock.lock();
        self.wait_cv.notify_all();
        Ok(())
    }

    /// Run `item`, catching a task-body panic that escaped the trait's
    /// `Result` contract so it routes to the exception handler instead of
    /// unwinding this worker's thread out from under the pool.
    fn run_guarded(&self, item: Executable) {
        let worker_name = self.base.name().to_string();
        let exceptions = self.exceptions.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            item.run(&worker_name, exceptions.as_ref());
        }));
        if let Err(payload) = outcome {
            exceptions.handle(
                ExceptionContext {
                    task_id: None,
                    worker_name: &worker_name,
                    source: ExceptionSource::WorkerLoop,
                },
                panic_message(&payload).into(),
            );
        }
    }

    fn run_loop(self: Arc<Self>) {
        loop {
            if self.base.is_terminate_requested() {
                break;
            }

            let item = self.slot.lock().take();
            if let Some(item) = item {
                let _span = PerfSpan::new(targets::SCALE_WORKER, span_names::SCALABLE_DISPATCH);
                self.run_guarded(item);
                if let Some(service) = self.service.upgrade() {
                    service.recycle(self.clone());
                }
            }

            if self.base.is_terminate_requested() {
                break;
            }

            let mut guard = self.wait_lock.lock();
            if self.base.is_terminate_requested() {
                break;
            }
            if self.slot.lock().is_some() {
                continue;
            }

            if self.on_demand {
                let timeout = self.timeout.unwrap_or(Duration::from_secs(60));
                let result = self.wait_cv.wait_for(&mut guard, timeout);
                drop(guard);

                if result.timed_out() && self.slot.lock().is_none() {
                    if let Some(service) = self.service.upgrade() {
                        if service.remove(&self) {
                            self.base.request_terminate();
                        }
                    }
                }
            } else {
                self.wait_cv.wait(&mut guard);
            }
        }

        self.base.mark_terminated();
    }
}

impl std::fmt::Debug for ScaleWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleWorker")
            .field("name", &self.base.name())
            .field("on_demand", &self.on_demand)
            .field("occupied", &self.slot.lock().is_some())
            .finish()
    }
}
