//! A dedicated worker thread with a local work-stealing deque.
//!
//! Each assist worker owns a [`BoundedDeque`] it pushes/pops from the head;
//! peer workers may only steal from the tail. The run loop drains its own
//! queue, then helps peers via the owning [`AssistedService`]'s global
//! assist, then idles with a periodic wakeup so it retries peer assistance
//! even without being explicitly signalled (the spec's "eager idle").

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cyclic::CyclicConfig;
use crate::deque::BoundedDeque;
use crate::exception::{panic_message, ExceptionContext, ExceptionHandler, ExceptionSource};
use crate::executable::{self, CyclicHandle};
use crate::handle::Handle;
use crate::listener::RateLimitedListener;
use crate::logging::{span_names, targets, PerfSpan};
use crate::task::{CyclicTask, EventTask, ResultTask, TaskId};
use crate::worker_base::WorkerBase;

use crate::assisted_service::AssistedServiceShared;
use crate::executable::CyclicRunner;

/// A worker thread belonging to an [`AssistedService`](crate::assisted_service::AssistedService).
pub struct AssistWorker {
    base: WorkerBase,
    deque: BoundedDeque<executable::Executable>,
    idle_lock: Mutex<()>,
    idle_cv: Condvar,
    idle_timeout: Duration,
    exceptions: Arc<dyn ExceptionHandler>,
    listener: Arc<RateLimitedListener>,
    service: Weak<AssistedServiceShared>,
    current_cyclic: Mutex<Option<Arc<dyn CyclicRunner>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AssistWorker {
    pub(crate) fn new(
        name: String,
        buffer_capacity: usize,
        idle_timeout: Duration,
        exceptions: Arc<dyn ExceptionHandler>,
        listener: Arc<RateLimitedListener>,
        service: Weak<AssistedServiceShared>,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: WorkerBase::new(name),
            deque: BoundedDeque::new(buffer_capacity),
            idle_lock: Mutex::new(()),
            idle_cv: Condvar::new(),
            idle_timeout,
            exceptions,
            listener,
            service,
            current_cyclic: Mutex::new(None),
            thread: Mutex::new(None),
        })
    }

    /// This worker's thread name.
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// Number of items currently queued locally (own head plus anything
    /// not yet stolen from the tail).
    pub fn queue_len(&self) -> usize {
        self.deque.len()
    }

    /// `true` while this worker is running a cyclic task — such a worker
    /// is unavailable for new event/result dispatch in the round-robin
    /// rotation.
    pub fn is_executing_cyclic(&self) -> bool {
        self.current_cyclic.lock().is_some()
    }

    /// Start the worker's thread. Called once by the owning service during
    /// the second phase of activation (after every worker has been
    /// allocated, so a starting worker never assists peers that don't
    /// exist yet).
    pub(crate) fn start(self: &Arc<Self>) {
        let worker = self.clone();
        let name = self.base.name().to_string();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run_loop())
            .expect("failed to spawn assist worker thread");
        *self.thread.lock() = Some(handle);
    }

    /// Ask the run loop to exit at its next cooperative check point. If a
    /// cyclic task is currently running, also requests its termination so
    /// an in-progress inter-cycle sleep doesn't block shutdown.
    pub(crate) fn request_terminate(&self) {
        self.base.request_terminate();
        if let Some(cyclic) = self.current_cyclic.lock().as_ref() {
            cyclic.terminate();
        }
        let _guard = self.idle_lock.lock();
        self.idle_cv.notify_all();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.base.is_terminated()
    }

    /// Join the worker's OS thread, if it was started and not already
    /// joined. Blocks until the thread actually exits.
    pub(crate) fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Submit an event task, wrapping it and assigning it per the
    /// non-blocking-then-blocking backpressure protocol.
    pub(crate) fn assign_event(self: &Arc<Self>, task_id: TaskId, task: impl EventTask) -> Handle<()> {
        let (handle, item) = executable::event_item(task_id, task);
        self.assign(item);
        handle
    }

    /// Submit a result task.
    pub(crate) fn assign_result<R>(self: &Arc<Self>, task_id: TaskId, task: impl ResultTask<R>) -> Handle<R>
    where
        R: Send + 'static,
    {
        let (handle, item) = executable::result_item(task_id, task);
        self.assign(item);
        handle
    }

    /// Submit a cyclic task.
    pub(crate) fn assign_cyclic<T>(
        self: &Arc<Self>,
        task_id: TaskId,
        task: T,
        config: CyclicConfig,
    ) -> CyclicHandle<T>
    where
        T: CyclicTask,
    {
        let (cyclic_handle, item) = executable::cyclic_item(task_id, task, config);
        self.assign(item);
        cyclic_handle
    }

    fn assign(&self, item: executable::Executable) {
        if let Some(item) = self.deque.push_front_try(item) {
            self.listener.notify(self.base.name());
            self.deque.push_front_blocking_forever(item);
        }
        let _guard = self.idle_lock.lock();
        self.idle_cv.notify_all();
    }

    /// Called by the owning service's global assist: steal one item from
    /// this worker's tail and run it. Returns `true` iff a task ran.
    pub(crate) fn assist_once(&self) -> bool {
        let Some(item) = self.deque.pop_back_try() else {
            return false;
        };
        self.run_item(item);
        true
    }

    fn run_item(&self, item: executable::Executable) {
        let _span = PerfSpan::new(targets::ASSIST_WORKER, span_names::ASSISTED_DISPATCH);
        if item.is_cyclic() {
            let runner = item.cyclic_runner();
            *self.current_cyclic.lock() = runner;
            self.run_guarded(item);
            *self.current_cyclic.lock() = None;
        } else {
            self.run_guarded(item);
        }
    }

    /// Run `item`, catching a task-body panic that escaped the trait's
    /// `Result` contract so it routes to the exception handler instead of
    /// unwinding this worker's thread out from under the pool. A returned
    /// `Err` never reaches here — it's already handled inside `item.run`.
    fn run_guarded(&self, item: executable::Executable) {
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

    fn run_loop(&self) {
        loop {
            if self.base.is_terminate_requested() {
                break;
            }

            // 1. Drain the local deque from the head.
            while let Some(item) = self.deque.pop_front() {
                self.run_item(item);
                if self.base.is_terminate_requested() {
                    break;
                }
            }

            if self.base.is_terminate_requested() {
                break;
            }

            // 2. Help peers until none has work.
            if let Some(service) = self.service.upgrade() {
                service.assist();
            }

            // 3. Idle, waking early if our own deque gained work.
            let mut guard = self.idle_lock.lock();
            if self.base.is_terminate_requested() {
                break;
            }
            if !self.deque.is_empty() {
                continue;
            }
            self.idle_cv.wait_for(&mut guard, self.idle_timeout);
        }

        self.base.mark_terminated();
    }
}

impl std::fmt::Debug for AssistWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistWorker")
            .field("name", &self.base.name())
            .field("queue_len", &self.queue_len())
            .field("executing_cyclic", &self.is_executing_cyclic())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::TracingExceptionHandler;
    use crate::listener::NullListener;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn test_worker() -> Arc<AssistWorker> {
        let listener = Arc::new(RateLimitedListener::new(
            Arc::new(NullListener),
            Arc::new(TracingExceptionHandler),
        ));
        let worker = AssistWorker::new(
            "test-assist".to_string(),
            8,
            Duration::from_millis(20),
            Arc::new(TracingExceptionHandler),
            listener,
            Weak::new(),
        );
        worker.start();
        worker
    }

    #[test]
    fn test_event_task_runs_on_worker_thread() {
        let worker = test_worker();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        let handle = worker.assign_event(crate::task::next_task_id(), move || {
            ran_clone.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        });
        assert!(handle.await_completion());
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
        worker.request_terminate();
        worker.join();
    }

    #[test]
    fn test_result_task_produces_value() {
        let worker = test_worker();
        let handle = worker.assign_result(crate::task::next_task_id(), || Ok::<i32, crate::task::BoxError>(99));
        assert_eq!(handle.get_and_wait(), Some(99));
        worker.request_terminate();
        worker.join();
    }

    #[test]
    fn test_panicking_task_is_routed_and_worker_survives() {
        use crate::exception::ExceptionSource;
        use parking_lot::Mutex as PMutex;

        struct CapturingHandler(Arc<PMutex<Vec<ExceptionSource>>>);
        impl ExceptionHandler for CapturingHandler {
            fn handle(&self, ctx: crate::exception::ExceptionContext<'_>, _error: crate::task::BoxError) {
                self.0.lock().push(ctx.source);
            }
        }

        let captured = Arc::new(PMutex::new(Vec::new()));
        let listener = Arc::new(RateLimitedListener::new(
            Arc::new(NullListener),
            Arc::new(TracingExceptionHandler),
        ));
        let worker = AssistWorker::new(
            "test-assist-panic".to_string(),
            8,
            Duration::from_millis(20),
            Arc::new(CapturingHandler(captured.clone())),
            listener,
            Weak::new(),
        );
        worker.start();

        let _handle = worker.assign_event(crate::task::next_task_id(), || -> Result<(), crate::task::BoxError> {
            panic!("task body blew up")
        });

        // follow it with an ordinary task: the worker thread must still be
        // alive and servicing its deque after the panic was caught.
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        let handle = worker.assign_event(crate::task::next_task_id(), move || {
            ran_clone.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        });
        assert!(handle.await_completion());
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while captured.lock().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(captured.lock().len(), 1);
        assert!(matches!(captured.lock()[0], ExceptionSource::WorkerLoop));

        worker.request_terminate();
        worker.join();
    }

    #[test]
    fn test_assist_once_steals_from_tail() {
        let worker = test_worker();
        worker.request_terminate();
        worker.join();

        // drive directly without the run loop racing for items
        let (handle, item) = executable::event_item(crate::task::next_task_id(), || Ok(()));
        worker.deque.push_front_try(item);
        assert!(worker.assist_once());
        assert!(handle.await_completion());
        assert!(!worker.assist_once());
    }

    #[test]
    fn test_cyclic_occupancy_flag_during_run() {
        let worker = test_worker();
        struct SlowTask(Arc<std::sync::Barrier>);
        impl CyclicTask for SlowTask {
            fn execute(&mut self) -> Result<bool, crate::task::BoxError> {
                self.0.wait();
                Ok(false)
            }
        }

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let cyclic_handle = worker.assign_cyclic(
            crate::task::next_task_id(),
            SlowTask(barrier.clone()),
            CyclicConfig {
                cycle_budget: Duration::from_millis(1),
                max_cycles: None,
            },
        );

        // give the worker a moment to pick it up before we synchronize
        let start = std::time::Instant::now();
        while !worker.is_executing_cyclic() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(worker.is_executing_cyclic());

        barrier.wait();
        assert!(cyclic_handle.await_completion());
        assert!(!worker.is_executing_cyclic());

        worker.request_terminate();
        worker.join();
    }
}
