//! The fixed-size, work-stealing service for CPU-bound tasks.
//!
//! An [`AssistedService`] owns a fixed array of [`AssistWorker`]s. Dispatch
//! round-robins across them, skipping any currently occupied running a
//! cyclic task; each worker additionally helps drain its peers' queues
//! whenever its own is empty, which is what gives the pool its
//! work-stealing character under skewed loads (see Scenario A in the
//! top-level docs).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crate::assist_worker::AssistWorker;
use crate::config::AssistedServiceConfig;
use crate::cyclic::CyclicConfig;
use crate::error::{KineticError, Result};
use crate::executable::CyclicHandle;
use crate::handle::Handle;
use crate::listener::RateLimitedListener;
use crate::task::{next_task_id, CyclicTask, EventTask, ResultTask};

/// State shared between the [`AssistedService`] handle and every
/// [`AssistWorker`] it owns (each worker holds a [`Weak`] back-reference
/// to this, never an owning one — the service owns its workers, not the
/// other way around).
pub(crate) struct AssistedServiceShared {
    workers: Vec<Arc<AssistWorker>>,
    round_robin: AtomicUsize,
    idle_timeout: Duration,
    listener: Arc<RateLimitedListener>,
    active: AtomicBool,
    shutting_down: AtomicBool,
}

impl AssistedServiceShared {
    /// Called by an [`AssistWorker`]'s run loop: repeatedly steal from
    /// each worker (in order) until it has no more work, then yield before
    /// advancing to the next. Returns `true` iff any task actually ran.
    pub(crate) fn assist(&self) -> bool {
        let mut ran_any = false;
        for worker in &self.workers {
            while worker.assist_once() {
                ran_any = true;
            }
            thread::yield_now();
        }
        ran_any
    }
}

/// A fixed-size pool of work-stealing worker threads for CPU-bound tasks.
///
/// Cloning an `AssistedService` shares the same underlying pool; any clone
/// may submit, query, or shut it down.
#[derive(Clone)]
pub struct AssistedService {
    shared: Arc<AssistedServiceShared>,
}

impl AssistedService {
    /// Build a service with `config`. Workers are allocated immediately
    /// but their threads are not started until [`activate`](Self::activate).
    pub fn new(config: AssistedServiceConfig) -> Result<Self> {
        config.validate()?;

        let listener = Arc::new(RateLimitedListener::new(
            config.listener.clone(),
            config.exceptions.clone(),
        ));

        let shared = Arc::new_cyclic(|weak: &Weak<AssistedServiceShared>| {
            let workers = (0..config.worker_count)
                .map(|index| {
                    AssistWorker::new(
                        format!("kinetic-assist-{index}"),
                        config.buffer_capacity,
                        config.idle_timeout,
                        config.exceptions.clone(),
                        listener.clone(),
                        weak.clone(),
                    )
                })
                .collect();

            AssistedServiceShared {
                workers,
                round_robin: AtomicUsize::new(0),
                idle_timeout: config.idle_timeout,
                listener,
                active: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
            }
        });

        Ok(Self { shared })
    }

    /// Start every worker's thread. Idempotent: calling this more than
    /// once has no further effect.
    ///
    /// Workers are allocated (in [`new`](Self::new)) before any thread is
    /// started, so a worker beginning its run loop never tries to assist
    /// peers that don't exist yet.
    pub fn activate(&self) {
        if self.shared.active.swap(true, Ordering::SeqCst) {
            return;
        }
        for worker in &self.shared.workers {
            worker.start();
        }
    }

    fn check_active(&self) -> Result<()> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(KineticError::ServiceShuttingDown);
        }
        if !self.shared.active.load(Ordering::SeqCst) {
            return Err(KineticError::ServiceNotActive);
        }
        Ok(())
    }

    /// Select the next worker by a rotating counter, skipping any
    /// currently occupied running a cyclic task. If a full rotation finds
    /// every worker occupied, notifies the listener and sleeps for the
    /// idle interval before retrying.
    fn select_worker(&self) -> Arc<AssistWorker> {
        let worker_count = self.shared.workers.len();
        loop {
            let start = self.shared.round_robin.fetch_add(1, Ordering::Relaxed) % worker_count;
            for offset in 0..worker_count {
                let candidate = &self.shared.workers[(start + offset) % worker_count];
                if !candidate.is_executing_cyclic() {
                    return candidate.clone();
                }
            }
            self.shared.listener.notify("assisted-dispatch");
            thread::sleep(self.shared.idle_timeout);
        }
    }

    /// Submit a side-effecting task with no result.
    pub fn submit_event(&self, task: impl EventTask) -> Result<Handle<()>> {
        self.check_active()?;
        let worker = self.select_worker();
        Ok(worker.assign_event(next_task_id(), task))
    }

    /// Submit a task producing a value of type `R`.
    pub fn submit_result<R>(&self, task: impl ResultTask<R>) -> Result<Handle<R>>
    where
        R: Send + 'static,
    {
        self.check_active()?;
        let worker = self.select_worker();
        Ok(worker.assign_result(next_task_id(), task))
    }

    /// Submit a cyclic task, run repeatedly on whichever worker is
    /// selected for it until it self-terminates, exhausts its declared
    /// cycle count, or [`CyclicHandle::terminate`] is called.
    pub fn submit_cyclic<T>(&self, task: T, config: CyclicConfig) -> Result<CyclicHandle<T>>
    where
        T: CyclicTask,
    {
        self.check_active()?;
        let worker = self.select_worker();
        Ok(worker.assign_cyclic(next_task_id(), task, config))
    }

    /// The fixed number of workers in this pool.
    pub fn current_executor_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// The mean number of items currently queued across all workers.
    pub fn average_queue_length(&self) -> f64 {
        let total: usize = self.shared.workers.iter().map(|w| w.queue_len()).sum();
        total as f64 / self.shared.workers.len() as f64
    }

    /// Request termination of every worker. Non-blocking: workers finish
    /// their current task (or cyclic cycle) before exiting. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for worker in &self.shared.workers {
            worker.request_terminate();
        }
    }

    /// `shutdown()`, then block until every worker thread has actually
    /// exited.
    pub fn shutdown_and_wait(&self) {
        self.shutdown();
        for worker in &self.shared.workers {
            worker.join();
        }
    }

    /// Best-effort forceful shutdown.
    ///
    /// Rust offers no safe way to interrupt a thread mid-body (unlike the
    /// source's `Thread.interrupt()`), so this is equivalent to
    /// [`shutdown_and_wait`](Self::shutdown_and_wait): it requests
    /// termination and waits for every worker to exit on its own. A task
    /// body that never returns will still block this call; design task
    /// bodies to check for cooperative cancellation if that matters.
    pub fn force_shutdown(&self) {
        self.shutdown_and_wait();
    }

    /// Graceful shutdown, escalating to [`force_shutdown`](Self::force_shutdown)
    /// if workers haven't exited within `grace_period`.
    pub fn force_shutdown_after(&self, grace_period: Duration) {
        self.shutdown();
        let deadline = std::time::Instant::now() + grace_period;
        loop {
            let all_terminated = self.shared.workers.iter().all(|w| w.is_terminated());
            if all_terminated || std::time::Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.force_shutdown();
    }
}

impl std::fmt::Debug for AssistedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistedService")
            .field("worker_count", &self.current_executor_count())
            .field("active", &self.shared.active.load(Ordering::SeqCst))
            .finish()
    }
}
