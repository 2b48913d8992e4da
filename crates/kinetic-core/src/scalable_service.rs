//! The elastic, on-demand service for bursty I/O-bound workloads.
//!
//! A [`ScalableService`] keeps `min` workers alive permanently and creates
//! up to `max` total on demand as load requires, recycling each into an
//! `availables` queue when it finishes a task and removing on-demand
//! workers that sit idle past their timeout. Unlike [`AssistedService`](crate::assisted_service::AssistedService),
//! it does not support cyclic tasks — see [`KineticError::CyclicNotSupported`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::ScalableServiceConfig;
use crate::cyclic::CyclicConfig;
use crate::error::{KineticError, Result};
use crate::exception::ExceptionHandler;
use crate::executable::CyclicHandle;
use crate::handle::Handle;
use crate::listener::RateLimitedListener;
use crate::scale_worker::ScaleWorker;
use crate::task::{next_task_id, CyclicTask, EventTask, ResultTask};

/// How long `acquire_worker` waits on `availables` between poll attempts
/// once the pool is already at `max` and every worker is busy.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State shared between the [`ScalableService`] handle and every
/// [`ScaleWorker`] it owns.
///
/// `executors` holds every worker currently in the pool; `availables`
/// holds the subset that is idle and eligible for dispatch. Both are
/// realized as bounded FIFOs rather than a set, since dispatch always
/// wants the least-recently-idle worker and removal needs to preserve
/// order for the ones left behind.
pub(crate) struct ScalableServiceShared {
    self_ref: Weak<ScalableServiceShared>,
    executors: Mutex<VecDeque<Arc<ScaleWorker>>>,
    availables: Mutex<VecDeque<Arc<ScaleWorker>>>,
    availables_cv: Condvar,
    min: usize,
    max: usize,
    on_demand_timeout: Duration,
    on_demand_index: AtomicUsize,
    exceptions: Arc<dyn ExceptionHandler>,
    listener: Arc<RateLimitedListener>,
    active: AtomicBool,
    shutting_down: AtomicBool,
}

impl ScalableServiceShared {
    /// Called by a [`ScaleWorker`] after finishing a task: re-insert it at
    /// the tail of `availables`. If the pool is already over capacity
    /// (an over-capacity race against a shrinking `max` or a concurrent
    /// removal), the worker is surplus and requested to terminate instead.
    pub(crate) fn recycle(&self, worker: Arc<ScaleWorker>) {
        let mut availables = self.availables.lock();
        if availables.len() < self.max {
            availables.push_back(worker);
            drop(availables);
            self.availables_cv.notify_one();
        } else {
            drop(availables);
            worker.request_terminate();
        }
    }

    /// Called by an on-demand [`ScaleWorker`] on its own idle-timeout
    /// self-check. Removes `worker` from both `availables` and
    /// `executors`, returning `true` only if it was found idle in
    /// `availables` — if a dispatcher has meanwhile popped it to assign a
    /// task, it is no longer in `availables` and must not be removed out
    /// from under that in-flight assignment.
    pub(crate) fn remove(&self, worker: &Arc<ScaleWorker>) -> bool {
        let mut availables = self.availables.lock();
        let Some(pos) = availables.iter().position(|w| Arc::ptr_eq(w, worker)) else {
            return false;
        };
        availables.remove(pos);
        drop(availables);

        let mut executors = self.executors.lock();
        if let Some(pos) = executors.iter().position(|w| Arc::ptr_eq(w, worker)) {
            executors.remove(pos);
            true
        } else {
            false
        }
    }

    /// Acquire a worker for dispatch: pop an idle one if available,
    /// otherwise create one on demand if under `max`, otherwise notify the
    /// listener and block until one frees up.
    fn acquire_worker(&self) -> Arc<ScaleWorker> {
        loop {
            if let Some(worker) = self.availables.lock().pop_front() {
                return worker;
            }

            {
                let mut executors = self.executors.lock();
                if executors.len() < self.max {
                    let index = self.on_demand_index.fetch_add(1, Ordering::Relaxed);
                    let worker = ScaleWorker::new(
                        format!("kinetic-scale-ondemand-{index}"),
                        true,
                        Some(self.on_demand_timeout),
                        self.exceptions.clone(),
                        self.self_ref.clone(),
                    );
                    executors.push_back(worker.clone());
                    drop(executors);
                    worker.start();
                    return worker;
                }
            }

            self.listener.notify("scalable-dispatch");
            let mut availables = self.availables.lock();
            if let Some(worker) = availables.pop_front() {
                return worker;
            }
            self.availables_cv.wait_for(&mut availables, ACQUIRE_POLL_INTERVAL);
        }
    }
}

/// An elastic pool of workers, growing on demand up to a maximum and
/// shrinking on-demand workers back down after they idle out.
///
/// Cloning a `ScalableService` shares the same underlying pool.
#[derive(Clone)]
pub struct ScalableService {
    shared: Arc<ScalableServiceShared>,
}

impl ScalableService {
    /// Build a service with `config`. The `min` baseline workers are
    /// allocated immediately but not started until [`activate`](Self::activate).
    pub fn new(config: ScalableServiceConfig) -> Result<Self> {
        config.validate()?;

        let listener = Arc::new(RateLimitedListener::new(
            config.listener.clone(),
            config.exceptions.clone(),
        ));

        let shared = Arc::new_cyclic(|weak: &Weak<ScalableServiceShared>| ScalableServiceShared {
            self_ref: weak.clone(),
            executors: Mutex::new(VecDeque::new()),
            availables: Mutex::new(VecDeque::new()),
            availables_cv: Condvar::new(),
            min: config.min,
            max: config.max,
            on_demand_timeout: config.on_demand_timeout,
            on_demand_index: AtomicUsize::new(0),
            exceptions: config.exceptions.clone(),
            listener,
            active: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        });

        Ok(Self { shared })
    }

    /// Create the `min` baseline workers and start every worker's thread.
    /// Idempotent.
    pub fn activate(&self) {
        if self.shared.active.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut executors = self.shared.executors.lock();
        let mut availables = self.shared.availables.lock();
        for index in 0..self.shared.min {
            let worker = ScaleWorker::new(
                format!("kinetic-scale-{index}"),
                false,
                None,
                self.shared.exceptions.clone(),
                self.shared.self_ref.clone(),
            );
            executors.push_back(worker.clone());
            availables.push_back(worker);
        }
        drop(availables);

        for worker in executors.iter() {
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

    /// Submit a side-effecting task with no result.
    pub fn submit_event(&self, task: impl EventTask) -> Result<Handle<()>> {
        self.check_active()?;
        let worker = self.shared.acquire_worker();
        worker.assign_event(next_task_id(), task)
    }

    /// Submit a task producing a value of type `R`.
    pub fn submit_result<R>(&self, task: impl ResultTask<R>) -> Result<Handle<R>>
    where
        R: Send + 'static,
    {
        self.check_active()?;
        let worker = self.shared.acquire_worker();
        worker.assign_result(next_task_id(), task)
    }

    /// Cyclic tasks are not supported by this discipline; always returns
    /// [`KineticError::CyclicNotSupported`]. Use
    /// [`AssistedService::submit_cyclic`](crate::assisted_service::AssistedService::submit_cyclic)
    /// instead.
    pub fn submit_cyclic<T>(&self, _task: T, _config: CyclicConfig) -> Result<CyclicHandle<T>>
    where
        T: CyclicTask,
    {
        Err(KineticError::CyclicNotSupported)
    }

    /// The current total number of workers in the pool (baseline plus any
    /// on-demand workers currently alive).
    pub fn current_executor_count(&self) -> usize {
        self.shared.executors.lock().len()
    }

    /// The current number of idle, dispatch-eligible workers.
    pub fn available_count(&self) -> usize {
        self.shared.availables.lock().len()
    }

    /// Request termination of every worker currently in the pool.
    /// Non-blocking: each worker finishes its current task before exiting.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for worker in self.shared.executors.lock().iter() {
            worker.request_terminate();
        }
    }

    /// `shutdown()`, then block until every worker thread has actually
    /// exited.
    pub fn shutdown_and_wait(&self) {
        self.shutdown();
        let workers: Vec<_> = self.shared.executors.lock().iter().cloned().collect();
        for worker in workers {
            worker.join();
        }
    }

    /// Best-effort forceful shutdown, equivalent to
    /// [`shutdown_and_wait`](Self::shutdown_and_wait) — Rust has no safe
    /// way to interrupt a thread mid-body.
    pub fn force_shutdown(&self) {
        self.shutdown_and_wait();
    }

    /// Graceful shutdown, escalating to [`force_shutdown`](Self::force_shutdown)
    /// if workers haven't exited within `grace_period`.
    pub fn force_shutdown_after(&self, grace_period: Duration) {
        self.shutdown();
        let deadline = std::time::Instant::now() + grace_period;
        loop {
            let all_terminated = self
                .shared
                .executors
                .lock()
                .iter()
                .all(|w| w.is_terminated());
            if all_terminated || std::time::Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.force_shutdown();
    }
}

impl std::fmt::Debug for ScalableService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalableService")
            .field("executor_count", &self.current_executor_count())
            .field("available_count", &self.available_count())
            .field("min", &self.shared.min)
            .field("max", &self.shared.max)
            .field("active", &self.shared.active.load(Ordering::SeqCst))
            .finish()
    }
}
