//! Driving a [`CyclicTask`] through a cycle-time budget.
//!
//! A cyclic executable runs its task's `execute` once per cycle, sleeping
//! out whatever budget remains after the body returns. The inter-cycle
//! sleep is a condition-variable wait rather than a raw `thread::sleep`, so
//! `terminate()` can cut it short instead of waiting out the full budget.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::exception::{ExceptionContext, ExceptionHandler, ExceptionSource};
use crate::logging::{span_names, targets, PerfSpan};
use crate::task::{CyclicTask, TaskId};

/// Configuration for a single cyclic executable.
#[derive(Debug, Clone, Copy)]
pub struct CyclicConfig {
    /// Minimum wall-clock time each cycle should take, including the task
    /// body. If the body overruns the budget, the next cycle starts
    /// immediately with no sleep.
    pub cycle_budget: Duration,
    /// Maximum number of cycles to run. `None` means run until canceled or
    /// the task requests self-termination.
    pub max_cycles: Option<u64>,
}

/// Drives one [`CyclicTask`] through its cycle loop.
///
/// Constructed by a worker alongside the task it wraps; `run` blocks the
/// calling thread until the loop ends.
pub struct CyclicExecutable<T: CyclicTask> {
    task_id: TaskId,
    task: Mutex<T>,
    config: CyclicConfig,
    terminate_requested: AtomicBool,
    cycles_run: AtomicU64,
    wait_lock: Mutex<()>,
    wait_cv: Condvar,
}

impl<T: CyclicTask> CyclicExecutable<T> {
    /// Wrap `task` with `config`, identified by `task_id` for logging and
    /// exception routing.
    pub fn new(task_id: TaskId, task: T, config: CyclicConfig) -> Self {
        Self {
            task_id,
            task: Mutex::new(task),
            config,
            terminate_requested: AtomicBool::new(false),
            cycles_run: AtomicU64::new(0),
            wait_lock: Mutex::new(()),
            wait_cv: Condvar::new(),
        }
    }

    /// The number of cycles executed so far. Updated live as the loop
    /// runs, so this may be polled from another thread mid-run (e.g. by a
    /// [`CyclicHandle`](crate::executable::CyclicHandle)) as well as after
    /// completion.
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run.load(Ordering::SeqCst)
    }

    /// Request that the loop stop after its current cycle.
    ///
    /// Notifies the task body (best-effort, via
    /// [`CyclicTask::on_terminate_requested`]) and wakes an in-progress
    /// inter-cycle sleep immediately rather than waiting out the budget.
    ///
    /// The task lock is only held by `run` for the duration of a single
    /// cycle body, never across the whole loop, so this does not block
    /// behind a long-running executable.
    pub fn terminate(&self) {
        self.terminate_requested.store(true, Ordering::SeqCst);
        self.task.lock().on_terminate_requested();
        let _guard = self.wait_lock.lock();
        self.wait_cv.notify_all();
    }

    /// `true` if `terminate()` has been called on this executable.
    pub fn is_terminate_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::SeqCst)
    }

    /// Run the cycle loop to completion.
    ///
    /// Returns the number of cycles actually executed. Errors raised by the
    /// task body are routed to `exceptions` and do not stop the loop; a
    /// cycle that errors still counts towards `max_cycles` and still runs
    /// the inter-cycle sleep.
    pub fn run(&self, exceptions: &dyn ExceptionHandler) -> u64 {
        let _span = PerfSpan::new(targets::CYCLIC, span_names::CYCLIC_RUN);
        let mut cycles_run: u64 = 0;

        loop {
            if self.terminate_requested.load(Ordering::SeqCst) {
                break;
            }
            if let Some(max) = self.config.max_cycles {
                if cycles_run >= max {
                    break;
                }
            }

            let cycle_start = Instant::now();
            let continue_requested = match self.task.lock().execute() {
                Ok(keep_going) => keep_going,
                Err(error) => {
                    exceptions.handle(
                        ExceptionContext {
                            task_id: Some(self.task_id),
                            worker_name: "cyclic",
                            source: ExceptionSource::TaskBody,
                        },
                        error,
                    );
                    true
                }
            };
            cycles_run += 1;
            self.cycles_run.store(cycles_run, Ordering::SeqCst);

            if !continue_requested || self.terminate_requested.load(Ordering::SeqCst) {
                break;
            }
            if let Some(max) = self.config.max_cycles {
                if cycles_run >= max {
                    break;
                }
            }

            let elapsed = cycle_start.elapsed();
            let remaining_budget = self.config.cycle_budget.saturating_sub(elapsed);
            if !remaining_budget.is_zero() {
                self.sleep_cancelable(remaining_budget);
            }
        }

        self.task.lock().on_cleanup();
        cycles_run
    }

    fn sleep_cancelable(&self, duration: Duration) {
        let mut guard = self.wait_lock.lock();
        let mut remaining = duration;
        while !self.terminate_requested.load(Ordering::SeqCst) && !remaining.is_zero() {
            let started = Instant::now();
            let result = self.wait_cv.wait_for(&mut guard, remaining);
            if result.timed_out() {
                return;
            }
            remaining = remaining.saturating_sub(started.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct NoopExceptionHandler;
    impl ExceptionHandler for NoopExceptionHandler {
        fn handle(&self, _ctx: ExceptionContext<'_>, _error: crate::task::BoxError) {}
    }

    struct CountingTask {
        count: Arc<AtomicUsize>,
        max: usize,
    }

    impl CyclicTask for CountingTask {
        fn execute(&mut self) -> Result<bool, crate::task::BoxError> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n < self.max)
        }
    }

    #[test]
    fn test_self_terminating_task_stops_via_return_value() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = CountingTask {
            count: count.clone(),
            max: 3,
        };
        let exec = CyclicExecutable::new(
            crate::task::next_task_id(),
            task,
            CyclicConfig {
                cycle_budget: Duration::from_millis(1),
                max_cycles: None,
            },
        );
        let cycles = exec.run(&NoopExceptionHandler);
        assert_eq!(cycles, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    struct InfiniteTask {
        count: Arc<AtomicUsize>,
    }
    impl CyclicTask for InfiniteTask {
        fn execute(&mut self) -> Result<bool, crate::task::BoxError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[test]
    fn test_max_cycles_bounds_the_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = InfiniteTask {
            count: count.clone(),
        };
        let exec = CyclicExecutable::new(
            crate::task::next_task_id(),
            task,
            CyclicConfig {
                cycle_budget: Duration::from_millis(1),
                max_cycles: Some(5),
            },
        );
        let cycles = exec.run(&NoopExceptionHandler);
        assert_eq!(cycles, 5);
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    struct ErroringTask {
        calls: Arc<AtomicUsize>,
        max: usize,
    }
    impl CyclicTask for ErroringTask {
        fn execute(&mut self) -> Result<bool, crate::task::BoxError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 2 {
                return Err("boom".into());
            }
            Ok(n < self.max)
        }
    }

    #[test]
    fn test_errored_cycle_still_counts_and_continues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task = ErroringTask {
            calls: calls.clone(),
            max: 4,
        };
        let exec = CyclicExecutable::new(
            crate::task::next_task_id(),
            task,
            CyclicConfig {
                cycle_budget: Duration::from_millis(1),
                max_cycles: None,
            },
        );
        let cycles = exec.run(&NoopExceptionHandler);
        assert_eq!(cycles, 4);
    }

    #[test]
    fn test_terminate_cuts_inter_cycle_sleep_short() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = InfiniteTask {
            count: count.clone(),
        };
        let exec = Arc::new(CyclicExecutable::new(
            crate::task::next_task_id(),
            task,
            CyclicConfig {
                cycle_budget: Duration::from_secs(5),
                max_cycles: None,
            },
        ));

        let exec_clone = exec.clone();
        let t = std::thread::spawn(move || exec_clone.run(&NoopExceptionHandler));

        std::thread::sleep(Duration::from_millis(30));
        exec.terminate();

        let start = Instant::now();
        let cycles = t.join().unwrap();
        assert!(cycles >= 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
