//! The task/handle state machine shared by event, result, and cyclic tasks.
//!
//! Every submission produces exactly one [`Handle`]. Its lifecycle is
//! `Pending -> Running -> {Completed, Canceled}`, driven under a dual-lock
//! protocol: an execution lock held for the duration of the task body, and
//! a completion lock guarding the terminal state and its condition
//! variable. The two locks together guarantee a cancel either happens
//! entirely before the body starts, or the body runs to completion with no
//! intervening cancel — waiters never miss the terminal signal.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::task::TaskId;

#[derive(Debug)]
enum HandleState<T> {
    Pending,
    Completed(Option<T>),
    Canceled,
}

impl<T> HandleState<T> {
    fn is_terminal(&self) -> bool {
        !matches!(self, HandleState::Pending)
    }
}

struct Inner<T> {
    id: TaskId,
    exec_lock: Mutex<()>,
    completion: Mutex<HandleState<T>>,
    completion_cv: Condvar,
}

/// A handle to a submitted task.
///
/// Cloning a `Handle` shares the same underlying state; both clones observe
/// the same completion, and either may cancel or await it.
pub struct Handle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("id", &self.inner.id).finish()
    }
}

/// Runs a task body under the handle's dual-lock protocol.
///
/// Constructed by a service alongside the [`Handle`] it returns to the
/// submitter; driven exclusively by the worker thread that owns the task.
pub struct Executor<T> {
    handle: Handle<T>,
}

impl<T: Send + 'static> Executor<T> {
    /// Acquire the execution lock, check for a pre-execution cancel, run
    /// `body` if not canceled, and publish the result under the completion
    /// lock. Returns `true` if the body ran (whether or not it produced a
    /// usable value), `false` if the task had already been canceled.
    pub fn execute<F>(&self, body: F) -> bool
    where
        F: FnOnce() -> Option<T>,
    {
        let _exec_guard = self.handle.inner.exec_lock.lock();

        {
            let state = self.handle.inner.completion.lock();
            if matches!(*state, HandleState::Canceled) {
                return false;
            }
        }

        let result = body();

        let mut state = self.handle.inner.completion.lock();
        *state = HandleState::Completed(result);
        self.handle.inner.completion_cv.notify_all();
        true
    }
}

/// Create a fresh handle/executor pair for a new submission.
pub fn new_pair<T: Send + 'static>(id: TaskId) -> (Handle<T>, Executor<T>) {
    let handle = Handle {
        inner: Arc::new(Inner {
            id,
            exec_lock: Mutex::new(()),
            completion: Mutex::new(HandleState::Pending),
            completion_cv: Condvar::new(),
        }),
    };
    let executor = Executor {
        handle: handle.clone(),
    };
    (handle, executor)
}

impl<T> Handle<T> {
    /// The id assigned to this task at submission time.
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Attempt to cancel the task before it starts running.
    ///
    /// Returns `true` if the task was successfully transitioned to
    /// `Canceled` (its body will never run). Returns `false` if execution
    /// is already in progress, or the task has already reached a terminal
    /// state (canceling a terminal handle is always a no-op).
    pub fn cancel(&self) -> bool {
        let Some(_exec_guard) = self.inner.exec_lock.try_lock() else {
            return false;
        };

        let mut state = self.inner.completion.lock();
        if state.is_terminal() {
            return false;
        }
        *state = HandleState::Canceled;
        self.inner.completion_cv.notify_all();
        true
    }

    /// Block until the task completes or is canceled.
    ///
    /// Returns `true` iff the task completed (its body ran to completion,
    /// with or without a task-level error). Returns `false` iff canceled.
    /// If the handle is already terminal, returns immediately without
    /// blocking.
    pub fn await_completion(&self) -> bool {
        let mut state = self.inner.completion.lock();
        while matches!(*state, HandleState::Pending) {
            self.inner.completion_cv.wait(&mut state);
        }
        matches!(*state, HandleState::Completed(_))
    }

    /// Block until the task completes, is canceled, or `timeout` elapses.
    ///
    /// A `timeout` of zero degenerates to an unbounded wait, matching the
    /// source semantics where a non-positive timeout means "wait forever."
    pub fn await_timeout(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.await_completion();
        }

        let mut state = self.inner.completion.lock();
        let mut remaining = timeout;
        loop {
            if !matches!(*state, HandleState::Pending) {
                return matches!(*state, HandleState::Completed(_));
            }
            let started = std::time::Instant::now();
            let timed_out = self.inner.completion_cv.wait_for(&mut state, remaining).timed_out();
            if timed_out {
                return matches!(*state, HandleState::Completed(_));
            }
            remaining = remaining.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return matches!(*state, HandleState::Completed(_));
            }
        }
    }

    /// `true` if the task has reached a terminal state (completed or
    /// canceled).
    pub fn is_done(&self) -> bool {
        self.inner.completion.lock().is_terminal()
    }

    /// `true` if the task completed successfully (ran to completion).
    pub fn is_completed(&self) -> bool {
        matches!(*self.inner.completion.lock(), HandleState::Completed(_))
    }

    /// `true` if the task was canceled before it ran.
    pub fn is_canceled(&self) -> bool {
        matches!(*self.inner.completion.lock(), HandleState::Canceled)
    }

    /// Await the task, then return its stored value.
    ///
    /// Returns `Some(value)` on completion with a value, `None` on
    /// cancellation, timeout is not applicable here (see
    /// [`get_and_wait_timeout`](Self::get_and_wait_timeout)), or on a task
    /// that errored (its result slot is empty in that case).
    pub fn get_and_wait(&self) -> Option<T> {
        if !self.await_completion() {
            return None;
        }
        self.take_value()
    }

    /// Await the task with a timeout, then return its stored value.
    ///
    /// Returns `None` on cancellation or timeout.
    pub fn get_and_wait_timeout(&self, timeout: Duration) -> Option<T> {
        if !self.await_timeout(timeout) {
            return None;
        }
        self.take_value()
    }

    /// Non-blocking peek at the stored value, if completed.
    ///
    /// Unlike [`get_and_wait`](Self::get_and_wait), this never blocks and
    /// does not consume the value, so it may be called repeatedly (e.g. to
    /// poll a running cyclic task's cycle count). Returns `None` if still
    /// pending, canceled, or the task errored (empty result slot).
    pub fn peek_value(&self) -> Option<T>
    where
        T: Clone,
    {
        match &*self.inner.completion.lock() {
            HandleState::Completed(value) => value.clone(),
            _ => None,
        }
    }

    fn take_value(&self) -> Option<T> {
        let mut state = self.inner.completion.lock();
        match &mut *state {
            HandleState::Completed(value) => value.take(),
            _ => None,
        }
    }
}
