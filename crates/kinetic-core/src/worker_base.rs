//! State shared by every worker thread, assist or scale.
//!
//! Mirrors the `WorkerState` convention from `horizon-lattice-core`'s
//! `worker.rs`: a name for logging, a termination-requested flag the run
//! loop polls cooperatively, and a flag the owning thread sets right before
//! it exits so joiners can tell a dead thread from a merely-idle one.

use std::sync::atomic::{AtomicBool, Ordering};

/// Identity and lifecycle flags common to assist and scale workers.
pub struct WorkerBase {
    name: String,
    terminate_requested: AtomicBool,
    terminated: AtomicBool,
}

impl WorkerBase {
    /// Create worker state under `name`, used in logs and thread naming.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terminate_requested: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        }
    }

    /// This worker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the run loop to exit at its next cooperative check point.
    pub fn request_terminate(&self) {
        self.terminate_requested.store(true, Ordering::SeqCst);
    }

    /// `true` once [`request_terminate`](Self::request_terminate) has been
    /// called.
    pub fn is_terminate_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::SeqCst)
    }

    /// Called by the run loop exactly once, right before it returns.
    pub fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    /// `true` once the run loop has actually exited.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_worker_base_is_not_terminated() {
        let base = WorkerBase::new("w-1");
        assert_eq!(base.name(), "w-1");
        assert!(!base.is_terminate_requested());
        assert!(!base.is_terminated());
    }

    #[test]
    fn test_terminate_lifecycle() {
        let base = WorkerBase::new("w-2");
        base.request_terminate();
        assert!(base.is_terminate_requested());
        assert!(!base.is_terminated());
        base.mark_terminated();
        assert!(base.is_terminated());
    }
}
