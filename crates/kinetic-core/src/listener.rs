//! The service listener contract and its rate-limiting wrapper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::exception::{panic_message, ExceptionContext, ExceptionHandler, ExceptionSource};

/// Notified when a service's fast dispatch paths are exhausted and the
/// submitter is about to (or already did) block.
///
/// Called at most once per [`frequency`](Self::frequency) — the rate
/// limiting is applied by [`RateLimitedListener`], not by implementors.
pub trait ServiceListener: Send + Sync {
    /// Capacity has been reached; the caller is about to block.
    fn on_capacity_reached(&self);

    /// The minimum interval between successive `on_capacity_reached`
    /// calls.
    fn frequency(&self) -> Duration;
}

/// A [`ServiceListener`] that never fires and reports an effectively
/// infinite frequency. The default for services that don't configure one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl ServiceListener for NullListener {
    fn on_capacity_reached(&self) {}

    fn frequency(&self) -> Duration {
        Duration::MAX
    }
}

/// Rate-limits calls into an inner [`ServiceListener`].
///
/// Under lock, compares the current time to the last-call time and only
/// invokes the inner listener if at least `frequency()` has elapsed.
/// Errors raised by the inner listener are routed to `exceptions` rather
/// than propagating.
pub struct RateLimitedListener {
    inner: Arc<dyn ServiceListener>,
    exceptions: Arc<dyn ExceptionHandler>,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimitedListener {
    /// Wrap `inner`, routing any panic-turned-error through `exceptions`.
    pub fn new(inner: Arc<dyn ServiceListener>, exceptions: Arc<dyn ExceptionHandler>) -> Self {
        Self {
            inner,
            exceptions,
            last_call: Mutex::new(None),
        }
    }

    /// Notify the listener that capacity was reached, subject to the rate
    /// limit. Returns `true` if the inner listener was actually invoked.
    /// `worker_name` identifies the caller for exception-routing context
    /// only; the rate limit itself is shared across every caller.
    pub fn notify(&self, worker_name: &str) -> bool {
        let frequency = self.inner.frequency();
        let now = Instant::now();

        {
            let mut last_call = self.last_call.lock();
            let should_call = match *last_call {
                None => true,
                Some(prev) => now.duration_since(prev) >= frequency,
            };
            if !should_call {
                return false;
            }
            *last_call = Some(now);
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.inner.on_capacity_reached();
        }));

        if let Err(payload) = result {
            let message = panic_message(&payload);
            self.exceptions.handle(
                ExceptionContext {
                    task_id: None,
                    worker_name,
                    source: ExceptionSource::Listener,
                },
                message.into(),
            );
        }

        true
    }
}
