//! Service configuration.
//!
//! Mirrors `ThreadPoolConfig`'s `Default` + builder convention from
//! `threadpool.rs`: a plain struct with sane defaults, assembled with
//! `with_*` methods rather than a separate builder type.

use std::sync::Arc;
use std::time::Duration;

use crate::exception::{ExceptionHandler, TracingExceptionHandler};
use crate::listener::{NullListener, ServiceListener};

/// Configuration for an [`AssistedService`](crate::assisted_service::AssistedService).
#[derive(Clone)]
pub struct AssistedServiceConfig {
    /// Number of fixed Assist Workers. Must be at least 1.
    pub worker_count: usize,
    /// Capacity of each worker's local deque. Must be at least 1.
    pub buffer_capacity: usize,
    /// How long an idle worker waits before re-checking for peer work.
    pub idle_timeout: Duration,
    /// Where escaped task/worker-loop errors are routed.
    pub exceptions: Arc<dyn ExceptionHandler>,
    /// Notified when a worker's buffer is full or a dispatch rotation is
    /// fully saturated.
    pub listener: Arc<dyn ServiceListener>,
}

impl Default for AssistedServiceConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            buffer_capacity: 256,
            idle_timeout: Duration::from_secs(60),
            exceptions: Arc::new(TracingExceptionHandler),
            listener: Arc::new(NullListener),
        }
    }
}

impl AssistedServiceConfig {
    /// Set the fixed worker count.
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set each worker's local deque capacity.
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    /// Set the idle re-check interval.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the exception handler.
    pub fn with_exceptions(mut self, exceptions: Arc<dyn ExceptionHandler>) -> Self {
        self.exceptions = exceptions;
        self
    }

    /// Set the capacity-reached listener.
    pub fn with_listener(mut self, listener: Arc<dyn ServiceListener>) -> Self {
        self.listener = listener;
        self
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.worker_count == 0 {
            return Err(crate::error::KineticError::InvalidConfig(
                "worker_count must be at least 1",
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(crate::error::KineticError::InvalidConfig(
                "buffer_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Configuration for a [`ScalableService`](crate::scalable_service::ScalableService).
#[derive(Clone)]
pub struct ScalableServiceConfig {
    /// Minimum number of workers kept alive at all times.
    pub min: usize,
    /// Maximum number of workers the pool may ever hold.
    pub max: usize,
    /// How long an on-demand worker idles before removing itself.
    pub on_demand_timeout: Duration,
    /// Where escaped task/worker-loop errors are routed.
    pub exceptions: Arc<dyn ExceptionHandler>,
    /// Notified when dispatch must block because the pool is at `max`.
    pub listener: Arc<dyn ServiceListener>,
}

impl Default for ScalableServiceConfig {
    fn default() -> Self {
        Self {
            min: 4,
            max: 64,
            on_demand_timeout: Duration::from_secs(60),
            exceptions: Arc::new(TracingExceptionHandler),
            listener: Arc::new(NullListener),
        }
    }
}

impl ScalableServiceConfig {
    /// Set the minimum pool size.
    pub fn with_min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    /// Set the maximum pool size.
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Set the on-demand worker idle timeout.
    pub fn with_on_demand_timeout(mut self, on_demand_timeout: Duration) -> Self {
        self.on_demand_timeout = on_demand_timeout;
        self
    }

    /// Set the exception handler.
    pub fn with_exceptions(mut self, exceptions: Arc<dyn ExceptionHandler>) -> Self {
        self.exceptions = exceptions;
        self
    }

    /// Set the capacity-reached listener.
    pub fn with_listener(mut self, listener: Arc<dyn ServiceListener>) -> Self {
        self.listener = listener;
        self
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.max == 0 {
            return Err(crate::error::KineticError::InvalidConfig(
                "max must be at least 1",
            ));
        }
        if self.min > self.max {
            return Err(crate::error::KineticError::InvalidConfig(
                "min must not exceed max",
            ));
        }
        Ok(())
    }
}
