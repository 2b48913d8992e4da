//! Core task execution engine for Kinetic.
//!
//! This crate provides three in-process dispatch disciplines sharing a
//! common task/handle state machine:
//!
//! - **Assisted**: a fixed-size pool of work-stealing worker threads,
//!   suited to CPU-bound workloads of roughly uniform cost.
//! - **Scalable**: an elastic pool that grows on demand up to a maximum
//!   and shrinks idle on-demand workers back down, suited to bursty
//!   I/O-bound workloads.
//! - **Cyclic**: a rate-regulated executable that repeats a task body on a
//!   cycle-time budget, run by either pool's workers.
//!
//! # Getting Started
//!
//! ```
//! use kinetic_core::{AssistedService, AssistedServiceConfig};
//!
//! let service = AssistedService::new(AssistedServiceConfig::default())?;
//! service.activate();
//!
//! let handle = service.submit_result(|| Ok::<i32, kinetic_core::BoxError>(1 + 1))?;
//! assert_eq!(handle.get_and_wait(), Some(2));
//!
//! service.shutdown_and_wait();
//! # Ok::<(), kinetic_core::KineticError>(())
//! ```
//!
//! # Cyclic Tasks
//!
//! ```
//! use kinetic_core::{AssistedService, AssistedServiceConfig, CyclicConfig, CyclicTask, BoxError};
//! use std::time::Duration;
//!
//! struct Heartbeat { count: u32 }
//! impl CyclicTask for Heartbeat {
//!     fn execute(&mut self) -> Result<bool, BoxError> {
//!         self.count += 1;
//!         Ok(self.count < 5) // self-terminate after 5 cycles
//!     }
//! }
//!
//! let service = AssistedService::new(AssistedServiceConfig::default())?;
//! service.activate();
//!
//! let handle = service.submit_cyclic(
//!     Heartbeat { count: 0 },
//!     CyclicConfig { cycle_budget: Duration::from_millis(10), max_cycles: None },
//! )?;
//! assert!(handle.await_completion());
//! assert_eq!(handle.cycles_run(), 5);
//!
//! service.shutdown_and_wait();
//! # Ok::<(), kinetic_core::KineticError>(())
//! ```

#![warn(missing_docs)]

mod assist_worker;
mod assisted_service;
mod config;
mod cyclic;
mod deque;
mod error;
mod exception;
mod executable;
mod handle;
mod listener;
pub mod logging;
mod scalable_service;
mod scale_worker;
mod task;
mod worker_base;

pub use assisted_service::AssistedService;
pub use config::{AssistedServiceConfig, ScalableServiceConfig};
pub use cyclic::CyclicConfig;
pub use error::{KineticError, Result};
pub use exception::{ExceptionContext, ExceptionHandler, ExceptionSource, TracingExceptionHandler};
pub use executable::CyclicHandle;
pub use handle::Handle;
pub use listener::{NullListener, RateLimitedListener, ServiceListener};
pub use scalable_service::ScalableService;
pub use task::{BoxError, CyclicTask, EventTask, ResultTask, TaskId};
