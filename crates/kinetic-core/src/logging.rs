//! Tracing integration for Kinetic.
//!
//! Kinetic instruments its hot paths with the `tracing` crate rather than
//! printing directly. To see anything, install a subscriber in the host
//! application:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```

/// Span names used throughout Kinetic for tracing.
///
/// These constants can be used to filter traces for specific subsystems.
pub mod span_names {
    /// Assisted-service dispatch span.
    pub const ASSISTED_DISPATCH: &str = "kinetic::assisted_dispatch";
    /// Scalable-service dispatch span.
    pub const SCALABLE_DISPATCH: &str = "kinetic::scalable_dispatch";
    /// Cyclic executable run span.
    pub const CYCLIC_RUN: &str = "kinetic::cyclic_run";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Task/handle state machine target.
    pub const HANDLE: &str = "kinetic_core::handle";
    /// Assist worker target.
    pub const ASSIST_WORKER: &str = "kinetic_core::assist_worker";
    /// Assisted service target.
    pub const ASSISTED_SERVICE: &str = "kinetic_core::assisted_service";
    /// Scale worker target.
    pub const SCALE_WORKER: &str = "kinetic_core::scale_worker";
    /// Scalable service target.
    pub const SCALABLE_SERVICE: &str = "kinetic_core::scalable_service";
    /// Cyclic executable target.
    pub const CYCLIC: &str = "kinetic_core::cyclic";
}

/// A guard that emits a tracing span for the duration of its lifetime.
///
/// Useful for tracking how long a dispatch or a cycle body took without
/// threading a `Instant::now()` through every call site.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span, entering it immediately.
    pub fn new(target: &'static str, name: &'static str) -> Self {
        let span = tracing::trace_span!(target: "kinetic::perf", "perf", target, operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span_compiles_and_drops() {
        let _span = PerfSpan::new(targets::ASSIST_WORKER, "drain_local_deque");
    }
}
