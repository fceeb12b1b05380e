//! Resilience layer - classified retries and failure isolation for every
//! fallible remote operation.
//!
//! Agent invocations, tracker calls, and publication all cross process or
//! network boundaries and fail in recoverable ways. This crate wraps any
//! such operation with error classification, exponential backoff, and a
//! circuit breaker, so one flaky upstream cannot cascade into the rest of
//! a run.

#![warn(missing_docs)]

pub mod backoff;
pub mod boundary;
pub mod breaker;
pub mod classify;
pub mod metrics;

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use boundary::with_error_boundary;
pub use breaker::{BreakerState, CircuitBreaker};
pub use classify::{classify, classify_text, ErrorClass};
pub use metrics::{OperationStats, ResilienceMetrics};
