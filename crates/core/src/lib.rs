//! Armada core data models.
//!
//! This crate defines the fundamental data structures shared by the
//! orchestration engine: tasks, domains, run identity, and the error
//! taxonomy every other crate builds on.

#![warn(missing_docs)]

// Core identities
mod id;

// Task execution
mod task;
mod domain;

// Error taxonomy
mod error;

// Re-exports
pub use id::RunId;

pub use task::{Complexity, Task, TaskStatus};

pub use domain::Domain;

pub use error::{OrchestrateError, Result};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
