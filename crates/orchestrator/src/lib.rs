//! The run controller.
//!
//! Wires the engine to its collaborators: ingest a backlog (tracker label
//! or decomposed directive), schedule tasks into slots, execute each as an
//! independent asynchronous unit, and keep refilling slots from completion
//! events until the run drains.

#![warn(missing_docs)]

mod config;
mod run;

pub use config::RunConfig;
pub use run::{Orchestrator, RunReport, TaskResult};
