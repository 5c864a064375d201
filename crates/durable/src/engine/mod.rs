//! Step execution engine
//!
//! The engine module provides the [`Orchestrator`], which launches external
//! jobs through a [`JobLauncher`] and parks each step until its completion
//! is signalled back.

mod launcher;
mod orchestrator;

pub use launcher::{HttpJobLauncher, InvokeFailure, JobConfig, JobLauncher};
pub use orchestrator::{
    Orchestrator, OrchestratorError, StepHandle, StepSnapshot, DEFAULT_STEP_RETENTION,
};
