//! Step abstractions and types
//!
//! This module contains the suspend/resume primitives:
//! - [`StepState`] for the step lifecycle
//! - [`Outcome`] for what a completion event carries back
//! - [`ResumeSignal`] for reviving a suspended step

mod outcome;
mod signal;
mod state;

pub use outcome::{FailureReason, Outcome, OutcomeKind};
pub use signal::{ResumeError, ResumeSignal};
pub use state::StepState;
