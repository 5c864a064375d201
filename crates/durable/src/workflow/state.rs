//! Step lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle of one suspending step
///
/// ```text
/// Starting → Running → AwaitingCallback → ResolvedSuccess
///                                       → ResolvedFailure
///                                       → TimedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Job not yet invoked
    Starting,

    /// Job accepted, token not yet persisted
    Running,

    /// Token persisted, step parked until a resume signal arrives
    AwaitingCallback,

    /// Resumed with a success outcome
    ResolvedSuccess,

    /// Resumed with a failure outcome
    ResolvedFailure,

    /// Cancelled by the host's timeout
    TimedOut,
}

impl StepState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResolvedSuccess | Self::ResolvedFailure | Self::TimedOut
        )
    }

    /// Whether a resume signal may be accepted in this state
    ///
    /// `Running` is included: once the token is persisted the resolver can
    /// find it, and that may happen before the step records the suspension.
    pub fn accepts_resume(&self) -> bool {
        matches!(self, Self::Running | Self::AwaitingCallback)
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::AwaitingCallback => write!(f, "awaiting_callback"),
            Self::ResolvedSuccess => write!(f, "resolved_success"),
            Self::ResolvedFailure => write!(f, "resolved_failure"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(StepState::ResolvedSuccess.is_terminal());
        assert!(StepState::ResolvedFailure.is_terminal());
        assert!(StepState::TimedOut.is_terminal());

        assert!(!StepState::Starting.is_terminal());
        assert!(!StepState::Running.is_terminal());
        assert!(!StepState::AwaitingCallback.is_terminal());
    }

    #[test]
    fn test_accepts_resume() {
        assert!(StepState::AwaitingCallback.accepts_resume());
        assert!(StepState::Running.accepts_resume());
        assert!(!StepState::Starting.accepts_resume());
        assert!(!StepState::ResolvedSuccess.accepts_resume());
        assert!(!StepState::TimedOut.accepts_resume());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&StepState::AwaitingCallback).unwrap();
        assert_eq!(json, "\"awaiting_callback\"");
    }
}
