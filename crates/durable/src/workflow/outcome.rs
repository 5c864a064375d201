//! Outcomes carried from a completion event to the suspended step

use serde::{Deserialize, Serialize};

/// Why an external job failed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureReason {
    /// Error name, taken from the completion event's status
    pub error: String,

    /// Human readable cause, when the event carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl FailureReason {
    /// Create a failure reason with no cause
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            cause: None,
        }
    }

    /// Set the cause
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.error, cause),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Result of an external job, tagged by kind
///
/// One resolver handles both kinds; the variant decides which terminal state
/// the step ends up in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// Job succeeded; carries its output payload
    Success(serde_json::Value),

    /// Job failed; carries the failure reason
    Failure(FailureReason),
}

/// Kind of an [`Outcome`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl Outcome {
    /// Get the outcome kind
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Success,
            Self::Failure(_) => OutcomeKind::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_kind() {
        assert_eq!(Outcome::Success(json!({})).kind(), OutcomeKind::Success);
        assert_eq!(
            Outcome::Failure(FailureReason::new("Execution Failed")).kind(),
            OutcomeKind::Failure
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = Outcome::Success(json!({"hello": "world"}));

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value, json!({"kind": "success", "value": {"hello": "world"}}));
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::new("Execution Failed").with_cause("bucket not found");
        assert_eq!(reason.to_string(), "Execution Failed: bucket not found");
        assert_eq!(FailureReason::new("Timeout").to_string(), "Timeout");
    }
}
