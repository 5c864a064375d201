//! Resume signal interface between resolver and orchestrator

use async_trait::async_trait;
use uuid::Uuid;

use super::Outcome;
use crate::persistence::ResumeToken;

/// Errors from delivering a resume signal
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResumeError {
    /// No suspended step holds this token
    #[error("resume token is unknown to the orchestrator")]
    UnknownToken,

    /// The step already reached a terminal state
    #[error("step {0} was already resumed")]
    AlreadyResumed(Uuid),
}

/// Receiver of resume signals
///
/// The resolver only ever talks to the orchestrator through this trait, with
/// the token as the sole correlation handle.
#[async_trait]
pub trait ResumeSignal: Send + Sync + 'static {
    /// Revive the step suspended under `token` with `outcome`
    async fn resume(&self, token: &ResumeToken, outcome: Outcome) -> Result<(), ResumeError>;
}
