//! Callback resolver: completion outcome → resume signal

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::persistence::{
    ConsumeError, DuplicateResume, LookupFailure, TokenRecord, TokenStore,
};
use crate::reliability::RetryPolicy;
use crate::workflow::{Outcome, ResumeError, ResumeSignal};

/// Errors from resolving a completion
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No token record showed up within the retry window
    #[error("token lookup failed after {attempts} attempts: {source}")]
    Lookup {
        attempts: u32,
        #[source]
        source: LookupFailure,
    },

    /// Another delivery already consumed the token
    #[error(transparent)]
    Duplicate(#[from] DuplicateResume),

    /// Consuming the token failed for a reason other than a duplicate
    #[error("failed to consume token: {0}")]
    Consume(ConsumeError),

    /// The orchestrator refused the resume signal
    #[error("resume signal rejected: {0}")]
    Resume(#[from] ResumeError),
}

impl ResolveError {
    /// Whether this is a duplicate delivery rather than a real fault
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    /// Whether the token was consumed but no live step holds it
    ///
    /// Happens when the step table was lost, e.g. after a restart with a
    /// durable token store.
    pub fn is_orphaned(&self) -> bool {
        matches!(self, Self::Resume(ResumeError::UnknownToken))
    }
}

/// Turns a classified completion into a resume signal
///
/// A single resolver handles both outcome kinds. The sequence is always:
/// look the token up (retrying while the write may still be in flight),
/// consume it atomically, then signal the orchestrator. Losing the consume
/// race means another delivery already resumed the step, so nothing is
/// signalled.
#[derive(Clone)]
pub struct CallbackResolver {
    store: Arc<dyn TokenStore>,
    signal: Arc<dyn ResumeSignal>,
    retry: RetryPolicy,
}

impl CallbackResolver {
    /// Create a resolver over the given store and resume target
    pub fn new(
        store: Arc<dyn TokenStore>,
        signal: Arc<dyn ResumeSignal>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            signal,
            retry,
        }
    }

    /// Resolve the completion of `execution_id` with `outcome`
    #[instrument(skip(self, outcome), fields(kind = %outcome.kind()))]
    pub async fn resolve(&self, execution_id: &str, outcome: Outcome) -> Result<(), ResolveError> {
        let record = self.lookup(execution_id).await?;

        self.store
            .mark_consumed(execution_id)
            .await
            .map_err(|e| match e {
                ConsumeError::Duplicate(dup) => ResolveError::Duplicate(dup),
                other => ResolveError::Consume(other),
            })?;

        let kind = outcome.kind();
        self.signal.resume(&record.token, outcome).await?;

        info!(%execution_id, %kind, "resumed suspended step");
        Ok(())
    }

    async fn lookup(&self, execution_id: &str) -> Result<TokenRecord, ResolveError> {
        let mut attempt = 1;
        loop {
            match self.store.get(execution_id).await {
                Ok(record) => return Ok(record),
                Err(e) if self.retry.has_attempts_remaining(attempt) => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(
                        %execution_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "token not found yet, retrying lookup"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(ResolveError::Lookup {
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }
}
