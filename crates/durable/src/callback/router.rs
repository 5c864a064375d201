//! Event router: classify completion events and dispatch them

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::event::CompletionEvent;
use super::resolver::{CallbackResolver, ResolveError};
use crate::config::BridgeConfig;
use crate::workflow::{FailureReason, Outcome, OutcomeKind};

/// An event that could not be correlated with a suspended step
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedEvent {
    /// The payload did not have the `{source, detail-type, detail}` shape
    #[error("event has an invalid shape: {0}")]
    InvalidShape(String),

    /// Source or type did not match the configured job system
    #[error("event from {event_source:?} with type {detail_type:?} matches no completion pattern")]
    Unmatched {
        event_source: String,
        detail_type: String,
    },

    /// No string status at the configured path
    #[error("completion event has no status at {0}")]
    MissingStatus(String),

    /// No non-empty execution id at the configured path
    #[error("completion event has no execution id at {0}")]
    MissingExecutionId(String),
}

/// A completion event reduced to its correlation id and outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    pub execution_id: String,
    pub outcome: Outcome,
}

/// What happened to one routed event
#[derive(Debug)]
pub enum RouteOutcome {
    /// The suspended step was resumed
    Resumed {
        execution_id: String,
        kind: OutcomeKind,
    },

    /// The event was dropped before reaching the resolver
    Dropped(MalformedEvent),

    /// The resolver could not resume the step
    Unresolved {
        execution_id: String,
        kind: OutcomeKind,
        error: ResolveError,
    },
}

impl RouteOutcome {
    /// Whether the event resumed a step
    pub fn is_resumed(&self) -> bool {
        matches!(self, Self::Resumed { .. })
    }
}

/// Routes completion events to the callback resolver
///
/// The success and failure predicates share the source and type check and
/// differ only in the status comparison, so every well-formed completion
/// lands in exactly one of them.
#[derive(Clone)]
pub struct EventRouter {
    config: Arc<BridgeConfig>,
    resolver: CallbackResolver,
}

impl EventRouter {
    pub fn new(config: Arc<BridgeConfig>, resolver: CallbackResolver) -> Self {
        Self { config, resolver }
    }

    /// Classify an event as a success or failure completion
    pub fn classify(&self, event: &CompletionEvent) -> Result<ClassifiedEvent, MalformedEvent> {
        let config = &self.config;

        if event.source != config.job_source || event.detail_type != config.completion_type {
            return Err(MalformedEvent::Unmatched {
                event_source: event.source.clone(),
                detail_type: event.detail_type.clone(),
            });
        }

        let status = event
            .field(&config.status_path)
            .and_then(Value::as_str)
            .ok_or_else(|| MalformedEvent::MissingStatus(config.status_path.to_string()))?;

        let execution_id = event
            .str_field(&config.execution_id_path)
            .ok_or_else(|| {
                MalformedEvent::MissingExecutionId(config.execution_id_path.to_string())
            })?
            .to_string();

        let outcome = if status == config.success_status {
            let output = event
                .field(&config.output_path)
                .unwrap_or(&event.detail)
                .clone();
            Outcome::Success(output)
        } else {
            let mut reason = FailureReason::new(status);
            if let Some(cause) = event.str_field(&config.failure_cause_path) {
                reason = reason.with_cause(cause);
            }
            Outcome::Failure(reason)
        };

        Ok(ClassifiedEvent {
            execution_id,
            outcome,
        })
    }

    /// Route one event and wait for the resolver's result
    ///
    /// Every failure is logged here; the result is returned for diagnostics
    /// only and the router never retries.
    pub async fn route(&self, event: CompletionEvent) -> RouteOutcome {
        let classified = match self.classify(&event) {
            Ok(classified) => classified,
            Err(e) => {
                warn!(
                    source = %event.source,
                    detail_type = %event.detail_type,
                    error = %e,
                    "dropping malformed completion event"
                );
                return RouteOutcome::Dropped(e);
            }
        };

        let ClassifiedEvent {
            execution_id,
            outcome,
        } = classified;
        let kind = outcome.kind();
        debug!(%execution_id, %kind, "dispatching completion event");

        match self.resolver.resolve(&execution_id, outcome).await {
            Ok(()) => RouteOutcome::Resumed { execution_id, kind },
            Err(error) => {
                if error.is_duplicate() {
                    info!(%execution_id, %kind, "duplicate completion delivery ignored");
                } else if error.is_orphaned() {
                    error!(
                        %execution_id,
                        %kind,
                        "token consumed but no step holds it; step state was lost, job outcome needs reconciling"
                    );
                } else {
                    warn!(%execution_id, %kind, error = %error, "completion event left unresolved");
                }
                RouteOutcome::Unresolved {
                    execution_id,
                    kind,
                    error,
                }
            }
        }
    }

    /// Route a raw JSON payload
    pub async fn route_value(&self, payload: Value) -> RouteOutcome {
        match serde_json::from_value::<CompletionEvent>(payload) {
            Ok(event) => self.route(event).await,
            Err(e) => {
                let malformed = MalformedEvent::InvalidShape(e.to_string());
                warn!(error = %malformed, "dropping malformed completion event");
                RouteOutcome::Dropped(malformed)
            }
        }
    }

    /// Route an event on a background task and return immediately
    pub fn route_detached(&self, event: CompletionEvent) -> JoinHandle<RouteOutcome> {
        let router = self.clone();
        tokio::spawn(async move { router.route(event).await })
    }

    /// Route a raw JSON payload on a background task and return immediately
    pub fn route_value_detached(&self, payload: Value) -> JoinHandle<RouteOutcome> {
        let router = self.clone();
        tokio::spawn(async move { router.route_value(payload).await })
    }
}
