//! # Durable Callback Bridge
//!
//! Lets a step launch a long-running external job, suspend without holding
//! any compute while the job runs, and resume exactly once when the job's
//! completion event arrives on an at-least-once, unordered event channel.
//!
//! ## Features
//!
//! - **Consume-once tokens**: an atomic compare-and-set in the token store is the single point that guarantees at-most-once resume
//! - **Structural event routing**: completion events are matched on source, type and status, then correlated by execution id
//! - **Lookup race handling**: bounded retry with backoff for events that outrun the token write
//! - **Pluggable storage**: in-memory and PostgreSQL token stores
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  invoke   ┌──────────────┐   completion event   ┌─────────────┐
//! │ Orchestrator │──────────▶│ external job │─────────────────────▶│ EventRouter │
//! └──────────────┘           └──────────────┘                      └─────────────┘
//!     │     ▲                                                             │
//!     │ put │ resume(token, outcome)                                     ▼
//!     │     └─────────────────────────────────────────────────  CallbackResolver
//!     ▼                                                          get / mark_consumed
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                      TokenStore (execution id → token)                        │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use taskbridge_durable::prelude::*;
//!
//! let config = Arc::new(BridgeConfig::from_env()?);
//! let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
//! let launcher = Arc::new(HttpJobLauncher::new("http://jobs.internal/start"));
//!
//! let orchestrator = Arc::new(Orchestrator::new(store.clone(), launcher));
//! let resolver = CallbackResolver::new(store, orchestrator.clone(), config.lookup_retry.clone());
//! let router = EventRouter::new(config, resolver);
//!
//! let handle = orchestrator.start_step(JobConfig::new("nightly-sync", json!({}))).await?;
//! // ... completion events are fed to `router.route_detached(event)`
//! ```

pub mod callback;
pub mod config;
pub mod engine;
pub mod persistence;
pub mod reliability;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::callback::{
        CallbackResolver, CompletionEvent, EventRouter, FieldPath, MalformedEvent, ResolveError,
        RouteOutcome,
    };
    pub use crate::config::BridgeConfig;
    pub use crate::engine::{
        HttpJobLauncher, InvokeFailure, JobConfig, JobLauncher, Orchestrator, OrchestratorError,
        StepHandle, StepSnapshot,
    };
    pub use crate::persistence::{
        InMemoryTokenStore, PostgresTokenStore, PutStrictness, ResumeToken, TokenStore,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::workflow::{FailureReason, Outcome, ResumeError, ResumeSignal, StepState};
}

// Re-export key types at crate root
pub use callback::{
    CallbackResolver, ClassifiedEvent, CompletionEvent, EventRouter, FieldPath, MalformedEvent,
    PathError, ResolveError, RouteOutcome,
};
pub use config::{BridgeConfig, ConfigError};
pub use engine::{
    HttpJobLauncher, InvokeFailure, JobConfig, JobLauncher, Orchestrator, OrchestratorError,
    StepHandle, StepSnapshot, DEFAULT_STEP_RETENTION,
};
pub use persistence::{
    ConsumeError, DuplicateResume, InMemoryTokenStore, LookupFailure, PersistFailure,
    PostgresTokenStore, PutStrictness, ResumeToken, TokenRecord, TokenStore,
};
pub use reliability::RetryPolicy;
pub use workflow::{FailureReason, Outcome, OutcomeKind, ResumeError, ResumeSignal, StepState};
