//! Step orchestrator: invoke, persist, suspend, resume
//!
//! The orchestrator owns the lifecycle of every suspending step. A step
//! occupies only a table entry while it waits; no task or poll loop is kept
//! alive for it. Steps are addressed by a local step id; the resume token is
//! kept internal and only ever handed to the token store.
//!
//! A token is released from the table as soon as its step finishes. Finished
//! steps stay readable for the retention period and are then dropped by
//! [`Orchestrator::purge_finished_before`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::launcher::{InvokeFailure, JobConfig, JobLauncher};
use crate::persistence::{ConsumeError, PersistFailure, ResumeToken, TokenStore};
use crate::workflow::{Outcome, ResumeError, ResumeSignal, StepState};

/// Errors from orchestrator operations
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The external job could not be started; nothing was suspended
    #[error("failed to invoke job: {0}")]
    Invoke(#[from] InvokeFailure),

    /// The token could not be persisted; the started job is orphaned
    #[error("failed to persist token for execution {execution_id}: {source}")]
    Persist {
        execution_id: String,
        #[source]
        source: PersistFailure,
    },

    /// Step not found
    #[error("step not found: {0}")]
    StepNotFound(Uuid),

    /// The step is not waiting for a callback
    #[error("step {step_id} is not awaiting a callback (state: {state})")]
    NotAwaiting { step_id: Uuid, state: StepState },

    /// A resolver consumed the token first; its resume is on the way
    #[error("step {0} is already being resumed")]
    ResumeInFlight(Uuid),

    /// The token store failed while consuming the token
    #[error("failed to consume token: {0}")]
    Consume(ConsumeError),
}

/// Returned from [`Orchestrator::start_step`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepHandle {
    pub step_id: Uuid,
    pub execution_id: String,
}

/// Point-in-time view of a step
#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    pub step_id: Uuid,
    pub job_name: String,
    pub execution_id: Option<String>,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

struct StepEntry {
    token: ResumeToken,
    job_name: String,
    execution_id: Option<String>,
    outcome: Option<Outcome>,
    started_at: DateTime<Utc>,
    awaiting_since: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    state: watch::Sender<StepState>,
}

impl StepEntry {
    fn current(&self) -> StepState {
        *self.state.borrow()
    }

    fn transition(&self, next: StepState) {
        self.state.send_replace(next);
    }

    fn snapshot(&self, step_id: Uuid) -> StepSnapshot {
        StepSnapshot {
            step_id,
            job_name: self.job_name.clone(),
            execution_id: self.execution_id.clone(),
            state: self.current(),
            outcome: self.outcome.clone(),
            started_at: self.started_at,
            awaiting_since: self.awaiting_since,
            finished_at: self.finished_at,
        }
    }
}

#[derive(Default)]
struct StepTable {
    steps: HashMap<Uuid, StepEntry>,
    tokens: HashMap<ResumeToken, Uuid>,
}

impl StepTable {
    fn remove(&mut self, step_id: Uuid) {
        if let Some(entry) = self.steps.remove(&step_id) {
            self.tokens.remove(&entry.token);
        }
    }
}

/// How long finished steps stay readable by default
pub const DEFAULT_STEP_RETENTION: Duration = Duration::from_secs(3600);

/// Drives suspending steps through their lifecycle
///
/// # Example
///
/// ```ignore
/// let orchestrator = Arc::new(Orchestrator::new(store.clone(), launcher));
/// let handle = orchestrator.start_step(JobConfig::new("sync", json!({}))).await?;
///
/// // Later, the resolver calls `resume` through the ResumeSignal trait
/// let mut rx = orchestrator.subscribe(handle.step_id).unwrap();
/// rx.wait_for(|s| s.is_terminal()).await?;
/// ```
pub struct Orchestrator {
    store: Arc<dyn TokenStore>,
    launcher: Arc<dyn JobLauncher>,
    timeout: Option<Duration>,
    retention: Duration,
    table: RwLock<StepTable>,
}

impl Orchestrator {
    /// Create an orchestrator with no step timeout
    pub fn new(store: Arc<dyn TokenStore>, launcher: Arc<dyn JobLauncher>) -> Self {
        Self {
            store,
            launcher,
            timeout: None,
            retention: DEFAULT_STEP_RETENTION,
            table: RwLock::new(StepTable::default()),
        }
    }

    /// Set the deadline applied by [`Orchestrator::expire_overdue`]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long finished steps are kept before a purge drops them
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Configured step timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Configured retention for finished steps
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Launch a job and suspend a step until its completion arrives
    ///
    /// Returns once the token is persisted and the step is awaiting its
    /// callback. Invocation and persist failures are returned here and leave
    /// no step behind.
    #[instrument(skip(self, job), fields(job = %job.name))]
    pub async fn start_step(&self, job: JobConfig) -> Result<StepHandle, OrchestratorError> {
        let step_id = Uuid::now_v7();
        let token = ResumeToken::generate();

        {
            let (state, _) = watch::channel(StepState::Starting);
            let mut table = self.table.write();
            table.steps.insert(
                step_id,
                StepEntry {
                    token: token.clone(),
                    job_name: job.name.clone(),
                    execution_id: None,
                    outcome: None,
                    started_at: Utc::now(),
                    awaiting_since: None,
                    finished_at: None,
                    state,
                },
            );
            table.tokens.insert(token.clone(), step_id);
        }

        let execution_id = match self.launcher.invoke(&job).await {
            Ok(id) => id,
            Err(e) => {
                warn!(%step_id, error = %e, "job invocation failed");
                self.table.write().remove(step_id);
                return Err(OrchestratorError::Invoke(e));
            }
        };

        if let Some(entry) = self.table.write().steps.get_mut(&step_id) {
            entry.execution_id = Some(execution_id.clone());
            entry.transition(StepState::Running);
        }
        debug!(%step_id, %execution_id, "job running");

        if let Err(source) = self.store.put(&execution_id, token).await {
            error!(
                %step_id,
                %execution_id,
                error = %source,
                "failed to persist token, job is orphaned"
            );
            self.table.write().remove(step_id);
            return Err(OrchestratorError::Persist {
                execution_id,
                source,
            });
        }

        if let Some(entry) = self.table.write().steps.get_mut(&step_id) {
            // A fast completion may already have resumed the step
            if entry.current() == StepState::Running {
                entry.awaiting_since = Some(Utc::now());
                entry.transition(StepState::AwaitingCallback);
            }
        }

        info!(%step_id, %execution_id, "step suspended awaiting callback");
        Ok(StepHandle {
            step_id,
            execution_id,
        })
    }

    /// Get a snapshot of a step
    pub fn step(&self, step_id: Uuid) -> Option<StepSnapshot> {
        self.table
            .read()
            .steps
            .get(&step_id)
            .map(|entry| entry.snapshot(step_id))
    }

    /// Watch a step's state changes
    pub fn subscribe(&self, step_id: Uuid) -> Option<watch::Receiver<StepState>> {
        self.table
            .read()
            .steps
            .get(&step_id)
            .map(|entry| entry.state.subscribe())
    }

    /// Cancel an awaiting step
    ///
    /// The token is consumed first so a late completion event cannot resume
    /// the step afterwards. If a resolver already consumed it, the step is
    /// left alone and [`OrchestratorError::ResumeInFlight`] is returned.
    #[instrument(skip(self))]
    pub async fn time_out(&self, step_id: Uuid) -> Result<(), OrchestratorError> {
        let execution_id = {
            let table = self.table.read();
            let entry = table
                .steps
                .get(&step_id)
                .ok_or(OrchestratorError::StepNotFound(step_id))?;

            let state = entry.current();
            match (&entry.execution_id, state) {
                (Some(id), StepState::AwaitingCallback) => id.clone(),
                _ => return Err(OrchestratorError::NotAwaiting { step_id, state }),
            }
        };

        match self.store.mark_consumed(&execution_id).await {
            Ok(()) => {}
            Err(ConsumeError::Duplicate(_)) => {
                return Err(OrchestratorError::ResumeInFlight(step_id));
            }
            Err(e) => return Err(OrchestratorError::Consume(e)),
        }

        let mut table = self.table.write();
        let entry = table
            .steps
            .get_mut(&step_id)
            .ok_or(OrchestratorError::StepNotFound(step_id))?;

        let state = entry.current();
        if !state.accepts_resume() {
            return Err(OrchestratorError::NotAwaiting { step_id, state });
        }

        entry.finished_at = Some(Utc::now());
        entry.transition(StepState::TimedOut);
        let token = entry.token.clone();
        table.tokens.remove(&token);

        info!(%step_id, %execution_id, "step timed out");
        Ok(())
    }

    /// Time out every awaiting step whose deadline has passed
    ///
    /// Does nothing when no timeout is configured. Returns the ids of the
    /// steps that were timed out.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let Some(timeout) = self
            .timeout
            .and_then(|t| chrono::Duration::from_std(t).ok())
        else {
            return Vec::new();
        };

        let overdue: Vec<Uuid> = self
            .table
            .read()
            .steps
            .iter()
            .filter(|(_, entry)| entry.current() == StepState::AwaitingCallback)
            .filter(|(_, entry)| {
                entry
                    .awaiting_since
                    .is_some_and(|since| since + timeout <= now)
            })
            .map(|(id, _)| *id)
            .collect();

        let mut expired = Vec::with_capacity(overdue.len());
        for step_id in overdue {
            match self.time_out(step_id).await {
                Ok(()) => expired.push(step_id),
                Err(e) => debug!(%step_id, error = %e, "overdue step not timed out"),
            }
        }
        expired
    }

    /// Drop finished steps that completed before `cutoff`
    ///
    /// Steps that are still starting, running or awaiting are never dropped.
    /// Returns how many steps were removed.
    pub fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut table = self.table.write();
        let before = table.steps.len();
        table.steps.retain(|_, entry| {
            !(entry.current().is_terminal() && entry.finished_at.is_some_and(|at| at < cutoff))
        });
        let purged = before - table.steps.len();
        if purged > 0 {
            debug!(purged, "purged finished steps");
        }
        purged
    }

    /// Drop finished steps older than the configured retention
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
            .map_or(0, |cutoff| self.purge_finished_before(cutoff))
    }
}

#[async_trait]
impl ResumeSignal for Orchestrator {
    #[instrument(skip_all, fields(kind = %outcome.kind()))]
    async fn resume(&self, token: &ResumeToken, outcome: Outcome) -> Result<(), ResumeError> {
        let mut table = self.table.write();
        let step_id = *table.tokens.get(token).ok_or(ResumeError::UnknownToken)?;
        let entry = table
            .steps
            .get_mut(&step_id)
            .ok_or(ResumeError::UnknownToken)?;

        if !entry.current().accepts_resume() {
            warn!(%step_id, state = %entry.current(), "resume for a finished step");
            return Err(ResumeError::AlreadyResumed(step_id));
        }

        let next = match &outcome {
            Outcome::Success(_) => StepState::ResolvedSuccess,
            Outcome::Failure(_) => StepState::ResolvedFailure,
        };
        entry.outcome = Some(outcome);
        entry.finished_at = Some(Utc::now());
        entry.transition(next);
        // The store's consumed flag rejects any later delivery for this token
        table.tokens.remove(token);

        info!(%step_id, state = %next, "step resumed");
        Ok(())
    }
}
