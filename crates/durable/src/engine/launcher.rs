//! Job invocation interface

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::callback::FieldPath;

/// What to launch on the external job system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    /// Job or flow name
    pub name: String,

    /// Job input, passed through untouched
    #[serde(default)]
    pub input: Value,
}

impl JobConfig {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

/// The external job could not be started
#[derive(Debug, thiserror::Error)]
pub enum InvokeFailure {
    /// The job system refused the request
    #[error("job system rejected the invocation ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never got a usable response
    #[error("job system unreachable: {0}")]
    Transport(String),

    /// The job started but its execution id could not be read
    #[error("invocation response has no execution id at {0}")]
    MissingExecutionId(String),
}

/// Starts external jobs
///
/// `invoke` returns as soon as the job system has accepted the job; the job
/// itself runs out of band and reports back through a completion event.
#[async_trait]
pub trait JobLauncher: Send + Sync + 'static {
    /// Start a job and return its execution id
    async fn invoke(&self, job: &JobConfig) -> Result<String, InvokeFailure>;
}

/// Launches jobs with an HTTP POST
///
/// The request body is the serialized [`JobConfig`]. The execution id is read
/// from the JSON response with a configured path (default `$.ExecutionId`).
#[derive(Debug, Clone)]
pub struct HttpJobLauncher {
    client: Client,
    url: String,
    execution_id_path: FieldPath,
}

impl HttpJobLauncher {
    pub const DEFAULT_EXECUTION_ID_PATH: &'static str = "ExecutionId";

    /// Create a launcher that posts to `url`
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
            execution_id_path: FieldPath::builtin(Self::DEFAULT_EXECUTION_ID_PATH),
        }
    }

    /// Use a custom HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Read the execution id from a different response field
    pub fn with_execution_id_path(mut self, path: FieldPath) -> Self {
        self.execution_id_path = path;
        self
    }
}

#[async_trait]
impl JobLauncher for HttpJobLauncher {
    #[instrument(skip(self, job), fields(job = %job.name))]
    async fn invoke(&self, job: &JobConfig) -> Result<String, InvokeFailure> {
        let response = self
            .client
            .post(&self.url)
            .json(job)
            .send()
            .await
            .map_err(|e| InvokeFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InvokeFailure::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = match status {
            StatusCode::NO_CONTENT => Value::Null,
            _ => response
                .json()
                .await
                .map_err(|e| InvokeFailure::Transport(e.to_string()))?,
        };

        let execution_id = self
            .execution_id_path
            .resolve_str(&body)
            .ok_or_else(|| InvokeFailure::MissingExecutionId(self.execution_id_path.to_string()))?;

        debug!(%execution_id, "job accepted");
        Ok(execution_id.to_string())
    }
}
