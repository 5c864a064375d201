// Step and completion-event HTTP routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskbridge_durable::{JobConfig, OrchestratorError, StepSnapshot, StepState};
use uuid::Uuid;

use crate::state::AppState;

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStepRequest {
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepCreated {
    pub step_id: Uuid,
    pub execution_id: String,
    pub state: StepState,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventAccepted {
    pub status: &'static str,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/steps", post(create_step))
        .route("/v1/steps/:step_id", get(get_step))
        .route("/v1/steps/:step_id/timeout", post(time_out_step))
        .route("/v1/events", post(accept_event))
        .with_state(state)
}

fn error_status(e: &OrchestratorError) -> StatusCode {
    match e {
        OrchestratorError::Invoke(_) => StatusCode::BAD_GATEWAY,
        OrchestratorError::Persist { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::StepNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::NotAwaiting { .. } | OrchestratorError::ResumeInFlight(_) => {
            StatusCode::CONFLICT
        }
        OrchestratorError::Consume(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn step_not_found(step_id: Uuid) -> ApiError {
    ErrorResponse::new(format!("step not found: {}", step_id)).into_response(StatusCode::NOT_FOUND)
}

/// POST /v1/steps - Launch a job and suspend a step on it
pub async fn create_step(
    State(state): State<AppState>,
    Json(req): Json<CreateStepRequest>,
) -> Result<(StatusCode, Json<StepCreated>), ApiError> {
    let handle = state
        .orchestrator
        .start_step(JobConfig::new(req.name, req.input))
        .await
        .map_err(|e| {
            tracing::error!("Failed to start step: {}", e);
            ErrorResponse::new(e.to_string()).into_response(error_status(&e))
        })?;

    let current = state
        .orchestrator
        .step(handle.step_id)
        .map(|s| s.state)
        .unwrap_or(StepState::AwaitingCallback);

    Ok((
        StatusCode::CREATED,
        Json(StepCreated {
            step_id: handle.step_id,
            execution_id: handle.execution_id,
            state: current,
        }),
    ))
}

/// GET /v1/steps/:step_id - Current state and outcome of a step
pub async fn get_step(
    State(state): State<AppState>,
    Path(step_id): Path<Uuid>,
) -> Result<Json<StepSnapshot>, ApiError> {
    state
        .orchestrator
        .step(step_id)
        .map(Json)
        .ok_or_else(|| step_not_found(step_id))
}

/// POST /v1/steps/:step_id/timeout - Cancel a step that is still waiting
pub async fn time_out_step(
    State(state): State<AppState>,
    Path(step_id): Path<Uuid>,
) -> Result<Json<StepSnapshot>, ApiError> {
    state.orchestrator.time_out(step_id).await.map_err(|e| {
        tracing::warn!(%step_id, "Failed to time out step: {}", e);
        ErrorResponse::new(e.to_string()).into_response(error_status(&e))
    })?;

    state
        .orchestrator
        .step(step_id)
        .map(Json)
        .ok_or_else(|| step_not_found(step_id))
}

/// POST /v1/events - Accept a completion event
///
/// Routing runs in the background; the producer gets no result back.
pub async fn accept_event(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<EventAccepted>) {
    state.router.route_value_detached(payload);

    (
        StatusCode::ACCEPTED,
        Json(EventAccepted { status: "accepted" }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::json;
    use taskbridge_durable::{
        BridgeConfig, InMemoryTokenStore, InvokeFailure, JobLauncher, PersistFailure,
        ResumeToken, TokenStore,
    };
    use tower::ServiceExt;

    use super::*;

    struct FixedLauncher(&'static str);

    #[async_trait]
    impl JobLauncher for FixedLauncher {
        async fn invoke(&self, _: &JobConfig) -> Result<String, InvokeFailure> {
            Ok(self.0.to_string())
        }
    }

    struct RejectingLauncher;

    #[async_trait]
    impl JobLauncher for RejectingLauncher {
        async fn invoke(&self, _: &JobConfig) -> Result<String, InvokeFailure> {
            Err(InvokeFailure::Rejected {
                status: 409,
                message: "flow is already running".to_string(),
            })
        }
    }

    fn app_with(launcher: Arc<dyn JobLauncher>) -> (Router, AppState) {
        let state = AppState::new(
            Arc::new(BridgeConfig::default()),
            Arc::new(InMemoryTokenStore::new()),
            launcher,
        );
        (routes(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_create_and_get_step() {
        let (app, _) = app_with(Arc::new(FixedLauncher("exec-123")));

        let (status, created) = send(
            &app,
            "POST",
            "/v1/steps",
            Some(json!({"name": "nightly-sync", "input": {"table": "orders"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["execution_id"], "exec-123");
        assert_eq!(created["state"], "awaiting_callback");
        assert!(created.get("token").is_none());

        let uri = format!("/v1/steps/{}", created["step_id"].as_str().unwrap());
        let (status, snapshot) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["job_name"], "nightly-sync");
        assert_eq!(snapshot["state"], "awaiting_callback");
    }

    #[tokio::test]
    async fn test_create_step_invoke_failure() {
        let (app, _) = app_with(Arc::new(RejectingLauncher));

        let (status, body) = send(&app, "POST", "/v1/steps", Some(json!({"name": "job"}))).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("rejected"));
    }

    #[tokio::test]
    async fn test_create_step_persist_failure() {
        struct FullStore;

        #[async_trait]
        impl TokenStore for FullStore {
            async fn put(&self, _: &str, _: ResumeToken) -> Result<(), PersistFailure> {
                Err(PersistFailure::Database("disk full".to_string()))
            }

            async fn get(
                &self,
                id: &str,
            ) -> Result<taskbridge_durable::TokenRecord, taskbridge_durable::LookupFailure>
            {
                Err(taskbridge_durable::LookupFailure::NotFound(id.to_string()))
            }

            async fn mark_consumed(
                &self,
                id: &str,
            ) -> Result<(), taskbridge_durable::ConsumeError> {
                Err(taskbridge_durable::ConsumeError::NotFound(id.to_string()))
            }
        }

        let state = AppState::new(
            Arc::new(BridgeConfig::default()),
            Arc::new(FullStore),
            Arc::new(FixedLauncher("exec-1")),
        );
        let app = routes(state);

        let (status, _) = send(&app, "POST", "/v1/steps", Some(json!({"name": "job"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_get_unknown_step() {
        let (app, _) = app_with(Arc::new(FixedLauncher("exec-1")));

        let uri = format!("/v1/steps/{}", Uuid::now_v7());
        let (status, body) = send(&app, "GET", &uri, None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().starts_with("step not found"));
    }

    #[tokio::test]
    async fn test_event_resumes_step() {
        let (app, state) = app_with(Arc::new(FixedLauncher("exec-123")));

        let (_, created) = send(&app, "POST", "/v1/steps", Some(json!({"name": "job"}))).await;
        let step_id: Uuid = created["step_id"].as_str().unwrap().parse().unwrap();
        let mut rx = state.orchestrator.subscribe(step_id).unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/v1/events",
            Some(json!({
                "source": "ext.job",
                "detail-type": "JobEndReport",
                "detail": {
                    "status": "Success",
                    "executionId": "exec-123",
                    "output": {"hello": "world"}
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "accepted");

        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.is_terminal()))
            .await
            .unwrap()
            .unwrap();

        let (_, snapshot) = send(&app, "GET", &format!("/v1/steps/{}", step_id), None).await;
        assert_eq!(snapshot["state"], "resolved_success");
        assert_eq!(
            snapshot["outcome"],
            json!({"kind": "success", "value": {"hello": "world"}})
        );
    }

    #[tokio::test]
    async fn test_malformed_event_still_accepted() {
        let (app, _) = app_with(Arc::new(FixedLauncher("exec-1")));

        let (status, _) = send(&app, "POST", "/v1/events", Some(json!({"unexpected": true}))).await;

        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_time_out_step() {
        let (app, _) = app_with(Arc::new(FixedLauncher("exec-1")));
        let (_, created) = send(&app, "POST", "/v1/steps", Some(json!({"name": "job"}))).await;
        let uri = format!(
            "/v1/steps/{}/timeout",
            created["step_id"].as_str().unwrap()
        );

        let (status, snapshot) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["state"], "timed_out");

        let (status, _) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
