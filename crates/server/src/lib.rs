// Taskbridge HTTP host
//
// Exposes the callback bridge over HTTP: steps are started and inspected
// under /v1/steps, completion events arrive on /v1/events.

pub mod api;
pub mod config;
pub mod state;
pub mod telemetry;

use axum::{routing::get, Json, Router};
use serde::Serialize;

pub use config::ServerConfig;
pub use state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full application router: unprefixed health plus prefixed API
pub fn build_app(state: AppState, api_prefix: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(build_router_with_prefix(api::routes(state), api_prefix))
}

/// Build router with optional API prefix (extracted for testing)
pub fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_routes() -> Router {
        Router::new().route("/v1/test", get(|| async { "ok" }))
    }

    async fn status_of(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_api_prefix_empty() {
        let app = build_router_with_prefix(test_routes(), "");

        assert_eq!(status_of(app, "/v1/test").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_prefix_applied() {
        let app = build_router_with_prefix(test_routes(), "/api");

        assert_eq!(status_of(app.clone(), "/api/v1/test").await, StatusCode::OK);
        assert_eq!(status_of(app, "/v1/test").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let app = Router::new().route("/health", get(health));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
