// Taskbridge server
// Decision: DATABASE_URL selects the Postgres token store; without it tokens live in memory
// Decision: the step sweep always runs; it times out overdue steps only when BRIDGE_TIMEOUT_SECS is set
// Decision: the step table lives in memory even with the Postgres store; a completion that arrives
// after a restart consumes its token and is logged as orphaned for the host to reconcile

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use taskbridge_durable::{
    BridgeConfig, HttpJobLauncher, InMemoryTokenStore, PostgresTokenStore, TokenStore,
};
use taskbridge_server::state::{spawn_step_sweep, sweep_interval_for};
use taskbridge_server::telemetry::{init_telemetry, TelemetryConfig};
use taskbridge_server::{build_app, AppState, ServerConfig};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "taskbridge" {
        telemetry_config.service_name = "taskbridge-server".to_string();
    }
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    init_telemetry(telemetry_config);

    tracing::info!("taskbridge-server starting...");

    let server_config = ServerConfig::from_env().context("Invalid server configuration")?;
    let bridge_config = BridgeConfig::from_env().context("Invalid bridge configuration")?;
    tracing::info!(
        job_source = %bridge_config.job_source,
        completion_type = %bridge_config.completion_type,
        execution_id_path = %bridge_config.execution_id_path,
        lookup_attempts = bridge_config.lookup_retry.max_attempts,
        "Bridge configured"
    );

    let store: Arc<dyn TokenStore> = match &server_config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to database")?;
            let store = PostgresTokenStore::new(pool).with_strictness(bridge_config.put_strictness);
            store.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Using PostgreSQL token store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, tokens are kept in memory only");
            Arc::new(InMemoryTokenStore::with_strictness(
                bridge_config.put_strictness,
            ))
        }
    };

    let launch_url = server_config
        .job_launch_url
        .clone()
        .context("JOB_LAUNCH_URL environment variable required")?;
    let mut launcher = HttpJobLauncher::new(launch_url);
    if let Some(path) = server_config.job_execution_id_path.clone() {
        launcher = launcher.with_execution_id_path(path);
    }

    let state = AppState::new(Arc::new(bridge_config), store, Arc::new(launcher));

    let every = sweep_interval_for(&state.orchestrator);
    tracing::info!(
        timeout_secs = state.orchestrator.timeout().map(|t| t.as_secs()),
        retention_secs = state.orchestrator.retention().as_secs(),
        sweep_secs = every.as_secs(),
        "Step sweep enabled"
    );
    spawn_step_sweep(state.orchestrator.clone(), every);

    if !server_config.api_prefix.is_empty() {
        tracing::info!(prefix = %server_config.api_prefix, "API prefix configured");
    }

    let app = build_app(state, &server_config.api_prefix).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&server_config.http_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", server_config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("Server error")?;

    Ok(())
}
