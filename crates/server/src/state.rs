// Shared application state and background tasks

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskbridge_durable::{
    BridgeConfig, CallbackResolver, EventRouter, JobLauncher, Orchestrator, TokenStore,
};
use tokio::task::JoinHandle;

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub router: EventRouter,
}

impl AppState {
    /// Wire orchestrator, resolver and router over one token store
    pub fn new(
        config: Arc<BridgeConfig>,
        store: Arc<dyn TokenStore>,
        launcher: Arc<dyn JobLauncher>,
    ) -> Self {
        let orchestrator = Arc::new(
            Orchestrator::new(store.clone(), launcher)
                .with_timeout(config.timeout)
                .with_retention(config.step_retention),
        );
        let resolver =
            CallbackResolver::new(store, orchestrator.clone(), config.lookup_retry.clone());
        let router = EventRouter::new(config, resolver);

        Self {
            orchestrator,
            router,
        }
    }
}

/// How often to sweep the step table, given the shortest deadline it enforces
pub fn sweep_interval(deadline: Duration) -> Duration {
    (deadline / 4).clamp(Duration::from_secs(1), Duration::from_secs(30))
}

/// Sweep interval for an orchestrator's timeout and retention settings
pub fn sweep_interval_for(orchestrator: &Orchestrator) -> Duration {
    let retention = orchestrator.retention();
    let deadline = orchestrator
        .timeout()
        .map_or(retention, |timeout| timeout.min(retention));
    sweep_interval(deadline)
}

/// Periodically time out overdue steps and purge finished ones
pub fn spawn_step_sweep(orchestrator: Arc<Orchestrator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            let expired = orchestrator.expire_overdue(now).await;
            if !expired.is_empty() {
                tracing::info!(count = expired.len(), "timed out overdue steps");
            }
            let purged = orchestrator.purge_expired(now);
            if purged > 0 {
                tracing::debug!(count = purged, "purged finished steps");
            }
        }
    })
}
