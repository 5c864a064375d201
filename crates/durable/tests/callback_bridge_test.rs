//! End-to-end tests: orchestrator, token store, router and resolver wired
//! together over the in-memory store.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use taskbridge_durable::persistence::{
    ConsumeError, InMemoryTokenStore, LookupFailure, PersistFailure, ResumeToken, TokenRecord,
    TokenStore,
};
use taskbridge_durable::{
    BridgeConfig, CallbackResolver, CompletionEvent, EventRouter, FailureReason, FieldPath,
    InvokeFailure, JobConfig, JobLauncher, Orchestrator, Outcome, OutcomeKind, ResolveError,
    RetryPolicy, RouteOutcome, StepState,
};

/// Returns pre-arranged execution ids in order
struct ScriptedLauncher {
    ids: Mutex<VecDeque<String>>,
}

impl ScriptedLauncher {
    fn new(ids: &[&str]) -> Self {
        Self {
            ids: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl JobLauncher for ScriptedLauncher {
    async fn invoke(&self, _: &JobConfig) -> Result<String, InvokeFailure> {
        self.ids
            .lock()
            .pop_front()
            .ok_or_else(|| InvokeFailure::Transport("no more jobs".into()))
    }
}

/// Delays every put, so completion events can overtake the token write
struct SlowStore {
    inner: InMemoryTokenStore,
    put_delay: Duration,
}

#[async_trait]
impl TokenStore for SlowStore {
    async fn put(&self, execution_id: &str, token: ResumeToken) -> Result<(), PersistFailure> {
        tokio::time::sleep(self.put_delay).await;
        self.inner.put(execution_id, token).await
    }

    async fn get(&self, execution_id: &str) -> Result<TokenRecord, LookupFailure> {
        self.inner.get(execution_id).await
    }

    async fn mark_consumed(&self, execution_id: &str) -> Result<(), ConsumeError> {
        self.inner.mark_consumed(execution_id).await
    }
}

struct Bridge {
    orchestrator: Arc<Orchestrator>,
    router: EventRouter,
}

fn bridge(store: Arc<dyn TokenStore>, ids: &[&str], config: BridgeConfig) -> Bridge {
    let config = Arc::new(config);
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        Arc::new(ScriptedLauncher::new(ids)),
    ));
    let resolver = CallbackResolver::new(store, orchestrator.clone(), config.lookup_retry.clone());
    Bridge {
        orchestrator,
        router: EventRouter::new(config, resolver),
    }
}

fn completion(detail: Value) -> CompletionEvent {
    CompletionEvent::new("ext.job", "JobEndReport", detail)
}

fn job() -> JobConfig {
    JobConfig::new("nightly-sync", json!({"table": "orders"}))
}

#[tokio::test]
async fn test_success_resumes_exactly_once() {
    let store = Arc::new(InMemoryTokenStore::new());
    let bridge = bridge(store.clone(), &["exec-123"], BridgeConfig::default());

    let handle = bridge.orchestrator.start_step(job()).await.unwrap();
    assert_eq!(handle.execution_id, "exec-123");
    assert_eq!(
        bridge.orchestrator.step(handle.step_id).unwrap().state,
        StepState::AwaitingCallback
    );

    let event = completion(json!({
        "status": "Success",
        "executionId": "exec-123",
        "output": {"hello": "world"}
    }));

    let first = bridge.router.route(event.clone()).await;
    assert!(first.is_resumed());

    let duplicate = bridge.router.route(event).await;
    assert!(matches!(
        duplicate,
        RouteOutcome::Unresolved { error: ResolveError::Duplicate(_), .. }
    ));

    let snapshot = bridge.orchestrator.step(handle.step_id).unwrap();
    assert_eq!(snapshot.state, StepState::ResolvedSuccess);
    assert_eq!(
        snapshot.outcome,
        Some(Outcome::Success(json!({"hello": "world"})))
    );
    assert!(store.get("exec-123").await.unwrap().consumed);
}

#[tokio::test]
async fn test_failure_resumes_with_reason() {
    let store = Arc::new(InMemoryTokenStore::new());
    let bridge = bridge(store, &["exec-7"], BridgeConfig::default());
    let handle = bridge.orchestrator.start_step(job()).await.unwrap();

    let event = completion(json!({
        "status": "Execution Failed",
        "executionId": "exec-7",
        "error": "destination bucket not found"
    }));
    bridge.router.route(event.clone()).await;
    bridge.router.route(event).await;

    let snapshot = bridge.orchestrator.step(handle.step_id).unwrap();
    assert_eq!(snapshot.state, StepState::ResolvedFailure);
    assert_eq!(
        snapshot.outcome,
        Some(Outcome::Failure(
            FailureReason::new("Execution Failed").with_cause("destination bucket not found")
        ))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_resume_once() {
    let store = Arc::new(InMemoryTokenStore::new());
    let bridge = bridge(store, &["exec-dup"], BridgeConfig::default());
    let handle = bridge.orchestrator.start_step(job()).await.unwrap();

    let success = completion(json!({"status": "Success", "executionId": "exec-dup"}));
    let failure = completion(json!({"status": "Aborted", "executionId": "exec-dup"}));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let event = if i % 2 == 0 { success.clone() } else { failure.clone() };
            bridge.router.route_detached(event)
        })
        .collect();

    let mut resumed = 0;
    for handle in handles {
        if handle.await.unwrap().is_resumed() {
            resumed += 1;
        }
    }
    assert_eq!(resumed, 1);

    let state = bridge.orchestrator.step(handle.step_id).unwrap().state;
    assert!(matches!(
        state,
        StepState::ResolvedSuccess | StepState::ResolvedFailure
    ));
}

#[tokio::test(start_paused = true)]
async fn test_event_before_token_write_is_resolved() {
    let store = Arc::new(SlowStore {
        inner: InMemoryTokenStore::new(),
        put_delay: Duration::from_millis(250),
    });
    let config = BridgeConfig::default()
        .with_lookup_retry(RetryPolicy::fixed(Duration::from_millis(100), 10));
    let bridge = bridge(store, &["exec-fast"], config);

    let orchestrator = bridge.orchestrator.clone();
    let starting = tokio::spawn(async move { orchestrator.start_step(job()).await });

    // The job finished before its token was written
    let routed = bridge.router.route_detached(completion(json!({
        "status": "Success",
        "executionId": "exec-fast",
        "output": {"rows": 12}
    })));

    let handle = starting.await.unwrap().unwrap();
    assert!(routed.await.unwrap().is_resumed());

    let snapshot = bridge.orchestrator.step(handle.step_id).unwrap();
    assert_eq!(snapshot.state, StepState::ResolvedSuccess);
    assert_eq!(snapshot.outcome, Some(Outcome::Success(json!({"rows": 12}))));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_execution_gives_up_without_crashing() {
    let store = Arc::new(InMemoryTokenStore::new());
    let config = BridgeConfig::default()
        .with_lookup_retry(RetryPolicy::fixed(Duration::from_millis(100), 3));
    let bridge = bridge(store, &["exec-live"], config);
    let live = bridge.orchestrator.start_step(job()).await.unwrap();

    let outcome = bridge
        .router
        .route(completion(json!({"status": "Success", "executionId": "exec-ghost"})))
        .await;

    assert!(matches!(
        outcome,
        RouteOutcome::Unresolved {
            kind: OutcomeKind::Success,
            error: ResolveError::Lookup { attempts: 3, .. },
            ..
        }
    ));

    // The router keeps working for the live step
    let resumed = bridge
        .router
        .route(completion(json!({"status": "Success", "executionId": "exec-live"})))
        .await;
    assert!(resumed.is_resumed());
    assert_eq!(
        bridge.orchestrator.step(live.step_id).unwrap().state,
        StepState::ResolvedSuccess
    );
}

#[tokio::test]
async fn test_malformed_event_leaves_step_waiting() {
    let store = Arc::new(InMemoryTokenStore::new());
    let bridge = bridge(store.clone(), &["exec-1"], BridgeConfig::default());
    let handle = bridge.orchestrator.start_step(job()).await.unwrap();

    let outcome = bridge
        .router
        .route(completion(json!({"status": "Success"})))
        .await;
    assert!(matches!(outcome, RouteOutcome::Dropped(_)));

    let raw = bridge.router.route_value(json!({"not": "an event"})).await;
    assert!(matches!(raw, RouteOutcome::Dropped(_)));

    assert_eq!(
        bridge.orchestrator.step(handle.step_id).unwrap().state,
        StepState::AwaitingCallback
    );
    assert!(!store.get("exec-1").await.unwrap().consumed);
}

#[tokio::test]
async fn test_late_event_after_timeout_is_a_duplicate() {
    let store = Arc::new(InMemoryTokenStore::new());
    let bridge = bridge(store, &["exec-slow"], BridgeConfig::default());
    let handle = bridge.orchestrator.start_step(job()).await.unwrap();

    bridge.orchestrator.time_out(handle.step_id).await.unwrap();

    let late = bridge
        .router
        .route(completion(json!({"status": "Success", "executionId": "exec-slow"})))
        .await;

    assert!(matches!(
        late,
        RouteOutcome::Unresolved { ref error, .. } if error.is_duplicate()
    ));
    assert_eq!(
        bridge.orchestrator.step(handle.step_id).unwrap().state,
        StepState::TimedOut
    );
}

#[tokio::test]
async fn test_appflow_style_configuration() {
    let store = Arc::new(InMemoryTokenStore::new());
    let config = BridgeConfig::new("aws.appflow", "AppFlow End Flow Run Report")
        .with_success_status("Execution Successful")
        .with_execution_id_path(FieldPath::parse("$.detail.execution-id").unwrap());
    let bridge = bridge(store, &["af-42"], config);
    let handle = bridge.orchestrator.start_step(job()).await.unwrap();

    let event: CompletionEvent = serde_json::from_value(json!({
        "source": "aws.appflow",
        "detail-type": "AppFlow End Flow Run Report",
        "detail": {
            "flow-name": "nightly-sync",
            "execution-id": "af-42",
            "status": "Execution Successful"
        }
    }))
    .unwrap();

    assert!(bridge.router.route(event).await.is_resumed());
    assert_eq!(
        bridge.orchestrator.step(handle.step_id).unwrap().state,
        StepState::ResolvedSuccess
    );
}

#[tokio::test]
async fn test_resolved_steps_are_purged_after_retention() {
    let ids: Vec<String> = (0..200).map(|n| format!("exec-{n}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let store = Arc::new(InMemoryTokenStore::new());
    let bridge = bridge(store, &id_refs, BridgeConfig::default());

    let mut step_ids = Vec::with_capacity(ids.len());
    for id in &ids {
        let handle = bridge.orchestrator.start_step(job()).await.unwrap();
        let routed = bridge
            .router
            .route(completion(json!({"status": "Success", "executionId": id})))
            .await;
        assert!(routed.is_resumed());
        step_ids.push(handle.step_id);
    }

    assert_eq!(bridge.orchestrator.purge_expired(chrono::Utc::now()), 0);

    let past_retention =
        chrono::Utc::now() + chrono::Duration::from_std(bridge.orchestrator.retention()).unwrap()
            + chrono::Duration::seconds(1);
    assert_eq!(bridge.orchestrator.purge_expired(past_retention), ids.len());
    assert!(step_ids
        .iter()
        .all(|id| bridge.orchestrator.step(*id).is_none()));
}
