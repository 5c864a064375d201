//! Bridge configuration
//!
//! Every component receives its settings through [`BridgeConfig`] at
//! construction time. Nothing is read from ambient scope after startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::callback::{FieldPath, PathError};
use crate::engine::DEFAULT_STEP_RETENTION;
use crate::persistence::PutStrictness;
use crate::reliability::RetryPolicy;

/// Invalid configuration value
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// A field path did not parse
    #[error("invalid path for {key}: {source}")]
    InvalidPath {
        key: String,
        #[source]
        source: PathError,
    },
}

/// Configuration surface of the callback bridge
///
/// # Example
///
/// ```
/// use taskbridge_durable::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig::new("aws.appflow", "AppFlow End Flow Run Report")
///     .with_success_status("Execution Successful")
///     .with_execution_id_path("$.detail.execution-id".parse().unwrap())
///     .with_timeout(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// `source` value that identifies events from the job system
    pub job_source: String,

    /// `detail-type` value of completion events
    pub completion_type: String,

    /// Where the execution id lives in a completion event
    pub execution_id_path: FieldPath,

    /// Where the job status lives in a completion event
    pub status_path: FieldPath,

    /// Status value that means success; anything else is a failure
    pub success_status: String,

    /// Where the job output lives; the whole `detail` is used when absent
    pub output_path: FieldPath,

    /// Where a failure cause lives, if the job system reports one
    pub failure_cause_path: FieldPath,

    /// Lookup retry for events that outrun the token write
    pub lookup_retry: RetryPolicy,

    /// What a duplicate `put` does
    pub put_strictness: PutStrictness,

    /// Deadline for awaiting steps; None means wait forever
    #[serde(default, with = "option_duration_millis")]
    pub timeout: Option<Duration>,

    /// How long finished steps stay readable before they are purged
    #[serde(default = "default_step_retention", with = "duration_millis")]
    pub step_retention: Duration,
}

fn default_step_retention() -> Duration {
    DEFAULT_STEP_RETENTION
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new("ext.job", "JobEndReport")
    }
}

impl BridgeConfig {
    /// Create a configuration for the given event source and type
    pub fn new(job_source: impl Into<String>, completion_type: impl Into<String>) -> Self {
        Self {
            job_source: job_source.into(),
            completion_type: completion_type.into(),
            execution_id_path: FieldPath::builtin("detail.executionId"),
            status_path: FieldPath::builtin("detail.status"),
            success_status: "Success".to_string(),
            output_path: FieldPath::builtin("detail.output"),
            failure_cause_path: FieldPath::builtin("detail.error"),
            lookup_retry: RetryPolicy::default(),
            put_strictness: PutStrictness::Reject,
            timeout: None,
            step_retention: DEFAULT_STEP_RETENTION,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables (all optional):
    /// - `BRIDGE_JOB_SOURCE`: event source (default: "ext.job")
    /// - `BRIDGE_COMPLETION_TYPE`: event detail-type (default: "JobEndReport")
    /// - `BRIDGE_EXECUTION_ID_PATH`: default "detail.executionId"
    /// - `BRIDGE_STATUS_PATH`: default "detail.status"
    /// - `BRIDGE_SUCCESS_STATUS`: default "Success"
    /// - `BRIDGE_OUTPUT_PATH`: default "detail.output"
    /// - `BRIDGE_FAILURE_CAUSE_PATH`: default "detail.error"
    /// - `BRIDGE_LOOKUP_MAX_ATTEMPTS`, `BRIDGE_LOOKUP_INITIAL_INTERVAL_MS`,
    ///   `BRIDGE_LOOKUP_MAX_INTERVAL_MS`: lookup retry schedule
    /// - `BRIDGE_PUT_STRICTNESS`: "reject" or "overwrite"
    /// - `BRIDGE_TIMEOUT_SECS`: deadline for awaiting steps
    /// - `BRIDGE_STEP_RETENTION_SECS`: how long finished steps are kept
    ///   (default: 3600)
    ///
    /// Event paths must start at `detail`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();

        if let Some(source) = get("BRIDGE_JOB_SOURCE") {
            config.job_source = source;
        }
        if let Some(detail_type) = get("BRIDGE_COMPLETION_TYPE") {
            config.completion_type = detail_type;
        }
        if let Some(status) = get("BRIDGE_SUCCESS_STATUS") {
            config.success_status = status;
        }

        for (key, slot) in [
            ("BRIDGE_EXECUTION_ID_PATH", &mut config.execution_id_path),
            ("BRIDGE_STATUS_PATH", &mut config.status_path),
            ("BRIDGE_OUTPUT_PATH", &mut config.output_path),
            ("BRIDGE_FAILURE_CAUSE_PATH", &mut config.failure_cause_path),
        ] {
            if let Some(raw) = get(key) {
                let path = FieldPath::parse(&raw)
                    .and_then(require_detail_root)
                    .map_err(|source| ConfigError::InvalidPath {
                        key: key.to_string(),
                        source,
                    })?;
                *slot = path;
            }
        }

        if let Some(raw) = get("BRIDGE_LOOKUP_MAX_ATTEMPTS") {
            let attempts: u32 = parse_value("BRIDGE_LOOKUP_MAX_ATTEMPTS", &raw)?;
            config.lookup_retry = config.lookup_retry.with_max_attempts(attempts);
        }
        if let Some(raw) = get("BRIDGE_LOOKUP_INITIAL_INTERVAL_MS") {
            let millis: u64 = parse_value("BRIDGE_LOOKUP_INITIAL_INTERVAL_MS", &raw)?;
            config.lookup_retry = config
                .lookup_retry
                .with_initial_interval(Duration::from_millis(millis));
        }
        if let Some(raw) = get("BRIDGE_LOOKUP_MAX_INTERVAL_MS") {
            let millis: u64 = parse_value("BRIDGE_LOOKUP_MAX_INTERVAL_MS", &raw)?;
            config.lookup_retry = config
                .lookup_retry
                .with_max_interval(Duration::from_millis(millis));
        }

        if let Some(raw) = get("BRIDGE_PUT_STRICTNESS") {
            config.put_strictness = raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "BRIDGE_PUT_STRICTNESS".to_string(),
                message,
            })?;
        }

        if let Some(raw) = get("BRIDGE_TIMEOUT_SECS") {
            let secs: u64 = parse_value("BRIDGE_TIMEOUT_SECS", &raw)?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(raw) = get("BRIDGE_STEP_RETENTION_SECS") {
            let secs: u64 = parse_value("BRIDGE_STEP_RETENTION_SECS", &raw)?;
            config.step_retention = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Check that every event path addresses the `detail` subtree
    ///
    /// [`BridgeConfig::from_lookup`] already enforces this; configurations
    /// assembled with the `with_*` builders or deserialized should be
    /// checked before use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, path) in [
            ("execution_id_path", &self.execution_id_path),
            ("status_path", &self.status_path),
            ("output_path", &self.output_path),
            ("failure_cause_path", &self.failure_cause_path),
        ] {
            require_detail_root(path.clone()).map_err(|source| ConfigError::InvalidPath {
                key: key.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Set the execution id path
    pub fn with_execution_id_path(mut self, path: FieldPath) -> Self {
        self.execution_id_path = path;
        self
    }

    /// Set the status path
    pub fn with_status_path(mut self, path: FieldPath) -> Self {
        self.status_path = path;
        self
    }

    /// Set the status value that means success
    pub fn with_success_status(mut self, status: impl Into<String>) -> Self {
        self.success_status = status.into();
        self
    }

    /// Set the output path
    pub fn with_output_path(mut self, path: FieldPath) -> Self {
        self.output_path = path;
        self
    }

    /// Set the failure cause path
    pub fn with_failure_cause_path(mut self, path: FieldPath) -> Self {
        self.failure_cause_path = path;
        self
    }

    /// Set the lookup retry policy
    pub fn with_lookup_retry(mut self, policy: RetryPolicy) -> Self {
        self.lookup_retry = policy;
        self
    }

    /// Set the duplicate-put behavior
    pub fn with_put_strictness(mut self, strictness: PutStrictness) -> Self {
        self.put_strictness = strictness;
        self
    }

    /// Set the awaiting-step timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how long finished steps are kept
    pub fn with_step_retention(mut self, retention: Duration) -> Self {
        self.step_retention = retention;
        self
    }
}

/// Completion events are only addressable below `detail`
fn require_detail_root(path: FieldPath) -> Result<FieldPath, PathError> {
    match path.segments().first() {
        Some(head) if head == "detail" => Ok(path),
        _ => Err(PathError {
            path: path.as_str().to_string(),
            reason: "event paths must start at detail",
        }),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serde support for Option<Duration> as milliseconds
mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
