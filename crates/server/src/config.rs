// Host configuration
//
// Bridge semantics come from BridgeConfig::from_env; this covers only what
// the host process itself needs.

use taskbridge_durable::{ConfigError, FieldPath};

/// Host process settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PostgreSQL URL; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Where jobs are launched
    pub job_launch_url: Option<String>,
    /// Execution id field in the launch response
    pub job_execution_id_path: Option<FieldPath>,
    /// HTTP listen address
    pub http_addr: String,
    /// Prefix for API routes, e.g. "/api"
    pub api_prefix: String,
}

impl ServerConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string (optional)
    /// - `JOB_LAUNCH_URL`: job launch endpoint
    /// - `JOB_EXECUTION_ID_PATH`: default "$.ExecutionId"
    /// - `HTTP_ADDR`: default "0.0.0.0:9000"
    /// - `API_PREFIX`: default empty
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let job_execution_id_path = get("JOB_EXECUTION_ID_PATH")
            .map(|raw| {
                FieldPath::parse(&raw).map_err(|source| ConfigError::InvalidPath {
                    key: "JOB_EXECUTION_ID_PATH".to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            database_url: get("DATABASE_URL"),
            job_launch_url: get("JOB_LAUNCH_URL"),
            job_execution_id_path,
            http_addr: get("HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:9000".to_string()),
            api_prefix: get("API_PREFIX").unwrap_or_default(),
        })
    }
}
