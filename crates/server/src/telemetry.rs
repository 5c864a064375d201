// Tracing setup for the bridge host
//
// Console logging through tracing-subscriber, filtered by RUST_LOG or
// LOG_LEVEL.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when neither RUST_LOG nor LOG_LEVEL is set
pub const DEFAULT_LOG_FILTER: &str = "taskbridge_server=debug,taskbridge_durable=debug,tower_http=debug";

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, recorded once at startup
    pub service_name: String,
    /// Service version
    pub service_version: Option<String>,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Log filter (e.g., "info", "debug", "taskbridge_durable=debug")
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "taskbridge".to_string(),
            service_version: None,
            enable_console: true,
            log_filter: None,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_NAME`: Service name (default: "taskbridge")
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "taskbridge".to_string()),
            service_version: None,
            enable_console: true,
            log_filter: lookup("RUST_LOG").or_else(|| lookup("LOG_LEVEL")),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Install the global tracing subscriber
///
/// Call once, at the top of `main`.
pub fn init_telemetry(config: TelemetryConfig) {
    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(config.filter()),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(console_layer).init();

    tracing::info!(
        service = %config.service_name,
        version = config.service_version.as_deref().unwrap_or("unknown"),
        "telemetry initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup_prefers_rust_log() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "RUST_LOG" => Some("warn".to_string()),
            "LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });

        assert_eq!(config.log_filter.as_deref(), Some("warn"));
        assert_eq!(config.service_name, "taskbridge");
    }

    #[test]
    fn test_from_lookup_falls_back_to_log_level() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "LOG_LEVEL" => Some("info".to_string()),
            "SERVICE_NAME" => Some("bridge-a".to_string()),
            _ => None,
        });

        assert_eq!(config.log_filter.as_deref(), Some("info"));
        assert_eq!(config.service_name, "bridge-a");
    }
}
