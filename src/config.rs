//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub resilience: ResilienceConfig,
    pub scheduler: SchedulerConfig,
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Retry, timeout and circuit settings for external calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Consecutive network failures after which calls short-circuit
    pub max_consecutive_failures: u32,
    /// Upper bound for a single attempt
    pub call_timeout_ms: u64,
    pub max_retries: u32,
    /// Base delay, doubled on every retry
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Endpoint used by the periodic connectivity probe
    pub probe_url: String,
    pub probe_interval_seconds: u64,
    pub probe_timeout_ms: u64,
}

/// Scheduler and status settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of recent sync results kept for status reporting
    pub history_limit: usize,
    /// Seed the default source and rule catalogue into an empty store
    pub seed_defaults: bool,
    /// How often the daemon logs the integration status
    pub status_log_interval_seconds: u64,
}

/// Outbound HTTP settings shared by all feed adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_seconds: u64,
}

/// Persistence for source and rule definitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding sources and rules; in-memory only when unset
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resilience: ResilienceConfig {
                max_consecutive_failures: 3,
                call_timeout_ms: 10_000,
                max_retries: 2,
                retry_delay_ms: 1_000,
                max_retry_delay_ms: 30_000,
                probe_url: "https://www.google.com/generate_204".to_string(),
                probe_interval_seconds: 30,
                probe_timeout_ms: 2_000,
            },
            scheduler: SchedulerConfig {
                history_limit: 100,
                seed_defaults: true,
                status_log_interval_seconds: 300,
            },
            http: HttpConfig {
                user_agent: format!("asset-enrichment/{}", env!("CARGO_PKG_VERSION")),
                request_timeout_seconds: 30,
            },
            store: StoreConfig { path: None },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Config::default())?;

        let mut builder = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        // Override with environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        builder
            .add_source(config::Environment::with_prefix("ENRICHMENT").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_resilience_contract() {
        let config = Config::default();
        assert_eq!(config.resilience.max_consecutive_failures, 3);
        assert_eq!(config.resilience.call_timeout_ms, 10_000);
        assert_eq!(config.resilience.max_retries, 2);
        assert_eq!(config.resilience.retry_delay_ms, 1_000);
        assert_eq!(config.resilience.probe_interval_seconds, 30);
        assert_eq!(config.resilience.probe_timeout_ms, 2_000);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let config = Config::load().expect("defaults should deserialize");
        assert_eq!(config.scheduler.history_limit, 100);
        assert_eq!(config.logging.level, "info");
    }
}
