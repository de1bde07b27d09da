use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `DISPATCH_EXPRESS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

/// Batch caps and the staleness cutoff. Batching is the backpressure
/// mechanism: any remainder is picked up by the next trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_message_batch_size")]
    pub message_batch_size: usize,
    #[serde(default = "default_enrollment_batch_size")]
    pub enrollment_batch_size: usize,
    /// Rows stuck in `processing` longer than this are reclaimed to
    /// `pending` at the start of each invocation.
    #[serde(default = "default_stale_claim_minutes")]
    pub stale_claim_minutes: u32,
}

/// Trigger authorization. A caller must present one of: the platform cron
/// secret, the custom trigger secret, or an admin bearer token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub cron_secret: Option<String>,
    #[serde(default)]
    pub trigger_secret: Option<String>,
    #[serde(default)]
    pub admin_tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_message_batch_size() -> usize {
    50
}
fn default_enrollment_batch_size() -> usize {
    100
}
fn default_stale_claim_minutes() -> u32 {
    15
}
fn default_metrics_port() -> u16 {
    9100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_batch_size: default_message_batch_size(),
            enrollment_batch_size: default_enrollment_batch_size(),
            stale_claim_minutes: default_stale_claim_minutes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            engine: EngineConfig::default(),
            auth: AuthConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("DISPATCH_EXPRESS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.message_batch_size, 50);
        assert_eq!(config.engine.enrollment_batch_size, 100);
        assert_eq!(config.engine.stale_claim_minutes, 15);
        assert!(config.auth.cron_secret.is_none());
        assert!(config.auth.admin_tokens.is_empty());
    }
}
