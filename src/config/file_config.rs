use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub admin_token: Option<String>,

    // Feature configs
    pub scheduler: Option<SchedulerConfig>,
    pub signing: Option<SigningConfig>,
    pub notifications: Option<NotificationsConfig>,
    pub webhook: Option<WebhookConfig>,
    pub alerts: Option<AlertsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub base_tick_secs: Option<u64>,
    pub job_timeout_secs: Option<u64>,
    pub alert_evaluation_interval_secs: Option<u64>,
    pub pipeline_automation_interval_secs: Option<u64>,
    pub reconciliation_interval_secs: Option<u64>,
    pub reconciliation_stale_threshold_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SigningConfig {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Prefix of the link a signer follows, e.g. `https://sign.example.com/s/`.
    pub signing_url_base: Option<String>,
    pub contract_ttl_days: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub from_address: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub max_body_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub default_recipient: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
