mod file_config;

pub use file_config::{
    AlertsConfig, FileConfig, NotificationsConfig, SchedulerConfig, SigningConfig, WebhookConfig,
};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub webhook_secret: Option<String>,
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub admin_token: Option<String>,

    // Feature configs (with defaults)
    pub scheduler: SchedulerSettings,
    pub signing: SigningSettings,
    pub notifications: NotificationSettings,
    pub webhook: WebhookSettings,
    pub alerts: AlertSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let admin_token = non_empty(file.admin_token.or_else(|| cli.admin_token.clone()));

        let defaults = SchedulerSettings::default();
        let sched_file = file.scheduler.unwrap_or_default();
        let scheduler = SchedulerSettings {
            base_tick_secs: sched_file.base_tick_secs.unwrap_or(defaults.base_tick_secs),
            job_timeout_secs: sched_file
                .job_timeout_secs
                .unwrap_or(defaults.job_timeout_secs),
            alert_evaluation_interval_secs: sched_file
                .alert_evaluation_interval_secs
                .unwrap_or(defaults.alert_evaluation_interval_secs),
            pipeline_automation_interval_secs: sched_file
                .pipeline_automation_interval_secs
                .unwrap_or(defaults.pipeline_automation_interval_secs),
            reconciliation_interval_secs: sched_file
                .reconciliation_interval_secs
                .unwrap_or(defaults.reconciliation_interval_secs),
            reconciliation_stale_threshold_secs: sched_file
                .reconciliation_stale_threshold_secs
                .unwrap_or(defaults.reconciliation_stale_threshold_secs),
        };
        if scheduler.base_tick_secs == 0 {
            bail!("scheduler.base_tick_secs must be greater than zero");
        }

        let defaults = SigningSettings::default();
        let signing_file = file.signing.unwrap_or_default();
        let signing = SigningSettings {
            base_url: non_empty(signing_file.base_url),
            api_token: non_empty(signing_file.api_token),
            timeout_secs: signing_file.timeout_secs.unwrap_or(defaults.timeout_secs),
            signing_url_base: non_empty(signing_file.signing_url_base),
            contract_ttl_days: signing_file
                .contract_ttl_days
                .unwrap_or(defaults.contract_ttl_days),
        };

        let defaults = NotificationSettings::default();
        let notif_file = file.notifications.unwrap_or_default();
        let notifications = NotificationSettings {
            base_url: non_empty(notif_file.base_url),
            api_key: non_empty(notif_file.api_key),
            from_address: notif_file.from_address.unwrap_or(defaults.from_address),
            timeout_secs: notif_file.timeout_secs.unwrap_or(defaults.timeout_secs),
            max_attempts: notif_file.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff_ms: notif_file
                .initial_backoff_ms
                .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: notif_file.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
            backoff_multiplier: notif_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        };
        if notifications.max_attempts == 0 {
            bail!("notifications.max_attempts must be at least 1");
        }

        let webhook_file = file.webhook.unwrap_or_default();
        let webhook = WebhookSettings {
            secret: non_empty(webhook_file.secret.or_else(|| cli.webhook_secret.clone())),
            max_body_bytes: webhook_file
                .max_body_bytes
                .unwrap_or(WebhookSettings::default().max_body_bytes),
        };

        let alerts = AlertSettings {
            default_recipient: non_empty(file.alerts.unwrap_or_default().default_recipient),
        };

        Ok(Self {
            db_dir,
            port,
            logging_level,
            admin_token,
            scheduler,
            signing,
            notifications,
            webhook,
            alerts,
        })
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join("server.db")
    }

    pub fn workflow_db_path(&self) -> PathBuf {
        self.db_dir.join("workflow.db")
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub base_tick_secs: u64,
    pub job_timeout_secs: u64,
    pub alert_evaluation_interval_secs: u64,
    pub pipeline_automation_interval_secs: u64,
    pub reconciliation_interval_secs: u64,
    pub reconciliation_stale_threshold_secs: u64,
}

impl SchedulerSettings {
    pub fn base_tick(&self) -> Duration {
        Duration::from_secs(self.base_tick_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            base_tick_secs: 60,
            job_timeout_secs: 120,
            alert_evaluation_interval_secs: 600,
            pipeline_automation_interval_secs: 300,
            reconciliation_interval_secs: 900,
            reconciliation_stale_threshold_secs: 3600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SigningSettings {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
    pub signing_url_base: Option<String>,
    pub contract_ttl_days: u64,
}

impl SigningSettings {
    /// The signing provider client is only built when a base url is configured.
    pub fn enabled(&self) -> bool {
        self.base_url.is_some()
    }
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            timeout_secs: 30,
            signing_url_base: None,
            contract_ttl_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub from_address: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl NotificationSettings {
    pub fn enabled(&self) -> bool {
        self.base_url.is_some()
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            from_address: "no-reply@localhost".to_string(),
            timeout_secs: 15,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Without a secret every inbound webhook is rejected.
    pub secret: Option<String>,
    pub max_body_bytes: usize,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            max_body_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertSettings {
    pub default_recipient: Option<String>,
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
