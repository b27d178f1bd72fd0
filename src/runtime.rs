//! Process-wide service context.
//!
//! Built once at startup: opens the stores, builds the provider clients and
//! engines, registers the recurring jobs and spawns the scheduler loop.
//! Subsystems whose configuration is missing are skipped (and logged) while
//! the rest start normally.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alerts::{AlertEngine, WorkflowMetricSource};
use crate::background_jobs::jobs::{
    AlertEvaluationJob, ContractReconciliationJob, PipelineAutomationJob,
};
use crate::background_jobs::{create_scheduler, BackgroundJob, JobScheduler, SchedulerHandle};
use crate::config::AppConfig;
use crate::notifications::{
    DisabledNotificationProvider, HttpNotificationProvider, NotificationDispatcher,
    NotificationProvider, RetryPolicy,
};
use crate::pipeline::PipelineEngine;
use crate::server::{ServerConfig, ServerState};
use crate::signing::{HttpSigningProvider, SignatureWorkflowManager, SigningProvider};
use crate::task_store::SqliteTaskStore;
use crate::workflow_store::SqliteWorkflowStore;

/// How long shutdown waits for in-flight notification deliveries.
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// External clients the runtime talks to.
pub struct Providers {
    /// `None` disables the signing workflow.
    pub signing: Option<Arc<dyn SigningProvider>>,
    pub notifications: Arc<dyn NotificationProvider>,
}

impl Providers {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let signing: Option<Arc<dyn SigningProvider>> = match &config.signing.base_url {
            Some(base_url) => {
                info!("Signing provider configured at {}", base_url);
                Some(Arc::new(
                    HttpSigningProvider::new(
                        base_url.clone(),
                        config.signing.api_token.clone(),
                        config.signing.signing_url_base.clone(),
                        config.signing.timeout_secs,
                    )
                    .context("Failed to build signing provider client")?,
                ))
            }
            None => None,
        };

        let notifications: Arc<dyn NotificationProvider> = match &config.notifications.base_url {
            Some(base_url) => {
                info!("Notification provider configured at {}", base_url);
                Arc::new(
                    HttpNotificationProvider::new(
                        base_url.clone(),
                        config.notifications.api_key.clone(),
                        config.notifications.from_address.clone(),
                        config.notifications.timeout_secs,
                    )
                    .context("Failed to build notification provider client")?,
                )
            }
            None => {
                warn!("No notification provider configured; notifications will fail permanently");
                Arc::new(DisabledNotificationProvider)
            }
        };

        Ok(Self {
            signing,
            notifications,
        })
    }
}

pub struct ServiceRuntime {
    config: AppConfig,
    shutdown_token: CancellationToken,
    scheduler_task: Option<JoinHandle<()>>,
    scheduler_handle: SchedulerHandle,
    dispatcher: NotificationDispatcher,
    workflow_store: Arc<SqliteWorkflowStore>,
    workflow: Option<Arc<SignatureWorkflowManager>>,
    pipeline_engine: Arc<PipelineEngine>,
}

impl ServiceRuntime {
    pub async fn start(config: &AppConfig) -> Result<Self> {
        let providers = Providers::from_config(config)?;
        Self::start_with(config, providers).await
    }

    pub async fn start_with(config: &AppConfig, providers: Providers) -> Result<Self> {
        info!("Opening task store at {:?}...", config.server_db_path());
        let task_store = Arc::new(SqliteTaskStore::new(config.server_db_path())?);
        info!("Opening workflow store at {:?}...", config.workflow_db_path());
        let workflow_store = Arc::new(SqliteWorkflowStore::new(config.workflow_db_path())?);

        let dispatcher = NotificationDispatcher::new(
            providers.notifications,
            workflow_store.clone(),
            RetryPolicy::new(&config.notifications),
        );

        let workflow = match providers.signing {
            Some(provider) => {
                let ttl = match config.signing.contract_ttl_days {
                    0 => None,
                    days => Some(chrono::Duration::days(days as i64)),
                };
                Some(Arc::new(SignatureWorkflowManager::new(
                    workflow_store.clone(),
                    provider,
                    dispatcher.clone(),
                    ttl,
                )))
            }
            None => {
                warn!("Signing provider not configured; signing workflow disabled");
                None
            }
        };

        let scheduler_settings = &config.scheduler;
        let stale_threshold =
            Duration::from_secs(scheduler_settings.reconciliation_stale_threshold_secs);

        let metric_source = Arc::new(WorkflowMetricSource::new(
            workflow_store.clone(),
            workflow_store.clone(),
            workflow_store.clone(),
            chrono::Duration::from_std(stale_threshold).unwrap_or(chrono::Duration::hours(1)),
        ));
        let alert_engine = Arc::new(AlertEngine::new(
            workflow_store.clone(),
            metric_source,
            dispatcher.clone(),
            config.alerts.default_recipient.clone(),
        ));
        let pipeline_engine = Arc::new(PipelineEngine::new(
            workflow_store.clone(),
            workflow_store.clone(),
            dispatcher.clone(),
        ));

        let shutdown_token = CancellationToken::new();
        let (scheduler, scheduler_handle) = create_scheduler(
            task_store,
            shutdown_token.child_token(),
            scheduler_settings.base_tick(),
            scheduler_settings.job_timeout(),
        );

        let mut jobs: Vec<Arc<dyn BackgroundJob>> = Vec::new();
        match scheduler_settings.alert_evaluation_interval_secs {
            0 => info!("Alert evaluation disabled"),
            secs => jobs.push(Arc::new(AlertEvaluationJob::new(
                alert_engine,
                Duration::from_secs(secs),
            ))),
        }
        match scheduler_settings.pipeline_automation_interval_secs {
            0 => info!("Pipeline automation disabled"),
            secs => jobs.push(Arc::new(PipelineAutomationJob::new(
                pipeline_engine.clone(),
                Duration::from_secs(secs),
            ))),
        }
        match (&workflow, scheduler_settings.reconciliation_interval_secs) {
            (None, _) => info!("Contract reconciliation disabled: no signing workflow"),
            (Some(_), 0) => info!("Contract reconciliation disabled"),
            (Some(manager), secs) => jobs.push(Arc::new(ContractReconciliationJob::new(
                manager.clone(),
                Duration::from_secs(secs),
                stale_threshold,
            ))),
        }
        register_jobs(&scheduler, jobs).await;

        let scheduler_task = tokio::spawn(scheduler.run());
        info!("Service runtime started");

        Ok(Self {
            config: config.clone(),
            shutdown_token,
            scheduler_task: Some(scheduler_task),
            scheduler_handle,
            dispatcher,
            workflow_store,
            workflow,
            pipeline_engine,
        })
    }

    pub fn scheduler_handle(&self) -> SchedulerHandle {
        self.scheduler_handle.clone()
    }

    pub fn workflow(&self) -> Option<Arc<SignatureWorkflowManager>> {
        self.workflow.clone()
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Token cancelled by [`ServiceRuntime::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn server_state(&self) -> ServerState {
        ServerState {
            config: ServerConfig {
                requests_logging_level: self.config.logging_level.clone(),
                port: self.config.port,
                admin_token: self.config.admin_token.clone(),
                webhook_secret: self.config.webhook.secret.clone(),
                webhook_max_body_bytes: self.config.webhook.max_body_bytes,
            },
            start_time: Instant::now(),
            workflow: self.workflow.clone(),
            scheduler_handle: Some(self.scheduler_handle.clone()),
            alert_store: self.workflow_store.clone(),
            notification_store: self.workflow_store.clone(),
            pipeline_store: self.workflow_store.clone(),
            pipeline_engine: self.pipeline_engine.clone(),
        }
    }

    /// Stop the scheduler (letting its in-flight tick finish), then give
    /// pending notification deliveries a bounded time to drain.
    pub async fn shutdown(mut self) {
        info!("Shutting down service runtime...");
        self.shutdown_token.cancel();
        if let Some(task) = self.scheduler_task.take() {
            if let Err(e) = task.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
        }
        if !self.dispatcher.shutdown(NOTIFICATION_DRAIN_TIMEOUT).await {
            warn!("Shutdown continued with notification deliveries still pending");
        }
        info!("Service runtime stopped");
    }
}

/// A job that fails to register is logged and left out; the others still run.
async fn register_jobs(scheduler: &JobScheduler, jobs: Vec<Arc<dyn BackgroundJob>>) {
    for job in jobs {
        let job_id = job.id();
        match scheduler.register_job(job).await {
            Ok(()) => info!("Registered job {}", job_id),
            Err(e) => error!("Failed to register job {}: {:#}", job_id, e),
        }
    }
}
