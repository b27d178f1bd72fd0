use super::context::JobContext;
use super::guard::{RunningGuard, RunningSet};
use super::handle::{SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError};
use crate::server::metrics;
use crate::task_store::{JobRunStatus, TaskOutcome, TaskStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// What happened to the due tasks of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Due, but a previous execution still holds the handler key.
    pub skipped: Vec<String>,
}

/// Drives registered jobs off the persisted schedule.
///
/// Every `base_tick` the loop loads the tasks whose next run is due, runs each
/// one concurrently under its reentrancy guard and a per-job timeout, and
/// stamps `last_run = tick` / `next_run = tick + interval` whatever the
/// outcome. Shutdown is only observed between ticks.
pub struct JobScheduler {
    shared_state: Arc<RwLock<SharedJobState>>,
    running: RunningSet,
    task_store: Arc<dyn TaskStore>,
    command_receiver: mpsc::Receiver<SchedulerCommand>,
    shutdown_token: CancellationToken,
    base_tick: Duration,
    job_timeout: Duration,
    manual_runs: TaskTracker,
}

#[derive(Clone)]
struct JobRunner {
    task_store: Arc<dyn TaskStore>,
    shutdown_token: CancellationToken,
    job_timeout: Duration,
}

impl JobScheduler {
    /// Register a job and make sure its scheduled task row exists.
    pub async fn register_job(&self, job: Arc<dyn BackgroundJob>) -> Result<()> {
        let task = self
            .task_store
            .upsert_task(job.id(), job.interval(), Utc::now())?;
        info!(
            "Registering job: {} - {} (every {:?}, next run {})",
            job.id(),
            job.description(),
            job.interval(),
            task.next_run_at
        );
        let mut state = self.shared_state.write().await;
        state.jobs.insert(job.id().to_string(), job);
        Ok(())
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop. Returns once the shutdown token is cancelled and
    /// the in-flight tick has finished.
    pub async fn run(mut self) {
        let job_count = self.job_count().await;
        info!(
            "Starting job scheduler with {} registered jobs, tick {:?}",
            job_count, self.base_tick
        );

        match self.task_store.mark_stale_jobs_failed() {
            Ok(count) if count > 0 => {
                info!("Marked {} stale jobs as failed from previous run", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to mark stale jobs: {:#}", e);
            }
        }

        let mut ticker = tokio::time::interval(self.base_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = ticker.tick() => {
                    self.run_tick(Utc::now()).await;
                }
            }
        }

        self.manual_runs.close();
        if tokio::time::timeout(self.job_timeout, self.manual_runs.wait())
            .await
            .is_err()
        {
            warn!("Manually triggered jobs still running at shutdown");
        }
        info!("Job scheduler stopped");
    }

    /// Run every task due at `now`.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let due = match self.task_store.due_tasks(now) {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to load due tasks: {:#}", e);
                return report;
            }
        };

        let mut runs = Vec::new();
        for task in due {
            let job = self.shared_state.read().await.jobs.get(&task.task_key).cloned();
            let Some(job) = job else {
                debug!("No handler registered for task {}", task.task_key);
                continue;
            };
            let Some(guard) = self.running.try_acquire(&task.task_key) else {
                warn!(
                    "Job {} is still running, skipping this tick",
                    task.task_key
                );
                report.skipped.push(task.task_key);
                continue;
            };
            runs.push(self.runner().run(job, guard, now, "schedule"));
        }

        for (job_id, outcome) in futures::future::join_all(runs).await {
            match outcome {
                TaskOutcome::Ok => report.succeeded.push(job_id),
                TaskOutcome::Error => report.failed.push(job_id),
            }
        }
        report
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Start a job outside its schedule. Refused while it is already running.
    async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let job = self.shared_state.read().await.jobs.get(job_id).cloned();
        let Some(job) = job else {
            return Err(JobError::NotFound);
        };
        let Some(guard) = self.running.try_acquire(job_id) else {
            return Err(JobError::AlreadyRunning);
        };

        let runner = self.runner();
        self.manual_runs.spawn(async move {
            runner.run(job, guard, Utc::now(), "manual").await;
        });
        Ok(())
    }

    fn runner(&self) -> JobRunner {
        JobRunner {
            task_store: Arc::clone(&self.task_store),
            shutdown_token: self.shutdown_token.clone(),
            job_timeout: self.job_timeout,
        }
    }
}

impl JobRunner {
    async fn run(
        self,
        job: Arc<dyn BackgroundJob>,
        guard: RunningGuard,
        now: DateTime<Utc>,
        triggered_by: &'static str,
    ) -> (String, TaskOutcome) {
        let job_id = job.id();
        let run_id = match self.task_store.record_job_start(job_id, triggered_by) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to record job start for {}: {:#}", job_id, e);
                None
            }
        };
        info!(
            "Starting job: {} (run_id: {:?}, triggered_by: {})",
            job_id, run_id, triggered_by
        );
        metrics::set_job_running(job_id, true);

        let ctx = JobContext::new(self.shutdown_token.child_token(), now);
        let start_time = Instant::now();
        let mut handle = tokio::spawn({
            let job = Arc::clone(&job);
            async move { job.execute(&ctx).await }
        });

        let waited = tokio::time::timeout(self.job_timeout, &mut handle).await;
        let mut timed_out = false;
        let result = match waited {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(JobError::ExecutionFailed(format!("Task panic: {}", e))),
            Err(_) => {
                timed_out = true;
                // The handler is not preempted; its key stays held until it returns.
                tokio::spawn(async move {
                    let _ = handle.await;
                    metrics::set_job_running(guard.key(), false);
                    drop(guard);
                });
                Err(JobError::Timeout)
            }
        };
        let elapsed = start_time.elapsed();

        let (outcome, error_msg, label) = match &result {
            Ok(()) => {
                info!("Job {} completed successfully in {:?}", job_id, elapsed);
                (TaskOutcome::Ok, None, "success")
            }
            Err(JobError::Cancelled) => {
                info!("Job {} was cancelled after {:?}", job_id, elapsed);
                (TaskOutcome::Error, Some("Cancelled".to_string()), "cancelled")
            }
            Err(JobError::Timeout) => {
                error!("Job {} timed out after {:?}", job_id, elapsed);
                (TaskOutcome::Error, Some(JobError::Timeout.to_string()), "timeout")
            }
            Err(e) => {
                error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
                (TaskOutcome::Error, Some(e.to_string()), "failed")
            }
        };

        metrics::record_job_run(job_id, label, elapsed);
        if !timed_out {
            metrics::set_job_running(job_id, false);
        }

        if let Some(run_id) = run_id {
            let status = match outcome {
                TaskOutcome::Ok => JobRunStatus::Completed,
                TaskOutcome::Error => JobRunStatus::Failed,
            };
            if let Err(e) = self
                .task_store
                .record_job_finish(run_id, status, error_msg.clone())
            {
                error!("Failed to record job finish for {}: {:#}", job_id, e);
            }
        }
        if let Err(e) =
            self.task_store
                .record_task_attempt(job_id, now, outcome, error_msg.as_deref())
        {
            error!("Failed to update schedule for {}: {:#}", job_id, e);
        }

        (job_id.to_string(), outcome)
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    task_store: Arc<dyn TaskStore>,
    shutdown_token: CancellationToken,
    base_tick: Duration,
    job_timeout: Duration,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState {
        jobs: HashMap::new(),
    }));
    let running = RunningSet::new();

    let scheduler = JobScheduler {
        shared_state: Arc::clone(&shared_state),
        running: running.clone(),
        task_store: Arc::clone(&task_store),
        command_receiver: command_rx,
        shutdown_token,
        base_tick,
        job_timeout,
        manual_runs: TaskTracker::new(),
    };
    let handle = SchedulerHandle::new(command_tx, shared_state, running, task_store);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_store::SqliteTaskStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Sleep(Duration),
    }

    struct TestJob {
        id: &'static str,
        behavior: Behavior,
        executions: Arc<AtomicUsize>,
    }

    impl TestJob {
        fn new(id: &'static str, behavior: Behavior) -> (Arc<Self>, Arc<AtomicUsize>) {
            let executions = Arc::new(AtomicUsize::new(0));
            let job = Arc::new(TestJob {
                id,
                behavior,
                executions: executions.clone(),
            });
            (job, executions)
        }
    }

    #[async_trait]
    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A job for testing"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err(JobError::ExecutionFailed("boom".into())),
                Behavior::Panic => panic!("handler bug"),
                Behavior::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    Ok(())
                }
            }
        }
    }

    fn scheduler(job_timeout: Duration) -> (JobScheduler, SchedulerHandle, Arc<SqliteTaskStore>) {
        let store = Arc::new(SqliteTaskStore::in_memory().unwrap());
        let (scheduler, handle) = create_scheduler(
            store.clone(),
            CancellationToken::new(),
            Duration::from_millis(10),
            job_timeout,
        );
        (scheduler, handle, store)
    }

    #[tokio::test]
    async fn test_failing_handlers_do_not_stall_the_schedule() {
        let (scheduler, _handle, store) = scheduler(Duration::from_secs(5));
        let (ok_job, ok_runs) = TestJob::new("healthy", Behavior::Succeed);
        let (bad_job, bad_runs) = TestJob::new("broken", Behavior::Fail);
        let (panic_job, _) = TestJob::new("panicky", Behavior::Panic);
        scheduler.register_job(ok_job).await.unwrap();
        scheduler.register_job(bad_job).await.unwrap();
        scheduler.register_job(panic_job).await.unwrap();

        let t0 = Utc::now() + chrono::Duration::seconds(1);
        let report = scheduler.run_tick(t0).await;
        assert_eq!(report.succeeded, vec!["healthy".to_string()]);
        let mut failed = report.failed.clone();
        failed.sort();
        assert_eq!(failed, vec!["broken".to_string(), "panicky".to_string()]);

        // Failed tasks are rescheduled like successful ones.
        let broken = store.get_task("broken").unwrap().unwrap();
        assert_eq!(broken.last_outcome, Some(TaskOutcome::Error));
        assert!(broken.next_run_at > t0);

        let between = scheduler.run_tick(t0 + chrono::Duration::seconds(30)).await;
        assert!(between.succeeded.is_empty() && between.failed.is_empty());

        let next = scheduler.run_tick(t0 + chrono::Duration::seconds(60)).await;
        assert_eq!(next.succeeded, vec!["healthy".to_string()]);
        assert_eq!(next.failed.len(), 2);
        assert_eq!(ok_runs.load(Ordering::SeqCst), 2);
        assert_eq!(bad_runs.load(Ordering::SeqCst), 2);

        let history = store.get_job_history("broken", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.status == JobRunStatus::Failed));
    }

    #[tokio::test]
    async fn test_running_job_is_not_started_again() {
        let (scheduler, _handle, store) = scheduler(Duration::from_secs(5));
        let (job, runs) = TestJob::new("busy", Behavior::Succeed);
        scheduler.register_job(job).await.unwrap();
        let before = store.get_task("busy").unwrap().unwrap();

        let held = scheduler.running.try_acquire("busy").unwrap();
        let report = scheduler.run_tick(Utc::now() + chrono::Duration::seconds(1)).await;
        assert_eq!(report.skipped, vec!["busy".to_string()]);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        // Not attempted, so not rescheduled.
        let after = store.get_task("busy").unwrap().unwrap();
        assert_eq!(after.next_run_at, before.next_run_at);

        drop(held);
        let report = scheduler.run_tick(Utc::now() + chrono::Duration::seconds(1)).await;
        assert_eq!(report.succeeded, vec!["busy".to_string()]);
    }

    #[tokio::test]
    async fn test_timed_out_handler_is_a_failure_and_keeps_its_guard() {
        let (scheduler, _handle, store) = scheduler(Duration::from_millis(20));
        let (job, _) = TestJob::new("slow", Behavior::Sleep(Duration::from_millis(300)));
        scheduler.register_job(job).await.unwrap();

        let report = scheduler.run_tick(Utc::now() + chrono::Duration::seconds(1)).await;
        assert_eq!(report.failed, vec!["slow".to_string()]);
        let task = store.get_task("slow").unwrap().unwrap();
        assert_eq!(task.last_error.as_deref(), Some("Job timed out"));

        assert!(scheduler.running.is_running("slow"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!scheduler.running.is_running("slow"));
    }

    #[tokio::test]
    async fn test_manual_trigger_and_shutdown() {
        let (scheduler, handle, store) = scheduler(Duration::from_secs(5));
        let (job, runs) = TestJob::new("manual_only", Behavior::Succeed);
        scheduler.register_job(job).await.unwrap();
        let shutdown = scheduler.shutdown_token.clone();
        let loop_handle = tokio::spawn(scheduler.run());

        assert!(matches!(
            handle.trigger_job("missing").await,
            Err(JobError::NotFound)
        ));

        // Wait for the scheduled first run so the trigger below is not refused.
        for _ in 0..100 {
            if runs.load(Ordering::SeqCst) > 0 && !handle.is_running("manual_only") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.trigger_job("manual_only").await.unwrap();
        for _ in 0..100 {
            if runs.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), loop_handle)
            .await
            .expect("scheduler loop did not stop")
            .unwrap();

        let history = store.get_job_history("manual_only", 10).unwrap();
        assert!(history.iter().any(|r| r.triggered_by == "manual"));
    }
}
