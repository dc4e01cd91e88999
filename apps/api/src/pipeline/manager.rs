//! Owns the run tasks of the service.
//!
//! At most one run per user is active at a time. Each run is a spawned task
//! that builds its collaborators, drives the pipeline, and always writes a
//! terminal status for its run record, even when the pipeline panics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::factory::RunFactory;
use super::orchestrator::{PipelineError, RunOutcome};
use super::runs;
use crate::models::run::{RunCounters, RunRecord, RunStatus};
use crate::settings::get_settings;

#[derive(Debug, Error)]
pub enum RunManagerError {
    #[error("a run is already active for this user (run {run_id})")]
    AlreadyRunning { run_id: i64 },

    #[error("run store error: {0}")]
    Database(#[from] sqlx::Error),
}

struct ActiveRun {
    run_id: i64,
    stop: watch::Sender<bool>,
    progress: watch::Receiver<RunCounters>,
}

struct Inner {
    pool: SqlitePool,
    factory: Arc<dyn RunFactory>,
    stale_after: Duration,
    active: Mutex<HashMap<Uuid, ActiveRun>>,
}

#[derive(Clone)]
pub struct RunManager {
    inner: Arc<Inner>,
}

impl RunManager {
    pub fn new(pool: SqlitePool, factory: Arc<dyn RunFactory>, stale_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                factory,
                stale_after,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates a run record and spawns its task.
    pub async fn start(&self, user_id: Uuid) -> Result<RunRecord, RunManagerError> {
        let mut active = self.inner.active.lock().await;
        if let Some(run) = active.get(&user_id) {
            return Err(RunManagerError::AlreadyRunning { run_id: run.run_id });
        }

        let live: Vec<i64> = active.values().map(|r| r.run_id).collect();
        let stale_after = chrono::Duration::from_std(self.inner.stale_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));
        let failed = runs::fail_stale_runs(&self.inner.pool, stale_after, &live).await?;
        if failed > 0 {
            warn!("Marked {} stale run(s) as failed", failed);
        }

        // A fresh running row we don't own belongs to another service instance.
        if let Some(run) = runs::active_run(&self.inner.pool, user_id).await? {
            return Err(RunManagerError::AlreadyRunning { run_id: run.id });
        }

        let record = runs::create_run(&self.inner.pool, user_id).await?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(RunCounters::default());
        active.insert(
            user_id,
            ActiveRun {
                run_id: record.id,
                stop: stop_tx,
                progress: progress_rx,
            },
        );
        drop(active);

        info!(run_id = record.id, user_id = %user_id, "Run started");
        let manager = self.clone();
        let span = info_span!("run", run_id = record.id, user_id = %user_id);
        tokio::spawn(
            async move { manager.drive(record.id, user_id, stop_rx, progress_tx).await }
                .instrument(span),
        );

        Ok(record)
    }

    /// Persists the stop flag and signals the run task if it lives here.
    /// Returns false when the run is not running.
    pub async fn stop(&self, run_id: i64) -> Result<bool, RunManagerError> {
        let requested = runs::request_stop(&self.inner.pool, run_id).await?;
        let active = self.inner.active.lock().await;
        if let Some(run) = active.values().find(|r| r.run_id == run_id) {
            run.stop.send_replace(true);
            info!(run_id, "Stop requested");
        }
        Ok(requested)
    }

    /// Counters of a run in flight on this instance.
    pub async fn live_counters(&self, run_id: i64) -> Option<RunCounters> {
        let active = self.inner.active.lock().await;
        active
            .values()
            .find(|r| r.run_id == run_id)
            .map(|r| *r.progress.borrow())
    }

    pub async fn is_active(&self, user_id: Uuid) -> bool {
        self.inner.active.lock().await.contains_key(&user_id)
    }

    async fn drive(
        self,
        run_id: i64,
        user_id: Uuid,
        stop: watch::Receiver<bool>,
        progress: watch::Sender<RunCounters>,
    ) {
        let last_seen = progress.subscribe();
        let pool = self.inner.pool.clone();
        let factory = self.inner.factory.clone();

        // Inner task so a panic surfaces as a JoinError instead of killing
        // the bookkeeping below.
        let task = tokio::spawn(
            async move {
                let mut counters = RunCounters::default();
                let result =
                    execute(&pool, factory.as_ref(), user_id, &stop, &progress, &mut counters)
                        .await;
                (result, counters)
            }
            .in_current_span(),
        );

        let (status, counters, message) = match task.await {
            Ok((Ok(RunOutcome::Completed), counters)) => (RunStatus::Completed, counters, None),
            Ok((Ok(RunOutcome::Stopped), counters)) => (RunStatus::Stopped, counters, None),
            Ok((Err(e), counters)) => {
                error!("Run failed: {}", e);
                (RunStatus::Failed, counters, Some(e.to_string()))
            }
            Err(e) => {
                error!("Run task aborted: {}", e);
                let counters = *last_seen.borrow();
                (RunStatus::Failed, counters, Some(format!("Run task aborted: {e}")))
            }
        };

        match runs::finish_run(
            &self.inner.pool,
            run_id,
            status,
            Some(&counters),
            message.as_deref(),
        )
        .await
        {
            Ok(true) => info!(status = status.as_str(), "Run finished"),
            Ok(false) => warn!("Run already had a terminal status"),
            Err(e) => error!("Could not record run outcome: {}", e),
        }

        let mut active = self.inner.active.lock().await;
        if active.get(&user_id).is_some_and(|r| r.run_id == run_id) {
            active.remove(&user_id);
        }
    }
}

async fn execute(
    pool: &SqlitePool,
    factory: &dyn RunFactory,
    user_id: Uuid,
    stop: &watch::Receiver<bool>,
    progress: &watch::Sender<RunCounters>,
    counters: &mut RunCounters,
) -> Result<RunOutcome, PipelineError> {
    let settings = get_settings(pool, user_id)
        .await?
        .ok_or_else(|| PipelineError::MissingPrecondition("no settings saved".to_string()))?;
    let prepared = factory.prepare(user_id, &settings).await?;

    prepared
        .pipeline
        .run(
            &prepared.ledger,
            &prepared.resume,
            &prepared.search_target,
            stop,
            progress,
            counters,
        )
        .await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::test_pool;
    use crate::ledger::Ledger;
    use crate::pipeline::factory::PreparedRun;
    use crate::pipeline::orchestrator::testing::*;
    use crate::pipeline::orchestrator::Pipeline;
    use crate::settings::{save_settings, UserSettings};

    /// Waits on `gate` (when set) and then hands out a fake pipeline.
    struct FakeFactory {
        gate: Option<Arc<Notify>>,
        postings: usize,
    }

    #[async_trait]
    impl RunFactory for FakeFactory {
        async fn prepare(
            &self,
            _user_id: Uuid,
            _settings: &UserSettings,
        ) -> Result<PreparedRun, PipelineError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let urls: Vec<String> = (1..=self.postings).map(|i| format!("https://jobs/{i}")).collect();
            let scraper = FakeScraper::with_postings(
                urls.iter().map(|u| (u.as_str(), good_posting("Acme"))).collect(),
            );
            let mut settings = settings();
            settings.inter_application_delay = Duration::ZERO;

            Ok(PreparedRun {
                pipeline: Pipeline::new(
                    Arc::new(scraper),
                    Arc::new(FakeScorer::new(90)),
                    Arc::new(FakeContacts::new(&["jobs@acme.com"])),
                    Arc::new(FakeComposer::new(false)),
                    Arc::new(FakeMailer::default()),
                    settings,
                ),
                ledger: Ledger::in_memory().await?,
                resume: resume(),
                search_target: "search".to_string(),
            })
        }
    }

    async fn manager_with(factory: FakeFactory) -> (RunManager, SqlitePool, Uuid) {
        let pool = test_pool().await;
        let user = Uuid::new_v4();
        save_settings(&pool, &UserSettings::defaults(user)).await.unwrap();
        let manager = RunManager::new(pool.clone(), Arc::new(factory), Duration::from_secs(600));
        (manager, pool, user)
    }

    async fn wait_until_done(manager: &RunManager, pool: &SqlitePool, user: Uuid, run_id: i64) -> RunRecord {
        for _ in 0..500 {
            if !manager.is_active(user).await {
                return runs::get_run(pool, run_id).await.unwrap().unwrap();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} never finished");
    }

    #[tokio::test]
    async fn test_run_completes_with_counters() {
        let (manager, pool, user) = manager_with(FakeFactory { gate: None, postings: 3 }).await;

        let run = manager.start(user).await.unwrap();
        let done = wait_until_done(&manager, &pool, user, run.id).await;

        assert_eq!(done.run_status(), Some(RunStatus::Completed));
        assert_eq!(done.jobs_processed, 3);
        assert_eq!(done.applications_sent, 3);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_second_start_is_refused_while_active() {
        let gate = Arc::new(Notify::new());
        let (manager, pool, user) = manager_with(FakeFactory {
            gate: Some(gate.clone()),
            postings: 1,
        })
        .await;

        let run = manager.start(user).await.unwrap();
        match manager.start(user).await {
            Err(RunManagerError::AlreadyRunning { run_id }) => assert_eq!(run_id, run.id),
            other => panic!("expected a conflict, got {:?}", other.map(|r| r.id)),
        }

        gate.notify_one();
        wait_until_done(&manager, &pool, user, run.id).await;
        assert!(manager.start(user).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_before_first_posting_ends_stopped() {
        let gate = Arc::new(Notify::new());
        let (manager, pool, user) = manager_with(FakeFactory {
            gate: Some(gate.clone()),
            postings: 4,
        })
        .await;

        let run = manager.start(user).await.unwrap();
        assert_eq!(manager.live_counters(run.id).await, Some(RunCounters::default()));
        assert!(manager.stop(run.id).await.unwrap());
        gate.notify_one();

        let done = wait_until_done(&manager, &pool, user, run.id).await;
        assert_eq!(done.run_status(), Some(RunStatus::Stopped));
        assert!(done.stop_requested);
        assert_eq!(done.jobs_processed, 0);
        assert!(!manager.stop(run.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_settings_fail_the_run() {
        let pool = test_pool().await;
        let manager = RunManager::new(
            pool.clone(),
            Arc::new(FakeFactory { gate: None, postings: 1 }),
            Duration::from_secs(600),
        );
        let user = Uuid::new_v4();

        let run = manager.start(user).await.unwrap();
        let done = wait_until_done(&manager, &pool, user, run.id).await;

        assert_eq!(done.run_status(), Some(RunStatus::Failed));
        assert_eq!(
            done.error_message.as_deref(),
            Some("cannot start run: no settings saved")
        );
    }
}
