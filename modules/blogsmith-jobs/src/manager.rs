//! Fire-and-forget job manager. Clients submit and poll; a background loop
//! claims pending jobs under the concurrency cap, runs the pipeline with
//! progress checkpointing, and settles each job into exactly one terminal
//! state. Cancellation is cooperative: the token trips at the next stage
//! boundary or await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use blogsmith_common::JobConfig;
use blogsmith_engine::{
    build_production_runner, ExecutionContext, PipelineDeps, ProgressCallback, StageError,
    TOTAL_STAGES,
};

use crate::job::JobStats;
use crate::response::build_response;
use crate::store::JobStore;

const TICK_INTERVAL: Duration = Duration::from_secs(5);
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

struct RunningJob {
    cancel: CancellationToken,
}

pub struct JobManager {
    store: Arc<JobStore>,
    deps: Arc<PipelineDeps>,
    max_concurrent: usize,
    running: Arc<Mutex<HashMap<Uuid, RunningJob>>>,
    shutdown: CancellationToken,
    webhook_client: reqwest::Client,
}

impl JobManager {
    pub fn new(store: Arc<JobStore>, deps: Arc<PipelineDeps>, max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            store,
            deps,
            max_concurrent: max_concurrent.max(1),
            running: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            webhook_client: reqwest::Client::new(),
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Start the background worker loop.
    pub fn start(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            info!(max_concurrent = manager.max_concurrent, "Job manager worker started");
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(TICK_INTERVAL) => {}
                }
                if let Err(e) = manager.tick().await {
                    error!(error = %e, "Job manager tick failed");
                }
            }
            info!("Job manager worker stopped");
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn submit(&self, config: &JobConfig) -> Result<Uuid> {
        self.store.submit(config).await
    }

    /// One scheduling pass: reap finished slots, claim up to the free
    /// capacity, sweep old terminal rows.
    pub async fn tick(self: &Arc<Self>) -> Result<()> {
        let free_slots = {
            let running = self.running.lock().await;
            self.max_concurrent.saturating_sub(running.len())
        };

        if free_slots > 0 {
            for (job_id, config) in self.store.claim_pending(free_slots).await? {
                self.spawn_job(job_id, config).await;
            }
        }

        self.store.cleanup_old_jobs().await?;
        Ok(())
    }

    async fn spawn_job(self: &Arc<Self>, job_id: Uuid, config: JobConfig) {
        let cancel = CancellationToken::new();
        {
            let mut running = self.running.lock().await;
            running.insert(job_id, RunningJob { cancel: cancel.clone() });
        }

        info!(job_id = %job_id, keyword = %config.primary_keyword, "Job started");
        let manager = self.clone();
        tokio::spawn(async move {
            manager.execute_job(job_id, config, cancel).await;
            manager.running.lock().await.remove(&job_id);
        });
    }

    async fn execute_job(&self, job_id: Uuid, config: JobConfig, cancel: CancellationToken) {
        let started = Instant::now();
        let max_duration = Duration::from_secs(config.max_duration_minutes() as u64 * 60);
        let callback_url = config.callback_url.clone();

        let runner = build_production_runner(self.deps.clone());
        let mut ctx = ExecutionContext::new(job_id.to_string(), config);

        // Updated synchronously by the progress callback, so the failing
        // stage is known even though the database writes are spawned.
        let current_stage = Arc::new(std::sync::Mutex::new(None::<String>));

        let progress = self.progress_callback(job_id, current_stage.clone());
        let outcome = tokio::time::timeout(
            max_duration,
            runner.execute(&mut ctx, Some(progress), &cancel),
        )
        .await;

        let duration = started.elapsed().as_secs_f64();
        match outcome {
            Ok(Ok(())) => {
                let response = build_response(&ctx, &job_id.to_string(), duration);
                let aeo = response.get("aeo_score").cloned().unwrap_or_default();
                match self.store.mark_completed(job_id, duration, &response).await {
                    Ok(true) => {
                        info!(job_id = %job_id, duration, aeo = %aeo, "Job completed");
                        if let Some(url) = callback_url {
                            self.call_webhook(&url, job_id, "completed", &response).await;
                        }
                    }
                    Ok(false) => {
                        // The row left running state under us: cancellation
                        // won the race; no webhook for cancelled jobs.
                        info!(job_id = %job_id, "Completion skipped, job no longer running");
                    }
                    Err(e) => error!(job_id = %job_id, error = %e, "Failed to persist completion"),
                }
            }
            Ok(Err(StageError::Cancelled)) => {
                info!(job_id = %job_id, "Job cancelled");
                if let Err(e) = self.store.mark_cancelled(job_id).await {
                    error!(job_id = %job_id, error = %e, "Failed to persist cancellation");
                }
            }
            Ok(Err(e)) => {
                warn!(job_id = %job_id, error = %e, duration, "Job failed");
                let failed_stage = current_stage.lock().expect("stage lock").clone();
                if let Err(persist_err) = self
                    .store
                    .mark_failed(job_id, duration, &e.to_string(), failed_stage.as_deref())
                    .await
                {
                    error!(job_id = %job_id, error = %persist_err, "Failed to persist failure");
                }
            }
            Err(_elapsed) => {
                warn!(job_id = %job_id, minutes = max_duration.as_secs() / 60, "Job timed out");
                cancel.cancel();
                if let Err(e) = self.store.mark_timeout(job_id, duration).await {
                    error!(job_id = %job_id, error = %e, "Failed to persist timeout");
                }
            }
        }
    }

    /// Progress persists off the hot path: each callback spawns a short
    /// write so stages never block on the database. The shared
    /// `current_stage` slot is updated inline for the failure path.
    fn progress_callback(
        &self,
        job_id: Uuid,
        current_stage: Arc<std::sync::Mutex<Option<String>>>,
    ) -> ProgressCallback {
        let store = self.store.clone();
        Arc::new(move |stage_name: &str, seq_index: usize, completed: bool| {
            *current_stage.lock().expect("stage lock") = Some(stage_name.to_string());
            let store = store.clone();
            let stage_name = stage_name.to_string();
            tokio::spawn(async move {
                let result = if completed {
                    let stages_completed = (seq_index + 1) as u32;
                    let percent =
                        ((stages_completed as usize * 100) / TOTAL_STAGES).min(100) as u8;
                    store
                        .update_progress(job_id, &stage_name, percent, stages_completed)
                        .await
                } else {
                    store.update_current_stage(job_id, &stage_name).await
                };
                if let Err(e) = result {
                    warn!(job_id = %job_id, error = %e, "Progress update failed");
                }
            });
        })
    }

    /// Cancel the in-memory task (if running) and flip the row. Returns
    /// whether any state changed.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<bool> {
        {
            let running = self.running.lock().await;
            if let Some(job) = running.get(&job_id) {
                job.cancel.cancel();
            }
        }
        let updated = self.store.mark_cancelled(job_id).await?;
        if updated {
            info!(job_id = %job_id, "Job cancelled");
        }
        Ok(updated)
    }

    pub async fn stats(&self) -> Result<JobStats> {
        let running = self.running.lock().await.len();
        self.store.stats(running, self.max_concurrent).await
    }

    pub async fn running_count(&self) -> usize {
        self.running.lock().await.len()
    }

    async fn call_webhook(&self, url: &str, job_id: Uuid, status: &str, result: &serde_json::Value) {
        let payload = json!({
            "job_id": job_id.to_string(),
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "result": result,
        });

        match self
            .webhook_client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(job_id = %job_id, url, "Webhook delivered");
            }
            Ok(response) => {
                warn!(job_id = %job_id, url, status = %response.status(), "Webhook rejected");
            }
            Err(e) => {
                warn!(job_id = %job_id, url, error = %e, "Webhook failed");
            }
        }
    }

    /// Convenience for the synchronous `/write` path: run one job to
    /// completion in the caller's task, bypassing the queue.
    pub async fn run_inline(&self, config: JobConfig) -> Result<serde_json::Value, StageError> {
        let started = Instant::now();
        let job_id = Uuid::new_v4();
        let runner = build_production_runner(self.deps.clone());
        let mut ctx = ExecutionContext::new(job_id.to_string(), config);
        runner
            .execute(&mut ctx, None, &CancellationToken::new())
            .await?;
        Ok(build_response(&ctx, &job_id.to_string(), started.elapsed().as_secs_f64()))
    }
}
