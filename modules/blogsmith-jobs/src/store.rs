//! SQLite persistence for the job queue. Every status transition is a
//! compare-and-set on the current status, so concurrent workers cannot
//! double-claim a job or resurrect a terminal one.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use blogsmith_common::JobConfig;

use crate::job::{JobRecord, JobStats, JobStatus};

const RETENTION_DAYS: i64 = 7;

pub struct JobStore {
    pool: SqlitePool,
    db_path: String,
}

impl JobStore {
    /// Open (and create if missing) the single-file job database.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open jobs database")?;

        let store = Self {
            pool,
            db_path: db_path.to_string(),
        };
        store.init_schema().await?;
        info!(db_path, "Job store ready");
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps the shared
    /// memory database alive for the pool's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self {
            pool,
            db_path: ":memory:".to_string(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 2,
                config TEXT NOT NULL,
                result TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                duration_seconds REAL,
                current_stage TEXT,
                progress_percent INTEGER NOT NULL DEFAULT 0,
                stages_completed INTEGER NOT NULL DEFAULT 0,
                total_stages INTEGER NOT NULL DEFAULT 13,
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                callback_url TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_priority ON jobs(priority, created_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a new pending job and return its id.
    pub async fn submit(&self, config: &JobConfig) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO jobs (job_id, status, priority, config, created_at, callback_url)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(job_id.to_string())
        .bind(JobStatus::Pending.as_str())
        .bind(config.priority() as i64)
        .bind(serde_json::to_string(config)?)
        .bind(Utc::now().to_rfc3339())
        .bind(config.callback_url.clone())
        .execute(&self.pool)
        .await?;

        info!(job_id = %job_id, keyword = %config.primary_keyword, "Job submitted");
        Ok(job_id)
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_record(&r)).transpose()
    }

    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobRecord>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM jobs WHERE status = ?
                     ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::row_to_record).collect()
    }

    /// Claim up to `slots` pending jobs, oldest high-priority first. The
    /// pending→running transition is conditional, so a job claimed by one
    /// worker comes back empty for every other.
    pub async fn claim_pending(&self, slots: usize) -> Result<Vec<(Uuid, JobConfig)>> {
        let rows = sqlx::query(
            "SELECT job_id, config FROM jobs WHERE status = ?
             ORDER BY priority ASC, created_at ASC LIMIT ?",
        )
        .bind(JobStatus::Pending.as_str())
        .bind(slots as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::new();
        for row in rows {
            let id_text: String = row.get("job_id");
            let Ok(job_id) = Uuid::parse_str(&id_text) else {
                warn!(job_id = %id_text, "Unparseable job id in queue");
                continue;
            };

            let updated = sqlx::query(
                "UPDATE jobs SET status = ?, started_at = ?
                 WHERE job_id = ? AND status = ?",
            )
            .bind(JobStatus::Running.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&id_text)
            .bind(JobStatus::Pending.as_str())
            .execute(&self.pool)
            .await?;

            if updated.rows_affected() == 0 {
                continue;
            }

            let config_text: String = row.get("config");
            match serde_json::from_str::<JobConfig>(&config_text) {
                Ok(config) => claimed.push((job_id, config)),
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Unparseable job config, failing job");
                    self.mark_failed(job_id, 0.0, &format!("startup error: {e}"), None)
                        .await?;
                }
            }
        }
        Ok(claimed)
    }

    pub async fn update_progress(
        &self,
        job_id: Uuid,
        current_stage: &str,
        progress_percent: u8,
        stages_completed: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET current_stage = ?, progress_percent = ?, stages_completed = ?
             WHERE job_id = ? AND status = ?",
        )
        .bind(current_stage)
        .bind(progress_percent.min(100) as i64)
        .bind(stages_completed as i64)
        .bind(job_id.to_string())
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_current_stage(&self, job_id: Uuid, current_stage: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET current_stage = ? WHERE job_id = ? AND status = ?")
            .bind(current_stage)
            .bind(job_id.to_string())
            .bind(JobStatus::Running.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        job_id: Uuid,
        duration_seconds: f64,
        result: &serde_json::Value,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE jobs SET status = ?, completed_at = ?, duration_seconds = ?,
                    result = ?, progress_percent = 100, stages_completed = total_stages
             WHERE job_id = ? AND status = ?",
        )
        .bind(JobStatus::Completed.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(duration_seconds)
        .bind(serde_json::to_string(result)?)
        .bind(job_id.to_string())
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// Fail a job, recording the stage it died in when the caller knows it.
    pub async fn mark_failed(
        &self,
        job_id: Uuid,
        duration_seconds: f64,
        error_message: &str,
        failed_stage: Option<&str>,
    ) -> Result<bool> {
        let truncated: String = error_message.chars().take(1000).collect();
        let updated = sqlx::query(
            "UPDATE jobs SET status = ?, completed_at = ?, duration_seconds = ?,
                    error_message = ?, retry_count = retry_count + 1,
                    current_stage = COALESCE(?, current_stage)
             WHERE job_id = ? AND status IN (?, ?)",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(duration_seconds)
        .bind(truncated)
        .bind(failed_stage)
        .bind(job_id.to_string())
        .bind(JobStatus::Pending.as_str())
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    pub async fn mark_timeout(&self, job_id: Uuid, duration_seconds: f64) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE jobs SET status = ?, completed_at = ?, duration_seconds = ?, error_message = ?
             WHERE job_id = ? AND status = ?",
        )
        .bind(JobStatus::Timeout.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(duration_seconds)
        .bind("job exceeded max_duration_minutes")
        .bind(job_id.to_string())
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// Cancel a pending or running job. Terminal jobs are left untouched.
    pub async fn mark_cancelled(&self, job_id: Uuid) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE jobs SET status = ?, completed_at = ?
             WHERE job_id = ? AND status IN (?, ?)",
        )
        .bind(JobStatus::Cancelled.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(job_id.to_string())
        .bind(JobStatus::Pending.as_str())
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// Delete terminal jobs older than the retention window.
    pub async fn cleanup_old_jobs(&self) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(RETENTION_DAYS)).to_rfc3339();
        let deleted = sqlx::query(
            "DELETE FROM jobs WHERE status IN (?, ?, ?, ?) AND completed_at < ?",
        )
        .bind(JobStatus::Completed.as_str())
        .bind(JobStatus::Failed.as_str())
        .bind(JobStatus::Cancelled.as_str())
        .bind(JobStatus::Timeout.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if deleted > 0 {
            info!(deleted, "Cleaned up old jobs");
        }
        Ok(deleted)
    }

    pub async fn stats(&self, running_jobs: usize, max_concurrent: usize) -> Result<JobStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) as count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let status_counts = rows
            .iter()
            .map(|row| {
                let status: String = row.get("status");
                let count: i64 = row.get("count");
                (status, count as u64)
            })
            .collect();

        let avg: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(duration_seconds) FROM jobs
             WHERE status = ? AND duration_seconds IS NOT NULL",
        )
        .bind(JobStatus::Completed.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(JobStats {
            status_counts,
            running_jobs,
            max_concurrent,
            avg_duration_seconds: avg.unwrap_or(0.0),
            database_path: self.db_path.clone(),
        })
    }

    fn row_to_record(row: &SqliteRow) -> Result<JobRecord> {
        let parse_time = |key: &str| -> Option<DateTime<Utc>> {
            row.try_get::<Option<String>, _>(key)
                .ok()
                .flatten()
                .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                .map(|t| t.with_timezone(&Utc))
        };

        let id_text: String = row.get("job_id");
        let status_text: String = row.get("status");
        let result_text: Option<String> = row.get("result");

        Ok(JobRecord {
            job_id: Uuid::parse_str(&id_text)?,
            status: JobStatus::parse(&status_text)
                .with_context(|| format!("unknown job status '{status_text}'"))?,
            priority: row.get::<i64, _>("priority") as u8,
            created_at: parse_time("created_at").unwrap_or_else(Utc::now),
            started_at: parse_time("started_at"),
            completed_at: parse_time("completed_at"),
            duration_seconds: row.get("duration_seconds"),
            current_stage: row.get("current_stage"),
            progress_percent: row.get::<i64, _>("progress_percent") as u8,
            stages_completed: row.get::<i64, _>("stages_completed") as u32,
            total_stages: row.get::<i64, _>("total_stages") as u32,
            result: result_text.and_then(|t| serde_json::from_str(&t).ok()),
            error_message: row.get("error_message"),
            retry_count: row.get::<i64, _>("retry_count") as u32,
            callback_url: row.get("callback_url"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(keyword: &str, priority: u8) -> JobConfig {
        JobConfig {
            primary_keyword: keyword.to_string(),
            company_url: "https://example.com".to_string(),
            priority: Some(priority),
            ..JobConfig::default()
        }
    }

    #[tokio::test]
    async fn submit_and_get_round_trip() {
        let store = JobStore::in_memory().await.unwrap();
        let job_id = store.submit(&config("kw", 1)).await.unwrap();

        let record = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.priority, 1);
        assert_eq!(record.progress_percent, 0);
        assert_eq!(record.total_stages, 13);
    }

    #[tokio::test]
    async fn claim_orders_by_priority_then_age() {
        let store = JobStore::in_memory().await.unwrap();
        let low = store.submit(&config("low", 3)).await.unwrap();
        let high = store.submit(&config("high", 1)).await.unwrap();

        let claimed = store.claim_pending(1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].0, high);

        let claimed = store.claim_pending(5).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].0, low);
    }

    #[tokio::test]
    async fn claim_is_compare_and_set() {
        let store = JobStore::in_memory().await.unwrap();
        let job_id = store.submit(&config("kw", 1)).await.unwrap();

        let first = store.claim_pending(5).await.unwrap();
        assert_eq!(first.len(), 1);

        // Already running: nothing left to claim.
        let second = store.claim_pending(5).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.get(job_id).await.unwrap().unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn cancel_only_hits_active_jobs() {
        let store = JobStore::in_memory().await.unwrap();
        let job_id = store.submit(&config("kw", 1)).await.unwrap();
        assert!(store.mark_cancelled(job_id).await.unwrap());

        let record = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.completed_at.is_some());

        // Cancelling again is a no-op.
        assert!(!store.mark_cancelled(job_id).await.unwrap());
    }

    #[tokio::test]
    async fn completion_requires_running_status() {
        let store = JobStore::in_memory().await.unwrap();
        let job_id = store.submit(&config("kw", 1)).await.unwrap();

        // Not yet claimed: completion must not apply.
        let applied = store
            .mark_completed(job_id, 1.0, &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!applied);

        store.claim_pending(1).await.unwrap();
        let applied = store
            .mark_completed(job_id, 12.5, &serde_json::json!({"ok": true}))
            .await
            .unwrap();
        assert!(applied);

        let record = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress_percent, 100);
        assert_eq!(record.result.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn error_messages_truncate_at_one_thousand_chars() {
        let store = JobStore::in_memory().await.unwrap();
        let job_id = store.submit(&config("kw", 1)).await.unwrap();
        store.claim_pending(1).await.unwrap();

        let long_error = "x".repeat(5000);
        store
            .mark_failed(job_id, 1.0, &long_error, Some("stage_02_generate"))
            .await
            .unwrap();

        let record = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(record.error_message.unwrap().len(), 1000);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.current_stage.as_deref(), Some("stage_02_generate"));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = JobStore::in_memory().await.unwrap();
        store.submit(&config("a", 1)).await.unwrap();
        let running = store.submit(&config("b", 1)).await.unwrap();
        store.claim_pending(1).await.unwrap(); // claims "a" (older)

        let pending = store.list(Some(JobStatus::Pending), 50, 0).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_id, running);

        let all = store.list(None, 50, 0).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn progress_updates_only_running_jobs() {
        let store = JobStore::in_memory().await.unwrap();
        let job_id = store.submit(&config("kw", 1)).await.unwrap();

        // Pending: progress update is a no-op.
        store
            .update_progress(job_id, "stage_02_generate", 23, 3)
            .await
            .unwrap();
        assert_eq!(store.get(job_id).await.unwrap().unwrap().progress_percent, 0);

        store.claim_pending(1).await.unwrap();
        store
            .update_progress(job_id, "stage_02_generate", 23, 3)
            .await
            .unwrap();
        let record = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(record.progress_percent, 23);
        assert_eq!(record.current_stage.as_deref(), Some("stage_02_generate"));
    }
}
