use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of a persisted job. Pending→running when a worker claims it;
/// running reaches exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            "timeout" => Some(JobStatus::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted job row.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub current_stage: Option<String>,
    pub progress_percent: u8,
    pub stages_completed: u32,
    pub total_stages: u32,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub callback_url: Option<String>,
}

impl JobRecord {
    /// Remaining seconds estimated from elapsed time and progress, defined
    /// only for running jobs that have made measurable progress.
    pub fn estimated_remaining_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        if self.status != JobStatus::Running || self.progress_percent == 0 {
            return None;
        }
        let elapsed = (now - self.started_at?).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return None;
        }
        let p = self.progress_percent as f64;
        Some(elapsed * (100.0 - p) / p)
    }
}

/// Aggregate counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub status_counts: BTreeMap<String, u64>,
    pub running_jobs: usize,
    pub max_concurrent: usize,
    pub avg_duration_seconds: f64,
    pub database_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_job(progress: u8, started_secs_ago: i64) -> JobRecord {
        JobRecord {
            job_id: Uuid::new_v4(),
            status: JobStatus::Running,
            priority: 1,
            created_at: Utc::now(),
            started_at: Some(Utc::now() - chrono::Duration::seconds(started_secs_ago)),
            completed_at: None,
            duration_seconds: None,
            current_stage: None,
            progress_percent: progress,
            stages_completed: 0,
            total_stages: 13,
            result: None,
            error_message: None,
            retry_count: 0,
            callback_url: None,
        }
    }

    #[test]
    fn remaining_time_scales_with_progress() {
        let job = running_job(25, 100);
        let remaining = job.estimated_remaining_seconds(Utc::now()).unwrap();
        // 100s elapsed at 25% → ~300s left.
        assert!((remaining - 300.0).abs() < 5.0);
    }

    #[test]
    fn no_estimate_without_progress_or_for_terminal_jobs() {
        assert!(running_job(0, 100).estimated_remaining_seconds(Utc::now()).is_none());

        let mut done = running_job(50, 100);
        done.status = JobStatus::Completed;
        assert!(done.estimated_remaining_seconds(Utc::now()).is_none());
    }

    #[test]
    fn terminal_statuses_identified() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Timeout,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }
}
