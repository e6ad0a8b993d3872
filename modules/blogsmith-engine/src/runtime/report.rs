//! In-process error monitoring: per `(category, stage)` counters plus a ring
//! buffer of recent classified errors, surfaced at `GET /jobs/errors`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::error;

use super::classify::{ErrorCategory, Severity};

const MAX_ERROR_HISTORY: usize = 100;

#[derive(Debug, Clone)]
pub struct ReportedError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub stage: String,
    pub job_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct ReporterState {
    counts: HashMap<String, u64>,
    recent: VecDeque<ReportedError>,
}

#[derive(Default)]
pub struct ErrorReporter {
    state: Mutex<ReporterState>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &self,
        category: ErrorCategory,
        severity: Severity,
        stage: &str,
        job_id: Option<&str>,
        message: &str,
    ) {
        let entry = ReportedError {
            category,
            severity,
            stage: stage.to_string(),
            job_id: job_id.map(str::to_string),
            message: message.chars().take(500).collect(),
            timestamp: Utc::now(),
        };

        error!(
            category = category.as_str(),
            severity = ?severity,
            stage,
            job_id = job_id.unwrap_or("-"),
            "{message}"
        );

        let mut state = self.state.lock().expect("reporter lock");
        let key = format!("{}:{stage}", category.as_str());
        *state.counts.entry(key).or_insert(0) += 1;
        state.recent.push_back(entry);
        while state.recent.len() > MAX_ERROR_HISTORY {
            state.recent.pop_front();
        }
    }

    /// Summary payload for the observability endpoint.
    pub fn summary(&self) -> Value {
        let state = self.state.lock().expect("reporter lock");
        let recent: Vec<Value> = state
            .recent
            .iter()
            .rev()
            .take(10)
            .map(|e| {
                json!({
                    "timestamp": e.timestamp.to_rfc3339(),
                    "category": e.category.as_str(),
                    "severity": e.severity,
                    "stage": e.stage,
                    "job_id": e.job_id,
                    "message": e.message.chars().take(100).collect::<String>(),
                })
            })
            .collect();

        json!({
            "total_errors": state.recent.len(),
            "error_counts": state.counts,
            "recent_errors": recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded() {
        let reporter = ErrorReporter::new();
        for n in 0..150 {
            reporter.report(
                ErrorCategory::Transient,
                Severity::Low,
                "stage_05_internal_links",
                None,
                &format!("error {n}"),
            );
        }
        let summary = reporter.summary();
        assert_eq!(summary["total_errors"], 100);
        assert_eq!(
            summary["error_counts"]["transient:stage_05_internal_links"],
            150
        );
    }

    #[test]
    fn recent_errors_are_newest_first() {
        let reporter = ErrorReporter::new();
        reporter.report(ErrorCategory::Timeout, Severity::Medium, "s1", Some("j1"), "old");
        reporter.report(ErrorCategory::RateLimit, Severity::Medium, "s2", Some("j2"), "new");
        let summary = reporter.summary();
        assert_eq!(summary["recent_errors"][0]["message"], "new");
    }
}
