//! Job observability endpoints: status, listing, cancellation, stats,
//! error summary, and health.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use blogsmith_jobs::{JobRecord, JobStatus};

use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "blogsmith",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn status_body(record: &JobRecord) -> serde_json::Value {
    let mut body = json!({
        "job_id": record.job_id.to_string(),
        "status": record.status.as_str(),
        "created_at": record.created_at.to_rfc3339(),
        "started_at": record.started_at.map(|t| t.to_rfc3339()),
        "completed_at": record.completed_at.map(|t| t.to_rfc3339()),
        "current_stage": record.current_stage,
        "progress_percent": record.progress_percent,
        "stages_completed": record.stages_completed,
        "total_stages": record.total_stages,
        "duration_seconds": record.duration_seconds,
        "retry_count": record.retry_count,
    });

    match record.status {
        JobStatus::Completed => {
            body["result"] = record.result.clone().unwrap_or(serde_json::Value::Null);
        }
        JobStatus::Failed | JobStatus::Timeout => {
            body["error"] = json!(record.error_message);
        }
        JobStatus::Running => {
            body["estimated_remaining_seconds"] =
                json!(record.estimated_remaining_seconds(Utc::now()));
        }
        _ => {}
    }
    body
}

pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let Ok(job_id) = Uuid::parse_str(&job_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "job not found"})),
        )
            .into_response();
    };

    match state.manager.store().get(job_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(status_body(&record))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "job not found"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct ListParams {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => match JobStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("unknown status filter '{raw}'")})),
                )
                    .into_response();
            }
        },
    };

    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let offset = params.offset.unwrap_or(0).max(0);

    match state.manager.store().list(status, limit, offset).await {
        Ok(records) => {
            let jobs: Vec<_> = records.iter().map(status_body).collect();
            (
                StatusCode::OK,
                Json(json!({"jobs": jobs, "count": jobs.len(), "limit": limit, "offset": offset})),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let Ok(job_id) = Uuid::parse_str(&job_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "job not found"})),
        )
            .into_response();
    };

    match state.manager.cancel_job(job_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({"success": true, "job_id": job_id.to_string(), "status": "cancelled"})),
        )
            .into_response(),
        Ok(false) => (
            StatusCode::OK,
            Json(json!({
                "success": false,
                "job_id": job_id.to_string(),
                "error": "job not found or already terminal",
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

pub async fn job_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.manager.stats().await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

pub async fn error_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.reporter.summary())
}
