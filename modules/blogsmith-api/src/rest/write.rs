//! Generation endpoints: the synchronous `/write` (blocks for the full
//! pipeline run) and the fire-and-forget `/write-async`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use tracing::{info, warn};

use blogsmith_common::JobConfig;

use crate::state::AppState;

fn validate_config(config: &JobConfig) -> Result<(), String> {
    let mut missing = Vec::new();
    if config.primary_keyword.trim().is_empty() {
        missing.push("primary_keyword");
    }
    if config.company_url.trim().is_empty() {
        missing.push("company_url");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing required fields: {}", missing.join(", ")))
    }
}

/// Run the whole pipeline in-request. Blocks for minutes; async clients
/// should prefer `/write-async`.
pub async fn write_blog(
    State(state): State<Arc<AppState>>,
    Json(config): Json<JobConfig>,
) -> impl IntoResponse {
    if let Err(message) = validate_config(&config) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": message})),
        )
            .into_response();
    }

    info!(keyword = %config.primary_keyword, "Synchronous write started");
    match state.manager.run_inline(config).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            warn!(error = %e, "Synchronous write failed");
            (
                StatusCode::OK,
                Json(json!({
                    "success": false,
                    "error": e.to_string(),
                    "category": e.category(),
                })),
            )
                .into_response()
        }
    }
}

/// Submit a job and return immediately with the polling URL.
pub async fn write_blog_async(
    State(state): State<Arc<AppState>>,
    Json(config): Json<JobConfig>,
) -> impl IntoResponse {
    if let Err(message) = validate_config(&config) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": message})),
        )
            .into_response();
    }

    match state.manager.submit(&config).await {
        Ok(job_id) => (
            StatusCode::OK,
            Json(json!({
                "job_id": job_id.to_string(),
                "status": "pending",
                "polling_url": format!("/jobs/{job_id}/status"),
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "error": e.to_string()})),
        )
            .into_response(),
    }
}
