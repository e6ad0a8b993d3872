use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod jobs;
pub mod write;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(jobs::health))
        .route("/write", post(write::write_blog))
        .route("/write-async", post(write::write_blog_async))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/stats", get(jobs::job_stats))
        .route("/jobs/errors", get(jobs::error_summary))
        .route("/jobs/{job_id}/status", get(jobs::job_status))
        .route("/jobs/{job_id}/cancel", post(jobs::cancel_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
