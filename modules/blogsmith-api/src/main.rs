use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blogsmith_api::{router, AppState};
use blogsmith_common::Config;
use blogsmith_engine::PipelineDeps;
use blogsmith_jobs::{JobManager, JobStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("blogsmith=info".parse()?))
        .init();

    let config = Config::api_from_env();
    config.log_redacted();

    let deps = Arc::new(PipelineDeps::from_config(&config));
    let store = Arc::new(JobStore::connect(&config.jobs_db_path).await?);
    let manager = JobManager::new(store, deps.clone(), config.max_concurrent_jobs);
    manager.start();

    let state = Arc::new(AppState {
        manager,
        reporter: deps.reporter.clone(),
    });
    let app = router(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!(addr = %addr, "Blogsmith API listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
