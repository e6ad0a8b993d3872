//! Job-manager lifecycle tests over an in-memory store, mocked pipeline
//! collaborators, and a local HTTP fixture.

mod support;

use std::sync::Arc;
use std::time::Duration;

use ai_client::mock::{sample_article_json, MockGenerator};
use blogsmith_common::JobConfig;
use blogsmith_engine::PipelineDeps;
use blogsmith_jobs::{JobManager, JobStatus, JobStore};

use support::spawn_fixture_server;

fn fixture_article(keyword: &str, base: &str) -> String {
    let mut value: serde_json::Value =
        serde_json::from_str(&sample_article_json(keyword)).unwrap();
    value["Sources"] = serde_json::Value::String(format!(
        "[1]: {base}/research/report – Research Report\n[2]: {base}/guides/rollout – Rollout Guide"
    ));
    value.to_string()
}

fn job_config(keyword: &str, base: &str) -> JobConfig {
    JobConfig {
        primary_keyword: keyword.to_string(),
        company_url: base.to_string(),
        ..JobConfig::default()
    }
}

async fn manager_with(generator: MockGenerator, max_concurrent: usize) -> Arc<JobManager> {
    let store = Arc::new(JobStore::in_memory().await.unwrap());
    let deps = Arc::new(PipelineDeps::mocked().with_generator(Arc::new(generator)));
    JobManager::new(store, deps, max_concurrent)
}

async fn wait_for_status(
    manager: &JobManager,
    job_id: uuid::Uuid,
    status: JobStatus,
    timeout: Duration,
) -> blogsmith_jobs::JobRecord {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let record = manager.store().get(job_id).await.unwrap().unwrap();
        if record.status == status {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} stuck in {:?} waiting for {status:?}",
            record.status
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn job_runs_to_completion_with_progress_and_result() {
    let (addr, _webhooks) = spawn_fixture_server().await;
    let base = format!("http://{addr}");
    let keyword = "zero trust security architecture";

    let manager = manager_with(
        MockGenerator::new().with_response(fixture_article(keyword, &base)),
        3,
    )
    .await;

    let job_id = manager.submit(&job_config(keyword, &base)).await.unwrap();
    assert_eq!(
        manager.store().get(job_id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );

    manager.tick().await.unwrap();
    let record = wait_for_status(&manager, job_id, JobStatus::Completed, Duration::from_secs(60)).await;

    assert_eq!(record.progress_percent, 100);
    assert_eq!(record.stages_completed, record.total_stages);
    assert!(record.duration_seconds.unwrap() > 0.0);
    assert!(record.completed_at.is_some());

    let result = record.result.unwrap();
    assert!(!result["headline"].as_str().unwrap().is_empty());
    assert!(result["quality_report"]["metrics"]["aeo_score"].is_u64());
}

#[tokio::test]
async fn webhook_fires_once_on_completion() {
    let (addr, webhooks) = spawn_fixture_server().await;
    let base = format!("http://{addr}");
    let keyword = "cloud security compliance";

    let manager = manager_with(
        MockGenerator::new().with_response(fixture_article(keyword, &base)),
        3,
    )
    .await;

    let mut config = job_config(keyword, &base);
    config.callback_url = Some(format!("{base}/webhook"));
    let job_id = manager.submit(&config).await.unwrap();

    manager.tick().await.unwrap();
    wait_for_status(&manager, job_id, JobStatus::Completed, Duration::from_secs(60)).await;

    // Delivery is fire-and-forget after the status flip; give it a moment.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let delivered = webhooks.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0]["job_id"], job_id.to_string());
    assert_eq!(delivered[0]["status"], "completed");
    assert!(delivered[0]["timestamp"].is_string());
    assert!(delivered[0]["result"]["headline"].is_string());
}

#[tokio::test]
async fn cancellation_stops_progress_and_suppresses_webhook() {
    let (addr, webhooks) = spawn_fixture_server().await;
    let base = format!("http://{addr}");
    let keyword = "incident response plan";

    // Slow generation keeps the job inside stage 2 long enough to cancel.
    let generator = MockGenerator::new()
        .with_delay(Duration::from_secs(3))
        .with_response(fixture_article(keyword, &base));
    let manager = manager_with(generator, 3).await;

    let mut config = job_config(keyword, &base);
    config.callback_url = Some(format!("{base}/webhook"));
    let job_id = manager.submit(&config).await.unwrap();

    manager.tick().await.unwrap();
    wait_for_status(&manager, job_id, JobStatus::Running, Duration::from_secs(10)).await;

    assert!(manager.cancel_job(job_id).await.unwrap());
    let record = wait_for_status(&manager, job_id, JobStatus::Cancelled, Duration::from_secs(10)).await;
    assert!(record.completed_at.is_some());
    assert!(record.result.is_none());

    // No further progress once cancelled, and the webhook never fires.
    let frozen = record.progress_percent;
    tokio::time::sleep(Duration::from_secs(4)).await;
    let after = manager.store().get(job_id).await.unwrap().unwrap();
    assert_eq!(after.status, JobStatus::Cancelled);
    assert_eq!(after.progress_percent, frozen);
    assert!(webhooks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrency_cap_limits_running_jobs() {
    let (addr, _webhooks) = spawn_fixture_server().await;
    let base = format!("http://{addr}");

    let generator = MockGenerator::new().with_delay(Duration::from_secs(5));
    let manager = manager_with(generator, 2).await;

    for n in 0..5 {
        manager
            .submit(&job_config(&format!("keyword {n}"), &base))
            .await
            .unwrap();
    }

    manager.tick().await.unwrap();
    assert_eq!(manager.running_count().await, 2);

    // A second tick with full slots claims nothing more.
    manager.tick().await.unwrap();
    assert_eq!(manager.running_count().await, 2);

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.running_jobs, 2);
    assert_eq!(stats.max_concurrent, 2);
    assert_eq!(stats.status_counts.get("pending"), Some(&3));
    assert_eq!(stats.status_counts.get("running"), Some(&2));
}

#[tokio::test]
async fn failed_extraction_records_stage_and_error() {
    let (addr, _webhooks) = spawn_fixture_server().await;
    let base = format!("http://{addr}");

    let mut broken: serde_json::Value =
        serde_json::from_str(&fixture_article("ai cybersecurity", &base)).unwrap();
    broken["Meta_Title"] = serde_json::Value::String(String::new());

    let manager = manager_with(MockGenerator::new().with_response(broken.to_string()), 3).await;
    let job_id = manager.submit(&job_config("ai cybersecurity", &base)).await.unwrap();

    manager.tick().await.unwrap();
    let record = wait_for_status(&manager, job_id, JobStatus::Failed, Duration::from_secs(60)).await;

    assert_eq!(record.current_stage.as_deref(), Some("stage_03_extraction"));
    assert!(record.error_message.unwrap().contains("Meta_Title"));
    assert!(record.duration_seconds.is_some());
}

#[tokio::test]
async fn progress_percent_stays_within_bounds() {
    let (addr, _webhooks) = spawn_fixture_server().await;
    let base = format!("http://{addr}");
    let keyword = "api security";

    let generator = MockGenerator::new()
        .with_delay(Duration::from_millis(300))
        .with_response(fixture_article(keyword, &base));
    let manager = manager_with(generator, 1).await;
    let job_id = manager.submit(&job_config(keyword, &base)).await.unwrap();
    manager.tick().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        let record = manager.store().get(job_id).await.unwrap().unwrap();
        assert!(record.progress_percent <= 100);
        assert!(record.stages_completed <= record.total_stages);
        if record.status.is_terminal() {
            assert_eq!(record.status, JobStatus::Completed);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never finished");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
