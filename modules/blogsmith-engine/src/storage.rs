//! Persistence hooks for stage 12. The trait mirrors the external storage
//! contract: given the validated article and rendered HTML, persist and
//! report `(success, details)` as a flat [`StorageResult`].

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use blogsmith_common::StorageResult;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn store(
        &self,
        validated_article: &Map<String, Value>,
        job_id: &str,
        html_content: &str,
        storage_type: &str,
    ) -> StorageResult;

    fn name(&self) -> &str;
}

/// Degraded mode when storage credentials are absent: logs and succeeds.
pub struct NoopStore;

#[async_trait]
impl ArticleStore for NoopStore {
    async fn store(
        &self,
        _validated_article: &Map<String, Value>,
        job_id: &str,
        html_content: &str,
        storage_type: &str,
    ) -> StorageResult {
        info!(job_id, storage_type, bytes = html_content.len(), "Noop store, skipping persistence");
        StorageResult {
            success: true,
            storage_type: "noop".to_string(),
            ..StorageResult::default()
        }
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Test double that records every stored article.
#[derive(Default)]
pub struct InMemoryStore {
    stored: Mutex<Vec<(String, Map<String, Value>, String)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_jobs(&self) -> Vec<String> {
        self.stored.lock().unwrap().iter().map(|(id, _, _)| id.clone()).collect()
    }

    pub fn stored_html(&self, job_id: &str) -> Option<String> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _, _)| id == job_id)
            .map(|(_, _, html)| html.clone())
    }
}

#[async_trait]
impl ArticleStore for InMemoryStore {
    async fn store(
        &self,
        validated_article: &Map<String, Value>,
        job_id: &str,
        html_content: &str,
        _storage_type: &str,
    ) -> StorageResult {
        self.stored.lock().unwrap().push((
            job_id.to_string(),
            validated_article.clone(),
            html_content.to_string(),
        ));
        StorageResult {
            success: true,
            storage_type: "memory".to_string(),
            article_id: Some(job_id.to_string()),
            ..StorageResult::default()
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Optional Google Doc mirror of the rendered article. Best effort: a
/// failure never fails the store call.
pub struct DriveMirror {
    access_token: String,
    folder_id: String,
    http: reqwest::Client,
}

impl DriveMirror {
    pub fn new(access_token: &str, folder_id: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            folder_id: folder_id.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Upload the HTML as a Google Doc and return its file id.
    pub async fn mirror(&self, title: &str, html: &str) -> anyhow::Result<String> {
        let metadata = json!({
            "name": title,
            "mimeType": "application/vnd.google-apps.document",
            "parents": [self.folder_id],
        });

        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")?,
            )
            .part(
                "file",
                reqwest::multipart::Part::text(html.to_string()).mime_str("text/html")?,
            );

        let response = self
            .http
            .post("https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart")
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("drive upload returned {}", response.status());
        }
        let body: Value = response.json().await?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("drive response missing file id"))
    }
}

/// Supabase persistence over the PostgREST surface: updates the article row,
/// stores the content embedding when one was computed, and marks the source
/// keyword as written. Optionally mirrors the rendered HTML to Drive.
pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    http: reqwest::Client,
    drive: Option<DriveMirror>,
}

impl SupabaseStore {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            http: reqwest::Client::new(),
            drive: None,
        }
    }

    pub fn with_drive(mut self, mirror: DriveMirror) -> Self {
        self.drive = Some(mirror);
        self
    }

    async fn patch(&self, table: &str, id: &str, body: &Value) -> anyhow::Result<()> {
        let url = format!("{}/rest/v1/{table}?id=eq.{id}", self.base_url);
        let response = self
            .http
            .patch(&url)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("supabase {table} update returned {status}: {text}");
        }
        Ok(())
    }
}

#[async_trait]
impl ArticleStore for SupabaseStore {
    async fn store(
        &self,
        validated_article: &Map<String, Value>,
        job_id: &str,
        html_content: &str,
        storage_type: &str,
    ) -> StorageResult {
        let get_str = |key: &str| {
            validated_article
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let client_info = validated_article.get("client_info").cloned().unwrap_or(Value::Null);
        let Some(article_id) = client_info.get("article_id").and_then(|v| v.as_str()) else {
            warn!(job_id, "No article_id in client_info, skipping supabase update");
            return StorageResult {
                success: false,
                storage_type: storage_type.to_string(),
                error: Some("missing article_id".to_string()),
                ..StorageResult::default()
            };
        };

        let update = json!({
            "headline": get_str("Headline"),
            "title": get_str("Headline"),
            "slug": get_str("slug"),
            "html_content": html_content,
            "direct_answer": get_str("Direct_Answer"),
            "intro": get_str("Intro"),
            "teaser": get_str("Teaser"),
            "image_url": get_str("image_url"),
            "image_alt_text": get_str("image_alt_text"),
            "generation_status": "completed",
            "generation_error": Value::Null,
            "status": "in_review",
            "updated_at": Utc::now().to_rfc3339(),
        });

        if let Err(e) = self.patch("articles", article_id, &update).await {
            warn!(job_id, error = %e, "Supabase article update failed");
            return StorageResult {
                success: false,
                storage_type: storage_type.to_string(),
                article_id: Some(article_id.to_string()),
                error: Some(e.to_string()),
                ..StorageResult::default()
            };
        }

        let mut embedding_stored = false;
        if let Some(embedding) = validated_article.get("content_embedding") {
            let body = json!({
                "content_embedding": embedding,
                "embedded_at": Utc::now().to_rfc3339(),
            });
            match self.patch("articles", article_id, &body).await {
                Ok(()) => embedding_stored = true,
                Err(e) => warn!(job_id, error = %e, "Embedding store failed"),
            }
        }

        if let Some(keyword_id) = client_info.get("keyword_id").and_then(|v| v.as_str()) {
            let body = json!({"written": true, "updated_at": Utc::now().to_rfc3339()});
            if let Err(e) = self.patch("keywords", keyword_id, &body).await {
                warn!(job_id, error = %e, "Keyword mark-written failed");
            }
        }

        let mut doc_id = None;
        if let Some(drive) = &self.drive {
            let title = get_str("Headline");
            match drive.mirror(&title, html_content).await {
                Ok(id) => doc_id = Some(id),
                Err(e) => warn!(job_id, error = %e, "Drive mirror failed"),
            }
        }

        info!(job_id, article_id, "Supabase article updated");
        StorageResult {
            success: true,
            storage_type: storage_type.to_string(),
            article_id: Some(article_id.to_string()),
            article_url: validated_article
                .get("article_url")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            doc_id,
            embedding_stored,
            ..StorageResult::default()
        }
    }

    fn name(&self) -> &str {
        "supabase"
    }
}
