//! Stage 12: duplicate check, render, and persist. The article is scored
//! against stored fingerprints first; sections overlapping a near-duplicate
//! are regenerated (best effort) before rendering. On successful persistence
//! the article's own fingerprint is stored for future checks. Critical
//! stage: a persistence failure fails the job; a missing embedding or a
//! failed regeneration does not.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use ai_client::GenerateRequest;

use crate::context::ExecutionContext;
use crate::deps::PipelineDeps;
use crate::render::render_article;
use crate::runtime::classify::StageError;
use crate::runtime::runner::Stage;
use crate::similarity::SimilarityReport;

/// Character budget for the embedding text (~2000 tokens).
const MAX_EMBED_CHARS: usize = 8000;
/// At most this many overlapping sections are regenerated per run.
const MAX_REGENERATED_SECTIONS: usize = 3;

pub struct StorageStage {
    deps: Arc<PipelineDeps>,
}

impl StorageStage {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    /// Headline (double weight), answer, intro, teaser, then stripped body.
    fn embedding_text(validated: &serde_json::Map<String, serde_json::Value>) -> String {
        let get = |key: &str| {
            validated
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let mut parts = Vec::new();
        let headline = get("Headline");
        if !headline.is_empty() {
            parts.push(headline.clone());
            parts.push(headline);
        }
        for key in ["Direct_Answer", "Intro", "Teaser"] {
            let value = get(key);
            if !value.is_empty() {
                parts.push(value);
            }
        }
        let body = blogsmith_common::strip_html(&get("content"));
        if !body.is_empty() {
            parts.push(body);
        }

        let mut text = parts.join(" ");
        if text.len() > MAX_EMBED_CHARS {
            let mut cut = MAX_EMBED_CHARS;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            if let Some(period) = text.rfind('.') {
                if period > MAX_EMBED_CHARS * 4 / 5 {
                    text.truncate(period + 1);
                }
            }
        }
        text
    }

    /// Rewrite the sections whose headings overlap the near-duplicate, so
    /// the two articles stop competing for the same queries. Best effort:
    /// a failed rewrite leaves the section as generated.
    async fn regenerate_overlapping_sections(
        &self,
        validated: &mut Map<String, Value>,
        report: &SimilarityReport,
        job_id: &str,
    ) {
        let similar_to = report.similar_to.as_deref().unwrap_or("another article");
        let mut regenerated = 0usize;

        for n in 1..=9 {
            if regenerated >= MAX_REGENERATED_SECTIONS {
                break;
            }
            let title_key = format!("section_{n:02}_title");
            let Some(title) = validated.get(&title_key).and_then(|v| v.as_str()) else {
                continue;
            };
            if !report.overlapping_headings.contains(&title.to_lowercase()) {
                continue;
            }

            let content_key = format!("section_{n:02}_content");
            let content = validated
                .get(&content_key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if content.trim().is_empty() {
                continue;
            }

            let prompt = format!(
                "This section overlaps an already-published article ('{similar_to}') \
                 covering the same heading. Rewrite it to take a distinct angle with \
                 different examples and phrasing, keeping the HTML structure and the \
                 [N] citation references. Return only the revised section HTML.\n\n\
                 Heading: {title}\n\nSection:\n{content}"
            );
            let request = GenerateRequest::new(prompt).timeout(Duration::from_secs(60));
            match self.deps.generator.generate(request).await {
                Ok(response) => {
                    let rewritten = response.text.trim();
                    if !rewritten.is_empty() && !rewritten.starts_with('{') {
                        debug!(job_id, section = n, "Regenerated overlapping section");
                        validated.insert(content_key, json!(rewritten));
                        regenerated += 1;
                    }
                }
                Err(e) => {
                    warn!(job_id, section = n, error = %e, "Section regeneration failed");
                }
            }
        }

        if regenerated > 0 {
            info!(job_id, sections = regenerated, "Regenerated sections to reduce overlap");
        }
    }
}

#[async_trait]
impl Stage for StorageStage {
    fn stage_num(&self) -> u8 {
        12
    }

    fn stage_name(&self) -> &'static str {
        "stage_12_storage"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), StageError> {
        let Some(mut validated) = ctx.validated_article.clone() else {
            return Err(StageError::internal("validated_article missing before storage"));
        };

        // Duplicate detection against every stored fingerprint. A duplicate
        // verdict triggers one regeneration pass over the overlapping
        // sections, then a re-score; the job proceeds either way.
        let keyword = ctx.job_config.primary_keyword.clone();
        let slug = validated
            .get("slug")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let mut similarity = self
            .deps
            .similarity
            .check_article(&validated, &keyword, slug.as_deref());
        if similarity.is_duplicate {
            warn!(
                job_id = %ctx.job_id,
                score = similarity.overall_score,
                similar_to = similarity.similar_to.as_deref().unwrap_or("-"),
                "Article too similar to stored content, regenerating overlapping sections"
            );
            self.regenerate_overlapping_sections(&mut validated, &similarity, &ctx.job_id)
                .await;
            similarity = self
                .deps
                .similarity
                .check_article(&validated, &keyword, slug.as_deref());
        }
        validated.insert("similarity_report".to_string(), json!(similarity));
        ctx.validated_article = Some(validated.clone());

        let citations_html = validated
            .get("citations_html")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let html = render_article(&validated, &citations_html);

        // Content embedding for semantic dedup; best effort.
        let embed_text = Self::embedding_text(&validated);
        if !embed_text.is_empty() {
            match self.deps.embedder.embed(&embed_text).await {
                Ok(embedding) => {
                    validated.insert("content_embedding".to_string(), json!(embedding));
                }
                Err(e) => warn!(job_id = %ctx.job_id, error = %e, "Content embedding failed"),
            }
        }

        let storage_type = if ctx.job_config.client_info.is_some() {
            "supabase"
        } else {
            "local"
        };
        let result = self
            .deps
            .store
            .store(&validated, &ctx.job_id, &html, storage_type)
            .await;

        info!(
            job_id = %ctx.job_id,
            success = result.success,
            store = self.deps.store.name(),
            html_bytes = html.len(),
            "Storage complete"
        );

        if !result.success && self.deps.store.name() == "supabase" {
            let message = result.error.clone().unwrap_or_else(|| "unknown".to_string());
            ctx.storage_result = Some(result);
            return Err(StageError::external("storage", message));
        }

        if result.success {
            self.deps
                .similarity
                .store_article(&validated, &keyword, slug.as_deref());
        }

        ctx.final_article = Some(html);
        ctx.storage_result = Some(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use ai_client::mock::sample_article_json;
    use blogsmith_common::{ArticleOutput, JobConfig};

    fn ctx_with_validated() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            "job-42",
            JobConfig {
                primary_keyword: "zero trust".to_string(),
                ..JobConfig::default()
            },
        );
        let article: ArticleOutput =
            serde_json::from_str(&sample_article_json("zero trust")).unwrap();
        ctx.validated_article = Some(article.to_map());
        ctx
    }

    #[tokio::test]
    async fn renders_embeds_and_stores() {
        let store = Arc::new(InMemoryStore::new());
        let deps = Arc::new(crate::deps::PipelineDeps::mocked().with_store(store.clone()));
        let mut ctx = ctx_with_validated();

        StorageStage::new(deps).execute(&mut ctx).await.unwrap();

        assert_eq!(store.stored_jobs(), vec!["job-42"]);
        let html = store.stored_html("job-42").unwrap();
        assert!(html.contains("<h1>"));
        assert!(ctx.storage_result.unwrap().success);
        assert!(ctx.final_article.is_some());
    }

    #[tokio::test]
    async fn first_article_scores_clean_and_leaves_a_fingerprint() {
        let deps = Arc::new(crate::deps::PipelineDeps::mocked());
        let mut ctx = ctx_with_validated();

        StorageStage::new(deps.clone()).execute(&mut ctx).await.unwrap();

        let validated = ctx.validated_article.unwrap();
        let report = &validated["similarity_report"];
        assert_eq!(report["is_duplicate"], false);
        assert_eq!(report["overall_score"], 0.0);
        assert_eq!(deps.similarity.list_articles().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_article_regenerates_overlapping_sections() {
        let generator = Arc::new(
            ai_client::MockGenerator::new()
                .with_response("<p>A fresh angle on rollout sequencing [1][2].</p>"),
        );
        let deps = Arc::new(crate::deps::PipelineDeps::mocked().with_generator(generator));

        // Seed a fingerprint of the same article under a different slug.
        let earlier: ArticleOutput =
            serde_json::from_str(&sample_article_json("zero trust")).unwrap();
        deps.similarity
            .store_article(&earlier.to_map(), "zero trust", Some("earlier-post"));

        let mut ctx = ctx_with_validated();
        StorageStage::new(deps.clone()).execute(&mut ctx).await.unwrap();

        let validated = ctx.validated_article.unwrap();
        let report = &validated["similarity_report"];
        assert_eq!(report["similar_to"], "earlier-post");
        assert_eq!(report["keyword_match"], true);

        // The first overlapping section took the queued rewrite; the rest
        // were guarded against the mock's structured payload.
        assert_eq!(
            validated["section_01_content"],
            "<p>A fresh angle on rollout sequencing [1][2].</p>"
        );

        // Both the earlier article and this one are now fingerprinted.
        assert_eq!(deps.similarity.list_articles().len(), 2);
    }

    #[test]
    fn embedding_text_weights_headline_and_caps_length() {
        let mut validated = serde_json::Map::new();
        validated.insert("Headline".to_string(), json!("Short Headline"));
        validated.insert("content".to_string(), json!(format!("<p>{}</p>", "word ".repeat(5000))));

        let text = StorageStage::embedding_text(&validated);
        assert_eq!(text.matches("Short Headline").count(), 2);
        assert!(text.len() <= MAX_EMBED_CHARS);
    }
}
