//! Stage 10: fan-in. Canonicalizes the article HTML, merges every scratch
//! key into the flat validated article, applies AEO corrections, links
//! citations (including any the corrections injected), builds the citation
//! map from a final round of URL probes, and scores quality. Critical stage:
//! failures here fail the job.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use blogsmith_citations::{is_generic_fallback, CitationLinker, CitationList, UrlValidator};
use blogsmith_common::slugify;

use crate::aeo;
use crate::context::ExecutionContext;
use crate::deps::PipelineDeps;
use crate::html::{repair_tags, sanitize};
use crate::quality;
use crate::runtime::classify::StageError;
use crate::runtime::runner::Stage;

/// Fields the linker walks.
const LINKED_FIELDS: &[&str] = &["Intro", "Direct_Answer", "Teaser"];

pub struct CleanupStage {
    validator: UrlValidator,
}

impl CleanupStage {
    pub fn new(_deps: Arc<PipelineDeps>) -> Self {
        Self {
            validator: UrlValidator::with_defaults(),
        }
    }

    fn html_fields() -> Vec<String> {
        let mut fields: Vec<String> = LINKED_FIELDS.iter().map(|f| f.to_string()).collect();
        for n in 1..=9 {
            fields.push(format!("section_{n:02}_content"));
        }
        fields
    }

    fn canonicalize(article: &mut Map<String, Value>) {
        for field in Self::html_fields() {
            let Some(raw) = article.get(&field).and_then(|v| v.as_str()) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }
            let cleaned = repair_tags(&sanitize(raw));
            article.insert(field, Value::String(cleaned));
        }
    }

    fn link_citations(article: &mut Map<String, Value>, linker: &CitationLinker) {
        for field in Self::html_fields() {
            let Some(text) = article.get(&field).and_then(|v| v.as_str()) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            article.insert(field.clone(), Value::String(linker.link_field(text)));
        }
    }

    /// Intro plus every rendered section as one HTML block.
    fn combine_content(article: &Map<String, Value>) -> String {
        let get = |key: &str| article.get(key).and_then(|v| v.as_str()).unwrap_or_default();
        let mut content = String::new();
        content.push_str(get("Intro"));
        for n in 1..=9 {
            let title = get(&format!("section_{n:02}_title"));
            if title.trim().is_empty() {
                break;
            }
            content.push_str(&format!("<h2 id=\"{}\">{title}</h2>", slugify(title)));
            content.push_str(get(&format!("section_{n:02}_content")));
        }
        content
    }

    /// Final sanity probe per citation. Only URLs answering 200 with no
    /// soft-404 path enter the map; generic authority fallbacks are rejected
    /// outright.
    async fn build_citation_map(&self, citations: &CitationList) -> Map<String, Value> {
        let mut map = Map::new();
        for citation in &citations.citations {
            if is_generic_fallback(&citation.url) {
                warn!(number = citation.number, url = %citation.url, "Generic fallback rejected from citation map");
                continue;
            }
            let outcome = self.validator.probe(&citation.url).await;
            if outcome.ok {
                map.insert(citation.number.to_string(), json!(citation.url));
            } else {
                warn!(
                    number = citation.number,
                    url = %citation.url,
                    status = ?outcome.status,
                    "Citation failed final probe, excluded from map"
                );
            }
        }
        map
    }
}

#[async_trait]
impl Stage for CleanupStage {
    fn stage_num(&self) -> u8 {
        10
    }

    fn stage_name(&self) -> &'static str {
        "stage_10_cleanup"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), StageError> {
        let article = ctx.article()?;
        let mut validated = article.to_map();

        Self::canonicalize(&mut validated);

        // Merge the fan-out scratchpad; disjointness was already asserted.
        for (key, value) in &ctx.parallel_results {
            validated.insert(key.clone(), value.clone());
        }

        let citation_count = validated
            .get("citations_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        let language = ctx.job_config.language().to_string();

        aeo::enforce(&mut validated, citation_count, &language);

        let name_map: HashMap<String, String> = validated
            .get("source_name_map")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let linker = CitationLinker::new(citation_count, name_map);
        Self::link_citations(&mut validated, &linker);

        let citations: CitationList = validated
            .get("citations_list")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let citation_map = self.build_citation_map(&citations).await;
        debug!(job_id = %ctx.job_id, mapped = citation_map.len(), "Citation map built");
        validated.insert("citation_map".to_string(), Value::Object(citation_map));

        validated.insert("content".to_string(), json!(Self::combine_content(&validated)));

        let slug = ctx
            .job_config
            .slug
            .clone()
            .unwrap_or_else(|| slugify(validated.get("Headline").and_then(|v| v.as_str()).unwrap_or_default()));
        let article_url = format!(
            "{}/magazine/{slug}",
            ctx.job_config.company_url.trim_end_matches('/')
        );
        validated.insert("slug".to_string(), json!(slug));
        validated.insert("article_url".to_string(), json!(article_url));
        if let Some(client_info) = &ctx.job_config.client_info {
            validated.insert("client_info".to_string(), client_info.clone());
        }

        let report = quality::check(&validated, &language);
        info!(
            job_id = %ctx.job_id,
            aeo_score = report.metrics.aeo_score,
            passed = report.passed,
            "Quality check complete"
        );
        validated.insert("quality_report".to_string(), json!(report));

        ctx.quality_report = Some(report);
        ctx.validated_article = Some(validated);
        Ok(())
    }
}
