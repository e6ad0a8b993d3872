//! Execution state for one pipeline run.
//!
//! `ExecutionContext` is owned by the runner and handed to sequential stages
//! as `&mut`. The fan-out phase never sees the mutable context: each parallel
//! stage gets a read-only [`ContextView`] and returns a [`Scratch`] of its
//! own outputs. The runner merges scratches into `parallel_results` and fails
//! fast when two stages claim the same key.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use blogsmith_common::{
    ArticleOutput, CompanyData, GroundingUrl, JobConfig, QualityReport, SitemapData, StorageResult,
};

use crate::runtime::classify::StageError;

/// Fan-out scratchpad fragment: keys one parallel stage produced.
pub type Scratch = BTreeMap<String, Value>;

/// Where the internal-link candidate pool came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPoolSource {
    CrawledBlog,
    ProvidedSitemap,
    None,
}

/// Candidate URLs for internal linking, built once in stage 0.
#[derive(Debug, Clone)]
pub struct LinkPool {
    pub source: LinkPoolSource,
    pub urls: Vec<String>,
}

impl LinkPool {
    pub fn empty() -> Self {
        Self {
            source: LinkPoolSource::None,
            urls: Vec::new(),
        }
    }
}

/// Mutable state for one pipeline execution. Stages only read keys produced
/// by their predecessors; no stage removes keys; `job_id` never changes.
#[derive(Debug)]
pub struct ExecutionContext {
    pub job_id: String,
    pub job_config: JobConfig,
    pub company_data: CompanyData,

    /// Produced by stage 0.
    pub sitemap_data: Option<SitemapData>,
    pub link_pool: LinkPool,

    /// Produced by stage 1, consumed by stage 2.
    pub prompt: Option<String>,

    /// Raw generator output (JSON string), produced by stage 2.
    pub raw_article: Option<String>,
    pub grounding_urls: Vec<GroundingUrl>,

    /// Produced by stage 3. Append-only at the field level.
    pub structured_data: Option<ArticleOutput>,

    /// Fan-out scratchpad, merged by the runner after the parallel phase.
    pub parallel_results: Scratch,

    /// Produced by stage 10.
    pub validated_article: Option<Map<String, Value>>,
    pub quality_report: Option<QualityReport>,

    /// Terminal outputs.
    pub final_article: Option<String>,
    pub storage_result: Option<StorageResult>,
}

impl ExecutionContext {
    pub fn new(job_id: impl Into<String>, job_config: JobConfig) -> Self {
        let company_data = job_config.company_data.clone().unwrap_or_default();
        Self {
            job_id: job_id.into(),
            job_config,
            company_data,
            sitemap_data: None,
            link_pool: LinkPool::empty(),
            prompt: None,
            raw_article: None,
            grounding_urls: Vec::new(),
            structured_data: None,
            parallel_results: Scratch::new(),
            validated_article: None,
            quality_report: None,
            final_article: None,
            storage_result: None,
        }
    }

    /// The extracted article; a stage-ordering bug if absent.
    pub fn article(&self) -> Result<&ArticleOutput, StageError> {
        self.structured_data.as_ref().ok_or_else(|| {
            StageError::internal("structured_data not yet extracted (stage ordering violation)")
        })
    }

    /// Merge a parallel stage's scratch into `parallel_results`.
    ///
    /// Parallel stages write to disjoint keys by convention (stage 4 owns
    /// `citations_*`, 5 `internal_links_*`, 6 `toc_*`, 7 metadata keys,
    /// 8 `faq_*`/`paa_*`, 9 image keys). The convention is asserted here:
    /// a collision is an internal error and fails the job.
    pub fn merge_scratch(&mut self, stage_name: &str, scratch: Scratch) -> Result<(), StageError> {
        for (key, value) in scratch {
            if self.parallel_results.contains_key(&key) {
                return Err(StageError::internal(format!(
                    "parallel_results key collision on '{key}' (written again by {stage_name})"
                )));
            }
            self.parallel_results.insert(key, value);
        }
        Ok(())
    }
}

/// Read-only handle the fan-out phase sees. Exposes accessors for everything
/// stages 4–9 are allowed to read; none of them can touch the mutable bag.
pub struct ContextView<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> ContextView<'a> {
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    pub fn job_id(&self) -> &str {
        &self.ctx.job_id
    }

    pub fn job_config(&self) -> &JobConfig {
        &self.ctx.job_config
    }

    pub fn company_data(&self) -> &CompanyData {
        &self.ctx.company_data
    }

    pub fn sitemap_data(&self) -> Option<&SitemapData> {
        self.ctx.sitemap_data.as_ref()
    }

    pub fn link_pool(&self) -> &LinkPool {
        &self.ctx.link_pool
    }

    pub fn grounding_urls(&self) -> &[GroundingUrl] {
        &self.ctx.grounding_urls
    }

    pub fn article(&self) -> Result<&ArticleOutput, StageError> {
        self.ctx.article()
    }

    /// Keys written by sequential predecessors (e.g. stage 2's
    /// `source_name_map`). Parallel peers' writes are not visible here;
    /// the scratchpad is merged only after the whole phase completes.
    pub fn sequential_results(&self) -> &Scratch {
        &self.ctx.parallel_results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("job-1", JobConfig::default())
    }

    #[test]
    fn merge_accepts_disjoint_keys() {
        let mut ctx = ctx();
        let mut a = Scratch::new();
        a.insert("citations_html".to_string(), json!("<p/>"));
        let mut b = Scratch::new();
        b.insert("toc_items".to_string(), json!([]));

        ctx.merge_scratch("citations", a).unwrap();
        ctx.merge_scratch("toc", b).unwrap();
        assert_eq!(ctx.parallel_results.len(), 2);
    }

    #[test]
    fn merge_rejects_colliding_keys() {
        let mut ctx = ctx();
        let mut a = Scratch::new();
        a.insert("word_count".to_string(), json!(100));
        ctx.merge_scratch("metadata", a.clone()).unwrap();

        let err = ctx.merge_scratch("rogue", a).unwrap_err();
        assert!(err.to_string().contains("collision"));
    }

    #[test]
    fn article_before_extraction_is_an_internal_error() {
        let ctx = ctx();
        assert!(ctx.article().is_err());
    }
}
