//! Stage 4: citation validation and formatting. Parses the free-form source
//! list, HEAD-probes every URL, swaps broken URLs for grounded alternatives,
//! and emits the citation HTML block. Citations that end up on a generic
//! authority fallback are dropped, never restored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use blogsmith_citations::{
    is_generic_fallback, parse_sources, AlternativeFinder, CitationList, UrlValidator,
};

use crate::context::{ContextView, Scratch};
use crate::deps::PipelineDeps;
use crate::runtime::classify::StageError;
use crate::runtime::fallback::search_citation_url;
use crate::runtime::retry::{retry_with_backoff, RetryPolicy};
use crate::runtime::runner::ParallelStage;

pub struct CitationsStage {
    deps: Arc<PipelineDeps>,
    validator: UrlValidator,
}

impl CitationsStage {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self {
            deps,
            validator: UrlValidator::with_defaults(),
        }
    }

    fn empty_scratch() -> Scratch {
        let mut scratch = Scratch::new();
        scratch.insert("citations_html".to_string(), json!(""));
        scratch.insert("citations_count".to_string(), json!(0));
        scratch.insert("citations_list".to_string(), json!(CitationList::default()));
        scratch
    }

    /// Deepest grounded URL per domain, for domain-only upgrades.
    fn grounding_by_domain(view: &ContextView<'_>) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = HashMap::new();
        for grounded in view.grounding_urls() {
            let depth = |u: &str| u.matches('/').count();
            map.entry(grounded.domain.clone())
                .and_modify(|existing| {
                    if depth(&grounded.url) > depth(existing) {
                        *existing = grounded.url.clone();
                    }
                })
                .or_insert_with(|| grounded.url.clone());
        }
        map
    }

    async fn validate_citations(
        &self,
        view: &ContextView<'_>,
        mut list: CitationList,
    ) -> CitationList {
        let company = view.company_data();
        let company_url = company.company_url.clone().unwrap_or_default();
        let competitors = company.company_competitors.clone();
        let finder = AlternativeFinder::new(
            self.deps.generator.as_ref(),
            &company_url,
            &competitors,
            &[],
        );
        let grounded = Self::grounding_by_domain(view);

        let mut validated = Vec::new();
        for mut citation in std::mem::take(&mut list.citations) {
            // Upgrade a bare domain to the article the generator actually read.
            if let Some(upgraded) =
                AlternativeFinder::enhance_from_grounding(&citation.url, &grounded)
            {
                debug!(number = citation.number, url = %upgraded, "Upgraded domain-only citation");
                citation.url = upgraded;
            }

            let url = citation.url.clone();
            let breakers = self.deps.breakers.clone();
            let validator = &self.validator;
            let probe = retry_with_backoff(&RetryPolicy::URL_VALIDATION, "probe_citation", || {
                let url = url.clone();
                let breakers = breakers.clone();
                async move {
                    breakers
                        .url_validation
                        .call(move || async move {
                            let outcome = validator.probe(&url).await;
                            if outcome.ok {
                                Ok(outcome)
                            } else {
                                Err(StageError::Transient(format!(
                                    "probe of {url} failed (status {:?})",
                                    outcome.status
                                )))
                            }
                        })
                        .await
                }
            })
            .await;

            match probe {
                Ok(_) => validated.push(citation),
                Err(StageError::BreakerOpen(_)) => {
                    // Probe infrastructure is down; degrade to a search URL
                    // rather than losing the reference entirely.
                    warn!(number = citation.number, "URL validation breaker open, using search fallback");
                    citation.url = search_citation_url(&citation.title);
                    validated.push(citation);
                }
                Err(_) => match finder.find_alternative(&citation, false).await {
                    Some(replacement) if is_generic_fallback(&replacement) => {
                        warn!(
                            number = citation.number,
                            url = %replacement,
                            "Replacement is a generic authority fallback, dropping citation"
                        );
                    }
                    Some(replacement) => {
                        info!(
                            number = citation.number,
                            from = %citation.url,
                            to = %replacement,
                            "Citation URL replaced"
                        );
                        citation.url = replacement;
                        validated.push(citation);
                    }
                    None => {
                        warn!(number = citation.number, url = %citation.url, "No alternative found, dropping citation");
                    }
                },
            }
        }

        CitationList::new(validated)
    }
}

#[async_trait]
impl ParallelStage for CitationsStage {
    fn stage_num(&self) -> u8 {
        4
    }

    fn stage_name(&self) -> &'static str {
        "stage_04_citations"
    }

    async fn execute(&self, view: &ContextView<'_>) -> Result<Scratch, StageError> {
        let article = view.article()?;
        let sources = article.sources.trim();
        if sources.is_empty() {
            debug!(job_id = %view.job_id(), "No sources in article");
            return Ok(Self::empty_scratch());
        }

        let parsed = parse_sources(sources);
        if parsed.is_empty() {
            warn!(job_id = %view.job_id(), "No valid citations extracted from sources");
            return Ok(Self::empty_scratch());
        }
        info!(job_id = %view.job_id(), count = parsed.count(), "Citations parsed");

        let validated = self.validate_citations(view, parsed).await;
        info!(job_id = %view.job_id(), count = validated.count(), "Citations validated");

        let mut scratch = Scratch::new();
        scratch.insert("citations_html".to_string(), json!(validated.to_html_paragraph_list()));
        scratch.insert("citations_count".to_string(), json!(validated.count()));
        scratch.insert("citations_list".to_string(), json!(validated));
        Ok(scratch)
    }
}
