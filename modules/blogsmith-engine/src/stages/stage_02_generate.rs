//! Stage 2: grounded generation. Calls the generator with the web-search +
//! URL-context tool pair and a response schema derived from the article
//! record, behind the api-call retry profile and the generator breaker.
//! Short or empty responses are treated as retryable failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use ai_client::GenerateRequest;
use blogsmith_common::{ArticleOutput, GroundingUrl};

use crate::context::ExecutionContext;
use crate::deps::PipelineDeps;
use crate::runtime::classify::StageError;
use crate::runtime::retry::{retry_with_backoff, RetryPolicy};
use crate::runtime::runner::Stage;

const MIN_RESPONSE_CHARS: usize = 500;
const GENERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Authority names recognized for natural-language linking, with the domain
/// fragments that identify them in grounding metadata.
const KNOWN_SOURCES: &[(&str, &[&str])] = &[
    ("IBM", &["ibm.com"]),
    ("Gartner", &["gartner.com"]),
    ("Forrester", &["forrester.com"]),
    ("McKinsey", &["mckinsey.com"]),
    ("Deloitte", &["deloitte.com"]),
    ("Accenture", &["accenture.com"]),
    ("NIST", &["nist.gov"]),
    ("OWASP", &["owasp.org"]),
    ("Google", &["cloud.google.com", "google.com"]),
    ("Microsoft", &["microsoft.com"]),
    ("AWS", &["aws.amazon.com"]),
    ("Cisco", &["cisco.com"]),
    ("CrowdStrike", &["crowdstrike.com"]),
    ("Splunk", &["splunk.com"]),
];

pub struct GenerateStage {
    deps: Arc<PipelineDeps>,
}

impl GenerateStage {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    /// System instruction with the section-length budget derived from the
    /// requested word count.
    fn system_instruction(word_count: u32) -> String {
        let (low, high) = if word_count < 2000 {
            (word_count.saturating_sub(200).max(1500), word_count + 200)
        } else if word_count < 3000 {
            (word_count - 300, word_count + 300)
        } else {
            (word_count - 500, word_count + 500)
        };

        format!(
            "You are an expert content writer optimizing for answer engines.\n\
             Research the topic deeply with web search before writing; every \
             factual claim needs a numbered citation that appears in Sources.\n\
             Target length: {low}-{high} words across all sections, mixing two \
             long sections (700+ words) with medium and short ones.\n\
             Write section content as clean HTML paragraphs and lists. Return \
             the article in the exact JSON structure of the response schema."
        )
    }

    fn response_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(ArticleOutput)).unwrap_or_else(|_| json!({}))
    }

    /// Map known authority names to the deepest URL the generator visited on
    /// their domain, for the natural-mention linker.
    fn build_source_name_map(grounding_urls: &[GroundingUrl]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = HashMap::new();

        for source in grounding_urls {
            if source.url.is_empty() {
                continue;
            }
            let domain = source.domain.to_lowercase();
            let title = source.title.to_lowercase();

            for (name, fragments) in KNOWN_SOURCES {
                let domain_hit = fragments.iter().any(|f| domain.contains(f));
                let title_hit = title.contains(&name.to_lowercase());
                if !domain_hit && !title_hit {
                    continue;
                }
                map.entry(name.to_string())
                    .and_modify(|existing| {
                        // Deeper path wins: a specific article beats a homepage.
                        let depth = |u: &str| u.matches('/').count();
                        if depth(&source.url) > depth(existing) {
                            *existing = source.url.clone();
                        }
                    })
                    .or_insert_with(|| source.url.clone());
                break;
            }
        }

        map
    }
}

#[async_trait]
impl Stage for GenerateStage {
    fn stage_num(&self) -> u8 {
        2
    }

    fn stage_name(&self) -> &'static str {
        "stage_02_generate"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), StageError> {
        let prompt = ctx
            .prompt
            .clone()
            .ok_or_else(|| StageError::internal("prompt missing before generation"))?;

        let system = Self::system_instruction(ctx.job_config.word_count());
        let schema = Self::response_schema();

        let generator = self.deps.generator.clone();
        let breakers = self.deps.breakers.clone();

        let response = retry_with_backoff(&RetryPolicy::API_CALLS, "generate_article", || {
            let request = GenerateRequest::new(prompt.clone())
                .system_instruction(system.clone())
                .response_schema(schema.clone())
                .enable_tools(true)
                .timeout(GENERATION_TIMEOUT);
            let generator = generator.clone();
            let breakers = breakers.clone();
            async move {
                breakers
                    .generator
                    .call(move || async move {
                        let response = generator.generate(request).await.map_err(StageError::from)?;
                        if response.text.trim().len() < MIN_RESPONSE_CHARS {
                            return Err(StageError::Transient(format!(
                                "generator response too short ({} chars)",
                                response.text.trim().len()
                            )));
                        }
                        Ok(response)
                    })
                    .await
            }
        })
        .await?;

        info!(
            job_id = %ctx.job_id,
            chars = response.text.len(),
            grounding_urls = response.grounding_urls.len(),
            "Article generated"
        );

        // A valid JSON payload lets us pre-build the name map for the linker.
        match serde_json::from_str::<Value>(&response.text) {
            Ok(_) => {
                let name_map = Self::build_source_name_map(&response.grounding_urls);
                if !name_map.is_empty() {
                    ctx.parallel_results
                        .insert("source_name_map".to_string(), json!(name_map));
                }
            }
            Err(e) => {
                warn!(job_id = %ctx.job_id, error = %e, "Generator response is not valid JSON yet");
            }
        }

        ctx.grounding_urls = response.grounding_urls;
        ctx.raw_article = Some(response.text);
        Ok(())
    }
}
