//! Stage 11: review iteration. Routes each review prompt to a local rewrite
//! (intro, headline, direct answer, a numbered section, tone, length,
//! removal) and falls back to the generator for additions and anything the
//! patterns cannot place. Runs only when `review_prompts` is non-empty.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use ai_client::GenerateRequest;

use crate::context::ExecutionContext;
use crate::deps::PipelineDeps;
use crate::runtime::classify::StageError;
use crate::runtime::runner::Stage;

pub struct ReviewIterationStage {
    deps: Arc<PipelineDeps>,
}

#[derive(Debug, PartialEq)]
enum Revision {
    Intro,
    Headline,
    DirectAnswer,
    Section(usize),
    Tone,
    Length,
    Removal,
    Addition,
    Generic,
}

impl ReviewIterationStage {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    fn route(feedback: &str) -> Revision {
        let lower = feedback.to_lowercase();

        // Removal and addition outrank section targeting: "remove section 2"
        // is a removal, not a section rewrite.
        if lower.contains("remove") || lower.contains("delete") {
            return Revision::Removal;
        }
        if lower.contains("add ") || lower.contains("include") {
            return Revision::Addition;
        }
        if let Some(n) = Self::section_number(&lower) {
            return Revision::Section(n);
        }
        if lower.contains("intro") {
            Revision::Intro
        } else if lower.contains("headline") || lower.contains("title") {
            Revision::Headline
        } else if lower.contains("direct answer") {
            Revision::DirectAnswer
        } else if lower.contains("tone") || lower.contains("formal") || lower.contains("casual") {
            Revision::Tone
        } else if lower.contains("shorter") || lower.contains("longer") || lower.contains("length") {
            Revision::Length
        } else {
            Revision::Generic
        }
    }

    fn section_number(lower: &str) -> Option<usize> {
        let re = regex::Regex::new(r"section\s+(\d)").ok()?;
        let n: usize = re.captures(lower)?.get(1)?.as_str().parse().ok()?;
        (1..=9).contains(&n).then_some(n)
    }

    /// Ask the generator to rewrite one field per the feedback; on any
    /// failure the field is left as generated.
    async fn rewrite_field(&self, field_value: &str, feedback: &str) -> Option<String> {
        let prompt = format!(
            "Apply this editorial feedback and return only the revised text, \
             keeping the HTML structure:\nFeedback: {feedback}\n\nText:\n{field_value}"
        );
        let request = GenerateRequest::new(prompt).timeout(Duration::from_secs(60));
        match self.deps.generator.generate(request).await {
            Ok(response) => {
                let text = response.text.trim();
                (!text.is_empty() && !text.starts_with('{')).then(|| text.to_string())
            }
            Err(e) => {
                warn!(error = %e, "Review rewrite failed, keeping original");
                None
            }
        }
    }

    async fn apply(&self, article: &mut serde_json::Map<String, Value>, feedback: &str) {
        let revision = Self::route(feedback);
        debug!(?revision, feedback, "Applying review feedback");

        let field = match &revision {
            Revision::Intro => Some("Intro".to_string()),
            Revision::Headline => Some("Headline".to_string()),
            Revision::DirectAnswer => Some("Direct_Answer".to_string()),
            Revision::Section(n) => Some(format!("section_{n:02}_content")),
            Revision::Tone | Revision::Length | Revision::Generic => Some("Intro".to_string()),
            Revision::Removal => {
                // Local removal: blank the targeted section rather than
                // paying for a rewrite.
                if let Some(n) = Self::section_number(&feedback.to_lowercase()) {
                    article.insert(format!("section_{n:02}_title"), json!(""));
                    article.insert(format!("section_{n:02}_content"), json!(""));
                }
                None
            }
            Revision::Addition => {
                // Additions need new prose; append to the last section.
                if let Some(addition) = self.rewrite_field("", feedback).await {
                    let last = (1..=9)
                        .rev()
                        .find(|n| {
                            article
                                .get(&format!("section_{n:02}_title"))
                                .and_then(|v| v.as_str())
                                .is_some_and(|t| !t.trim().is_empty())
                        })
                        .unwrap_or(1);
                    let key = format!("section_{last:02}_content");
                    let existing = article.get(&key).and_then(|v| v.as_str()).unwrap_or_default();
                    article.insert(key, json!(format!("{existing}<p>{addition}</p>")));
                }
                None
            }
        };

        if let Some(field) = field {
            let current = article
                .get(&field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if let Some(rewritten) = self.rewrite_field(&current, feedback).await {
                article.insert(field, json!(rewritten));
            }
        }
    }
}

#[async_trait]
impl Stage for ReviewIterationStage {
    fn stage_num(&self) -> u8 {
        11
    }

    fn stage_name(&self) -> &'static str {
        "stage_11_review"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), StageError> {
        let prompts = ctx.job_config.review_prompts.clone().unwrap_or_default();
        if prompts.is_empty() {
            return Ok(());
        }

        let Some(mut validated) = ctx.validated_article.take() else {
            return Err(StageError::internal("validated_article missing before review"));
        };

        info!(job_id = %ctx.job_id, prompts = prompts.len(), "Applying review iteration");
        for feedback in &prompts {
            self.apply(&mut validated, feedback).await;
        }

        ctx.validated_article = Some(validated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_matches_documented_patterns() {
        assert_eq!(ReviewIterationStage::route("make the intro punchier"), Revision::Intro);
        assert_eq!(ReviewIterationStage::route("new headline please"), Revision::Headline);
        assert_eq!(
            ReviewIterationStage::route("rewrite section 3 with examples"),
            Revision::Section(3)
        );
        assert_eq!(ReviewIterationStage::route("more formal tone"), Revision::Tone);
        assert_eq!(ReviewIterationStage::route("remove the fluff"), Revision::Removal);
        assert_eq!(
            ReviewIterationStage::route("add a paragraph on compliance"),
            Revision::Addition
        );
        assert_eq!(ReviewIterationStage::route("just better overall"), Revision::Generic);
    }

    #[tokio::test]
    async fn no_prompts_is_a_noop() {
        let deps = Arc::new(crate::deps::PipelineDeps::mocked());
        let mut ctx = ExecutionContext::new("j", blogsmith_common::JobConfig::default());
        ReviewIterationStage::new(deps).execute(&mut ctx).await.unwrap();
        assert!(ctx.validated_article.is_none());
    }

    #[tokio::test]
    async fn removal_blanks_the_targeted_section() {
        let deps = Arc::new(crate::deps::PipelineDeps::mocked());
        let stage = ReviewIterationStage::new(deps);

        let mut article = serde_json::Map::new();
        article.insert("section_02_title".to_string(), json!("Cut me"));
        article.insert("section_02_content".to_string(), json!("<p>gone</p>"));
        stage.apply(&mut article, "remove section 2").await;

        assert_eq!(article["section_02_title"], "");
        assert_eq!(article["section_02_content"], "");
    }
}
