//! Stage 8: FAQ and People-Also-Ask validation. Extracts the pairs, drops
//! items with empty answers, dedupes by normalized question, and renumbers.
//! Shortfalls against the minimum counts warn, never fail.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::context::{ContextView, Scratch};
use crate::runtime::classify::StageError;
use crate::runtime::runner::ParallelStage;

const MAX_FAQ: usize = 6;
const MAX_PAA: usize = 4;
const MIN_FAQ: usize = 3;
const MIN_PAA: usize = 2;

pub struct FaqPaaStage;

impl FaqPaaStage {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase, punctuation-free form used as the dedup key.
    fn normalize_question(question: &str) -> String {
        question
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn clean_pairs(pairs: Vec<(&str, &str)>, cap: usize) -> Vec<serde_json::Value> {
        let mut seen = std::collections::HashSet::new();
        pairs
            .into_iter()
            .filter(|(question, answer)| {
                !question.trim().is_empty()
                    && !answer.trim().is_empty()
                    && seen.insert(Self::normalize_question(question))
            })
            .take(cap)
            .enumerate()
            .map(|(i, (question, answer))| {
                json!({
                    "number": i + 1,
                    "question": question.trim(),
                    "answer": answer.trim(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ParallelStage for FaqPaaStage {
    fn stage_num(&self) -> u8 {
        8
    }

    fn stage_name(&self) -> &'static str {
        "stage_08_faq_paa"
    }

    async fn execute(&self, view: &ContextView<'_>) -> Result<Scratch, StageError> {
        let article = view.article()?;

        let faq = Self::clean_pairs(article.faq_pairs(), MAX_FAQ);
        let paa = Self::clean_pairs(article.paa_pairs(), MAX_PAA);

        if faq.len() < MIN_FAQ {
            warn!(job_id = %view.job_id(), count = faq.len(), "FAQ below minimum of {MIN_FAQ}");
        }
        if paa.len() < MIN_PAA {
            warn!(job_id = %view.job_id(), count = paa.len(), "PAA below minimum of {MIN_PAA}");
        }

        let mut scratch = Scratch::new();
        scratch.insert("faq_count".to_string(), json!(faq.len()));
        scratch.insert("faq_items".to_string(), json!(faq));
        scratch.insert("paa_count".to_string(), json!(paa.len()));
        scratch.insert("paa_items".to_string(), json!(paa));
        Ok(scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogsmith_common::{ArticleOutput, JobConfig};

    use crate::context::ExecutionContext;

    #[tokio::test]
    async fn duplicate_questions_removed_and_renumbered() {
        let mut article = ArticleOutput::default();
        article.faq_01_question = "What is zero trust?".to_string();
        article.faq_01_answer = "A security model.".to_string();
        article.faq_02_question = "What is Zero Trust".to_string();
        article.faq_02_answer = "Duplicate phrasing.".to_string();
        article.faq_03_question = "How long does rollout take?".to_string();
        article.faq_03_answer = "About a quarter.".to_string();

        let mut ctx = ExecutionContext::new("j", JobConfig::default());
        ctx.structured_data = Some(article);
        let view = ContextView::new(&ctx);

        let scratch = FaqPaaStage::new().execute(&view).await.unwrap();
        let faq = scratch["faq_items"].as_array().unwrap();
        assert_eq!(faq.len(), 2);
        assert_eq!(faq[0]["number"], 1);
        assert_eq!(faq[1]["number"], 2);
        assert_eq!(faq[1]["question"], "How long does rollout take?");
    }

    #[tokio::test]
    async fn unanswered_questions_dropped() {
        let mut article = ArticleOutput::default();
        article.paa_01_question = "Is it worth it?".to_string();
        article.paa_01_answer = String::new();
        article.paa_02_question = "Where to start?".to_string();
        article.paa_02_answer = "With an assessment.".to_string();

        let mut ctx = ExecutionContext::new("j", JobConfig::default());
        ctx.structured_data = Some(article);
        let view = ContextView::new(&ctx);

        let scratch = FaqPaaStage::new().execute(&view).await.unwrap();
        assert_eq!(scratch["paa_count"], 1);
    }

    #[test]
    fn normalization_ignores_case_and_punctuation() {
        assert_eq!(
            FaqPaaStage::normalize_question("What is  Zero-Trust?"),
            FaqPaaStage::normalize_question("what is zero trust")
        );
    }
}
