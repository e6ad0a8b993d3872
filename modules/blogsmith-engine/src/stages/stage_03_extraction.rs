//! Stage 3: parse the raw generator output into the typed article record.
//! Missing required fields are fatal; meta-length violations only warn. A
//! best-effort refinement sub-step asks the generator to fix detectable
//! quality problems and never blocks the pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use ai_client::GenerateRequest;
use blogsmith_common::ArticleOutput;

use crate::context::ExecutionContext;
use crate::deps::PipelineDeps;
use crate::html::count_words;
use crate::runtime::classify::StageError;
use crate::runtime::runner::Stage;

const MAX_META_TITLE: usize = 60;
const MAX_META_DESCRIPTION: usize = 160;

/// Stock phrases that read as machine-written; their presence triggers the
/// refinement sub-step.
const AI_LANGUAGE_MARKERS: &[&str] = &[
    "in today's fast-paced world",
    "in the ever-evolving landscape",
    "delve into",
    "it's important to note that",
    "in conclusion",
    "unlock the potential",
    "game-changer",
];

pub struct ExtractionStage {
    deps: Arc<PipelineDeps>,
}

#[derive(Debug, Default)]
struct QualityFindings {
    keyword_overuse: bool,
    keyword_underuse: bool,
    short_first_paragraph: bool,
    ai_markers: Vec<&'static str>,
    academic_citations: bool,
}

impl QualityFindings {
    fn is_clean(&self) -> bool {
        !self.keyword_overuse
            && !self.keyword_underuse
            && !self.short_first_paragraph
            && self.ai_markers.is_empty()
            && !self.academic_citations
    }
}

impl ExtractionStage {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    fn parse(raw: &str) -> Result<ArticleOutput, StageError> {
        let article: ArticleOutput = serde_json::from_str(raw).map_err(|e| {
            StageError::validation(format!("generator output is not a valid article: {e}"))
        })?;

        let missing = article.missing_required_fields();
        if !missing.is_empty() {
            return Err(StageError::validation(format!(
                "article missing required fields: {}",
                missing.join(", ")
            )));
        }
        Ok(article)
    }

    fn warn_meta_lengths(job_id: &str, article: &ArticleOutput) {
        if article.meta_title.chars().count() > MAX_META_TITLE {
            warn!(
                job_id,
                len = article.meta_title.chars().count(),
                "Meta_Title over {MAX_META_TITLE} chars"
            );
        }
        if article.meta_description.chars().count() > MAX_META_DESCRIPTION {
            warn!(
                job_id,
                len = article.meta_description.chars().count(),
                "Meta_Description over {MAX_META_DESCRIPTION} chars"
            );
        }
    }

    fn detect_findings(article: &ArticleOutput, keyword: &str) -> QualityFindings {
        let mut findings = QualityFindings::default();

        let body: String = article
            .all_sections()
            .iter()
            .map(|(_, _, content)| *content)
            .collect::<Vec<_>>()
            .join(" ");
        let full_text = format!("{} {} {body}", article.intro, article.direct_answer);
        let lower = full_text.to_lowercase();
        let keyword_lower = keyword.to_lowercase();

        if !keyword_lower.is_empty() {
            let occurrences = lower.matches(&keyword_lower).count();
            let words = count_words(&full_text).max(1);
            // Density per 1000 words: >15 reads stuffed, 0 means the article
            // drifted off topic. A handful of mentions never counts as
            // stuffing, whatever the article length.
            let density = occurrences * 1000 / words;
            findings.keyword_overuse = occurrences >= 5 && density > 15;
            findings.keyword_underuse = occurrences == 0;
        }

        if let Some((_, _, first_content)) = article.all_sections().first() {
            if let Some(first_para) = crate::html::paragraphs(first_content).first() {
                findings.short_first_paragraph = count_words(first_para) < 20;
            }
        }

        findings.ai_markers = AI_LANGUAGE_MARKERS
            .iter()
            .filter(|marker| lower.contains(**marker))
            .copied()
            .collect();

        // Academic bracket citations dumped into prose: [1], [2], and
        // clusters like [1][2][3]. These read as footnote clutter and should
        // become natural-language inline links instead.
        let bracket_re = regex::Regex::new(r"(?:\[\d+\])+").expect("bracket citation regex");
        let prose_fields = [
            article.headline.as_str(),
            article.direct_answer.as_str(),
            article.intro.as_str(),
        ];
        let has_titled_brackets = article
            .all_sections()
            .iter()
            .any(|(_, title, content)| bracket_re.is_match(title) || bracket_re.is_match(content));
        findings.academic_citations =
            prose_fields.iter().any(|field| bracket_re.is_match(field)) || has_titled_brackets;

        findings
    }

    /// Ask the generator for targeted rewrites. Best effort: any failure is
    /// logged and the extracted article stands as-is.
    async fn refine(&self, ctx: &mut ExecutionContext, findings: QualityFindings) {
        let Some(article) = ctx.structured_data.as_mut() else {
            return;
        };

        let mut instructions = Vec::new();
        if findings.keyword_overuse {
            instructions.push("Reduce keyword repetition; vary phrasing naturally.".to_string());
        }
        if findings.keyword_underuse {
            instructions
                .push("Work the primary keyword naturally into the intro and first section.".to_string());
        }
        if findings.short_first_paragraph {
            instructions.push("Expand the first section's opening paragraph to 3-4 sentences.".to_string());
        }
        if !findings.ai_markers.is_empty() {
            instructions.push(format!(
                "Rewrite to remove these stock phrases: {}.",
                findings.ai_markers.join(", ")
            ));
        }
        if findings.academic_citations {
            instructions.push(
                "Convert academic citations [1], [2], [1][2] to natural-language inline \
                 links: replace each [N] with a contextual phrase such as 'according to \
                 <a href=\"#source-N\" class=\"citation\">the source</a>' or \
                 '<a href=\"#source-N\" class=\"citation\">research from [source name]</a> shows'."
                    .to_string(),
            );
        }

        let prompt = format!(
            "Rewrite the Intro of this article applying these fixes, and return \
             only the rewritten Intro HTML:\n{}\n\nIntro:\n{}",
            instructions.join("\n"),
            article.intro,
        );

        let request = GenerateRequest::new(prompt).timeout(Duration::from_secs(60));
        match self.deps.generator.generate(request).await {
            Ok(response) => {
                let rewritten = response.text.trim();
                // Only accept something that looks like the requested HTML
                // fragment, not a whole structured payload.
                if !rewritten.is_empty() && !rewritten.starts_with('{') {
                    debug!(job_id = %ctx.job_id, "Applied quality refinement to intro");
                    article.intro = rewritten.to_string();
                }
            }
            Err(e) => warn!(job_id = %ctx.job_id, error = %e, "Quality refinement skipped"),
        }
    }
}

#[async_trait]
impl Stage for ExtractionStage {
    fn stage_num(&self) -> u8 {
        3
    }

    fn stage_name(&self) -> &'static str {
        "stage_03_extraction"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), StageError> {
        let raw = ctx
            .raw_article
            .clone()
            .ok_or_else(|| StageError::internal("raw_article missing before extraction"))?;

        let article = Self::parse(&raw)?;
        Self::warn_meta_lengths(&ctx.job_id, &article);

        info!(
            job_id = %ctx.job_id,
            sections = article.all_sections().len(),
            faq = article.faq_pairs().len(),
            "Article extracted"
        );

        let findings = Self::detect_findings(&article, &ctx.job_config.primary_keyword);
        ctx.structured_data = Some(article);

        if !findings.is_clean() {
            debug!(job_id = %ctx.job_id, ?findings, "Quality findings detected, refining");
            self.refine(ctx, findings).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_client::mock::sample_article_json;
    use blogsmith_common::JobConfig;

    fn ctx_with_raw(raw: &str) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            "j",
            JobConfig {
                primary_keyword: "zero trust".to_string(),
                company_url: "https://x.com".to_string(),
                ..JobConfig::default()
            },
        );
        ctx.raw_article = Some(raw.to_string());
        ctx
    }

    #[tokio::test]
    async fn valid_article_extracts() {
        let deps = Arc::new(crate::deps::PipelineDeps::mocked());
        let mut ctx = ctx_with_raw(&sample_article_json("zero trust"));
        ExtractionStage::new(deps).execute(&mut ctx).await.unwrap();
        assert!(ctx.structured_data.is_some());
    }

    #[tokio::test]
    async fn missing_meta_title_is_fatal_and_names_the_field() {
        let mut value: serde_json::Value =
            serde_json::from_str(&sample_article_json("zero trust")).unwrap();
        value["Meta_Title"] = serde_json::json!("");
        let deps = Arc::new(crate::deps::PipelineDeps::mocked());
        let mut ctx = ctx_with_raw(&value.to_string());

        let err = ExtractionStage::new(deps).execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, StageError::Validation(_)));
        assert!(err.to_string().contains("Meta_Title"));
    }

    #[tokio::test]
    async fn invalid_json_is_a_validation_error() {
        let deps = Arc::new(crate::deps::PipelineDeps::mocked());
        let mut ctx = ctx_with_raw("this is not json");
        let err = ExtractionStage::new(deps).execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, StageError::Validation(_)));
    }

    #[test]
    fn ai_markers_detected() {
        let mut article: ArticleOutput =
            serde_json::from_str(&sample_article_json("zero trust")).unwrap();
        article.intro = "<p>In today's fast-paced world, let us delve into security.</p>".to_string();
        let findings = ExtractionStage::detect_findings(&article, "zero trust");
        assert_eq!(findings.ai_markers.len(), 2);
    }

    #[test]
    fn bracket_citations_in_prose_detected() {
        let mut article = ArticleOutput::default();
        article.section_01_title = "Adoption".to_string();
        article.section_01_content =
            "<p>Breach costs keep climbing [1]. Recovery takes months [2][3].</p>".to_string();
        let findings = ExtractionStage::detect_findings(&article, "zero trust");
        assert!(findings.academic_citations);
    }

    #[test]
    fn bracket_citations_in_headline_detected() {
        let mut article = ArticleOutput::default();
        article.headline = "Zero Trust Works [1]".to_string();
        let findings = ExtractionStage::detect_findings(&article, "zero trust");
        assert!(findings.academic_citations);
    }

    #[test]
    fn prose_without_brackets_is_clean() {
        let mut article = ArticleOutput::default();
        article.intro = "<p>According to <a href=\"#source-1\" class=\"citation\">the \
                         breach report</a>, costs keep climbing.</p>"
            .to_string();
        article.section_01_title = "Adoption".to_string();
        article.section_01_content =
            "<p>Research from analysts shows steady growth across regulated industries and beyond.</p>"
                .to_string();
        let findings = ExtractionStage::detect_findings(&article, "zero trust");
        assert!(!findings.academic_citations);
    }

    #[test]
    fn on_topic_article_is_clean_of_keyword_findings() {
        let article: ArticleOutput =
            serde_json::from_str(&sample_article_json("zero trust")).unwrap();
        let findings = ExtractionStage::detect_findings(&article, "zero trust");
        assert!(!findings.keyword_underuse);
        assert!(!findings.keyword_overuse);
    }
}
