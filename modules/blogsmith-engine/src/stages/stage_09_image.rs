//! Stage 9: article imagery. Hero, mid-article, and bottom images generate
//! concurrently, each behind the image retry profile and breaker with a
//! placeholder fallback. Graphics mode swaps the photographic prompt style
//! for a diagram style.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::context::{ContextView, Scratch};
use crate::deps::PipelineDeps;
use crate::runtime::classify::StageError;
use crate::runtime::fallback::placeholder_image_url;
use crate::runtime::retry::{retry_with_backoff, RetryPolicy};
use crate::runtime::runner::ParallelStage;

const MAX_ALT_TEXT: usize = 125;

pub struct ImageStage {
    deps: Arc<PipelineDeps>,
}

struct ImageSlot {
    key_prefix: &'static str,
    prompt: String,
}

impl ImageStage {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    fn style(use_graphics: bool) -> &'static str {
        if use_graphics {
            "clean editorial infographic, flat design, labeled diagram"
        } else {
            "professional editorial photograph, natural light"
        }
    }

    fn slots(view: &ContextView<'_>) -> Result<Vec<ImageSlot>, StageError> {
        let article = view.article()?;
        let use_graphics = view.job_config().use_graphics.unwrap_or(false);
        let style = Self::style(use_graphics);

        let section_titles = |range: std::ops::RangeInclusive<usize>| -> String {
            range
                .filter_map(|n| article.section(n).map(|(title, _)| title))
                .collect::<Vec<_>>()
                .join(" and ")
        };

        let mid_topic = section_titles(3..=4);
        let bottom_topic = section_titles(6..=7);

        Ok(vec![
            ImageSlot {
                key_prefix: "image",
                prompt: format!("{style}; theme: {}", article.headline),
            },
            ImageSlot {
                key_prefix: "mid_image",
                prompt: format!(
                    "{style}; theme: {}",
                    if mid_topic.is_empty() { article.headline.clone() } else { mid_topic }
                ),
            },
            ImageSlot {
                key_prefix: "bottom_image",
                prompt: format!(
                    "{style}; theme: {}",
                    if bottom_topic.is_empty() { article.headline.clone() } else { bottom_topic }
                ),
            },
        ])
    }

    pub fn alt_text_from(title: &str) -> String {
        let alt = format!("Illustration: {title}");
        alt.chars().take(MAX_ALT_TEXT).collect()
    }

    async fn generate_one(&self, prompt: &str) -> String {
        let image_generator = self.deps.image_generator.clone();
        let breakers = self.deps.breakers.clone();

        let result = retry_with_backoff(&RetryPolicy::IMAGE_GENERATION, "generate_image", || {
            let image_generator = image_generator.clone();
            let breakers = breakers.clone();
            let prompt = prompt.to_string();
            async move {
                breakers
                    .image
                    .call(move || async move {
                        image_generator
                            .generate_image(&prompt)
                            .await
                            .map_err(StageError::from)
                    })
                    .await
            }
        })
        .await;

        match result {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Image generation failed, using placeholder");
                placeholder_image_url()
            }
        }
    }
}

#[async_trait]
impl ParallelStage for ImageStage {
    fn stage_num(&self) -> u8 {
        9
    }

    fn stage_name(&self) -> &'static str {
        "stage_09_image"
    }

    async fn execute(&self, view: &ContextView<'_>) -> Result<Scratch, StageError> {
        let slots = Self::slots(view)?;
        let alt = Self::alt_text_from(&view.article()?.headline);

        let (hero, mid, bottom) = tokio::join!(
            self.generate_one(&slots[0].prompt),
            self.generate_one(&slots[1].prompt),
            self.generate_one(&slots[2].prompt),
        );

        info!(job_id = %view.job_id(), "Images generated");

        let mut scratch = Scratch::new();
        for (slot, url) in slots.iter().zip([hero, mid, bottom]) {
            scratch.insert(format!("{}_url", slot.key_prefix), json!(url));
            scratch.insert(format!("{}_alt_text", slot.key_prefix), json!(alt));
        }
        Ok(scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_client::mock::sample_article_json;
    use ai_client::MockImageGenerator;
    use blogsmith_common::JobConfig;

    use crate::context::ExecutionContext;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new("j", JobConfig::default());
        ctx.structured_data =
            Some(serde_json::from_str(&sample_article_json("zero trust")).unwrap());
        ctx
    }

    #[tokio::test]
    async fn three_images_written_to_disjoint_keys() {
        let ctx = ctx();
        let view = ContextView::new(&ctx);
        let stage = ImageStage::new(Arc::new(crate::deps::PipelineDeps::mocked()));

        let scratch = stage.execute(&view).await.unwrap();
        for key in ["image_url", "mid_image_url", "bottom_image_url"] {
            assert!(scratch[key].as_str().unwrap().starts_with("https://"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fall_back_to_placeholder() {
        let deps = crate::deps::PipelineDeps::mocked()
            .with_image_generator(Arc::new(MockImageGenerator::new().failing_first(100)));
        let ctx = ctx();
        let view = ContextView::new(&ctx);
        let stage = ImageStage::new(Arc::new(deps));

        let scratch = stage.execute(&view).await.unwrap();
        assert!(scratch["image_url"].as_str().unwrap().contains("placeholder"));
    }

    #[test]
    fn alt_text_truncated_to_limit() {
        let long_title = "x".repeat(300);
        assert_eq!(ImageStage::alt_text_from(&long_title).chars().count(), 125);
    }

    #[test]
    fn graphics_mode_changes_prompt_style() {
        assert!(ImageStage::style(true).contains("infographic"));
        assert!(ImageStage::style(false).contains("photograph"));
    }
}
