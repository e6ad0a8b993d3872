//! Stage 6: table of contents. Pure transformation over the non-empty
//! section titles.

use async_trait::async_trait;
use serde_json::json;

use blogsmith_common::slugify;

use crate::context::{ContextView, Scratch};
use crate::runtime::classify::StageError;
use crate::runtime::runner::ParallelStage;

pub struct TocStage;

impl TocStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ParallelStage for TocStage {
    fn stage_num(&self) -> u8 {
        6
    }

    fn stage_name(&self) -> &'static str {
        "stage_06_toc"
    }

    async fn execute(&self, view: &ContextView<'_>) -> Result<Scratch, StageError> {
        let article = view.article()?;

        let items: Vec<serde_json::Value> = article
            .rendered_sections()
            .iter()
            .map(|(n, title, _)| {
                json!({
                    "id": n,
                    "title": title,
                    "anchor": slugify(title),
                })
            })
            .collect();

        let mut scratch = Scratch::new();
        scratch.insert("toc_count".to_string(), json!(items.len()));
        scratch.insert("toc_items".to_string(), json!(items));
        Ok(scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_client::mock::sample_article_json;
    use blogsmith_common::JobConfig;

    use crate::context::ExecutionContext;

    #[tokio::test]
    async fn toc_entries_carry_slugged_anchors() {
        let mut ctx = ExecutionContext::new("j", JobConfig::default());
        ctx.structured_data =
            Some(serde_json::from_str(&sample_article_json("zero trust")).unwrap());
        let view = ContextView::new(&ctx);

        let scratch = TocStage::new().execute(&view).await.unwrap();
        let items = scratch["toc_items"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["anchor"], "what-is-zero-trust");
        assert_eq!(items[0]["id"], 1);
    }

    #[tokio::test]
    async fn empty_article_yields_empty_toc() {
        let mut ctx = ExecutionContext::new("j", JobConfig::default());
        ctx.structured_data = Some(blogsmith_common::ArticleOutput::default());
        let view = ContextView::new(&ctx);

        let scratch = TocStage::new().execute(&view).await.unwrap();
        assert_eq!(scratch["toc_count"], 0);
    }
}
