//! Stage 1: prompt assembly. Pure transformation of the normalized config,
//! company profile, and sitemap analysis into the generator prompt. No I/O.

use async_trait::async_trait;
use tracing::debug;

use crate::context::{ExecutionContext, LinkPoolSource};
use crate::runtime::classify::StageError;
use crate::runtime::runner::Stage;

pub struct PromptBuildStage;

impl PromptBuildStage {
    pub fn new() -> Self {
        Self
    }

    fn build_prompt(ctx: &ExecutionContext) -> String {
        let config = &ctx.job_config;
        let company = &ctx.company_data;
        let mut prompt = String::with_capacity(2048);

        prompt.push_str(&format!("Primary keyword: {}\n", config.primary_keyword));
        prompt.push_str(&format!("Language: {}\n", config.language()));
        prompt.push_str(&format!("Country: {}\n", config.country()));
        prompt.push_str(&format!("Target length: {} words\n\n", config.word_count()));

        prompt.push_str("# Company context\n");
        if let Some(name) = &company.company_name {
            prompt.push_str(&format!("Company: {name}\n"));
        }
        if let Some(url) = &company.company_url {
            prompt.push_str(&format!("Website: {url}\n"));
        }
        if let Some(description) = &company.company_description {
            prompt.push_str(&format!("About: {description}\n"));
        }
        if !company.company_competitors.is_empty() {
            prompt.push_str(&format!(
                "Competitors (never cite or link): {}\n",
                company.company_competitors.join(", ")
            ));
        }

        if let Some(sitemap) = &ctx.sitemap_data {
            prompt.push_str(&format!(
                "Site profile: {} ({} pages, {} content volume)\n",
                sitemap.site_type, sitemap.total_pages, sitemap.content_volume
            ));
        }

        if ctx.link_pool.source != LinkPoolSource::None {
            prompt.push_str("\n# Internal link candidates\n");
            for url in ctx.link_pool.urls.iter().take(15) {
                prompt.push_str(&format!("- {url}\n"));
            }
        }

        if let Some(tone) = &config.tone {
            prompt.push_str(&format!("\nTone: {tone}\n"));
        }
        if let Some(instruction) = &config.content_generation_instruction {
            prompt.push_str(&format!("\n# Instructions\n{instruction}\n"));
        }
        if let Some(extra) = &config.system_prompts {
            for line in extra {
                prompt.push_str(&format!("{line}\n"));
            }
        }

        prompt
    }
}

#[async_trait]
impl Stage for PromptBuildStage {
    fn stage_num(&self) -> u8 {
        1
    }

    fn stage_name(&self) -> &'static str {
        "stage_01_prompt"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), StageError> {
        let prompt = Self::build_prompt(ctx);
        debug!(job_id = %ctx.job_id, chars = prompt.len(), "Prompt built");
        ctx.prompt = Some(prompt);
        Ok(())
    }
}
