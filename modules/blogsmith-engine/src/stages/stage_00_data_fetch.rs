//! Stage 0: input validation, company auto-detection, sitemap crawl, and
//! link-pool construction. Critical: no silent fallbacks for bad input,
//! but an unreachable sitemap degrades to empty defaults.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use blogsmith_common::SitemapData;
use blogsmith_crawler::PageLabel;

use crate::context::{ExecutionContext, LinkPool, LinkPoolSource};
use crate::deps::PipelineDeps;
use crate::runtime::classify::StageError;
use crate::runtime::runner::Stage;

const DEFAULT_INSTRUCTION: &str =
    "Write a comprehensive, well-researched article that answers the reader's \
     intent for the primary keyword, grounded in current sources.";

pub struct DataFetchStage {
    deps: Arc<PipelineDeps>,
}

impl DataFetchStage {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    fn validate_input(ctx: &ExecutionContext) -> Result<(), StageError> {
        let mut missing = Vec::new();
        if ctx.job_config.primary_keyword.trim().is_empty() {
            missing.push("primary_keyword");
        }
        if ctx.job_config.company_url.trim().is_empty() {
            missing.push("company_url");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StageError::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// `https://www.cyber-guard.tech` → "Cyber Guard".
    fn company_name_from_url(url: &str) -> String {
        let domain = blogsmith_common::extract_domain(url);
        let base = domain.split('.').next().unwrap_or(&domain);
        base.split('-')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Site type from label ratios over the crawled pages.
    fn analyze_site_structure(pages: &blogsmith_crawler::SitemapPageList) -> SitemapData {
        let summary = pages.label_summary();
        let total = pages.count().max(1);
        let count = |label: &str| summary.get(label).copied().unwrap_or(0);

        let content_heavy = (count("blog") + count("resource")) * 100 / total;
        let product_focus = count("product") * 100 / total;
        let service_focus = count("service") * 100 / total;

        let site_type = if content_heavy > 30 {
            "content_marketing"
        } else if product_focus > 40 {
            "product_focused"
        } else if service_focus > 30 {
            "service_focused"
        } else {
            "corporate"
        };

        let blog_count = count("blog");
        let content_volume = if blog_count > 20 {
            "high"
        } else if blog_count > 5 {
            "medium"
        } else {
            "low"
        };

        SitemapData {
            total_pages: pages.count(),
            blog_urls: pages
                .with_label(PageLabel::Blog)
                .into_iter()
                .map(|p| p.url.clone())
                .collect(),
            label_summary: summary,
            site_type: site_type.to_string(),
            has_blog: blog_count > 0,
            content_volume: content_volume.to_string(),
        }
    }

    /// Internal-link candidate pool. Crawled blog URLs outrank explicitly
    /// provided sitemap URLs; batch siblings ride along with the latter.
    fn build_link_pool(ctx: &ExecutionContext, sitemap: &SitemapData) -> LinkPool {
        if !sitemap.blog_urls.is_empty() {
            return LinkPool {
                source: LinkPoolSource::CrawledBlog,
                urls: sitemap.blog_urls.clone(),
            };
        }

        let mut urls: Vec<String> = ctx
            .job_config
            .sitemap_urls
            .clone()
            .unwrap_or_default();
        if let Some(siblings) = &ctx.job_config.batch_siblings {
            urls.extend(siblings.iter().filter_map(|s| s.url.clone()));
        }

        if urls.is_empty() {
            LinkPool::empty()
        } else {
            LinkPool {
                source: LinkPoolSource::ProvidedSitemap,
                urls,
            }
        }
    }
}

#[async_trait]
impl Stage for DataFetchStage {
    fn stage_num(&self) -> u8 {
        0
    }

    fn stage_name(&self) -> &'static str {
        "stage_00_data_fetch"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), StageError> {
        Self::validate_input(ctx)?;

        // Keyword cannibalization check against stored fingerprints. The
        // caller may still want the article (refresh, intentional overlap),
        // so this warns rather than fails.
        let (cannibalized, slugs) = self
            .deps
            .similarity
            .check_keyword(&ctx.job_config.primary_keyword);
        if cannibalized {
            warn!(
                job_id = %ctx.job_id,
                keyword = %ctx.job_config.primary_keyword,
                existing = ?slugs,
                "Keyword already targeted by stored content"
            );
        }

        let company_url = ctx.job_config.company_url.trim_end_matches('/').to_string();
        ctx.job_config.company_url = company_url.clone();

        // Auto-detect, then let explicit user data win.
        if ctx.company_data.company_url.is_none() {
            ctx.company_data.company_url = Some(company_url.clone());
        }
        let auto_name = Self::company_name_from_url(&company_url);
        match (&ctx.job_config.company_name, &ctx.company_data.company_name) {
            (Some(name), _) => ctx.company_data.company_name = Some(name.clone()),
            (None, None) => ctx.company_data.company_name = Some(auto_name),
            (None, Some(_)) => {}
        }

        // Normalize competitor entries down to domains.
        ctx.company_data.company_competitors = ctx
            .company_data
            .company_competitors
            .iter()
            .map(|c| blogsmith_common::extract_domain(c))
            .filter(|c| !c.is_empty())
            .collect();

        let pages = self.deps.crawler.crawl(&company_url).await;
        if pages.count() == 0 {
            warn!(job_id = %ctx.job_id, "Sitemap crawl returned no pages, continuing with defaults");
        }
        let sitemap = Self::analyze_site_structure(&pages);
        info!(
            job_id = %ctx.job_id,
            pages = sitemap.total_pages,
            site_type = %sitemap.site_type,
            blog_urls = sitemap.blog_urls.len(),
            "Site structure analyzed"
        );

        ctx.link_pool = Self::build_link_pool(ctx, &sitemap);
        ctx.sitemap_data = Some(sitemap);

        if ctx.job_config.content_generation_instruction.is_none() {
            ctx.job_config.content_generation_instruction = Some(DEFAULT_INSTRUCTION.to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogsmith_common::JobConfig;
    use blogsmith_crawler::{SitemapPage, SitemapPageList};

    fn pages(labels: &[(&str, PageLabel)]) -> SitemapPageList {
        SitemapPageList {
            pages: labels
                .iter()
                .enumerate()
                .map(|(i, (path, label))| SitemapPage {
                    url: format!("https://x.com{path}/{i}"),
                    path: path.to_string(),
                    label: *label,
                    title: String::new(),
                    confidence: 0.4,
                })
                .collect(),
            company_url: "https://x.com".to_string(),
            total_urls: labels.len(),
            fetch_timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn missing_fields_listed_in_validation_error() {
        let ctx = ExecutionContext::new("j", JobConfig::default());
        let err = DataFetchStage::validate_input(&ctx).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("primary_keyword"));
        assert!(message.contains("company_url"));
    }

    #[test]
    fn company_name_derived_from_domain() {
        assert_eq!(
            DataFetchStage::company_name_from_url("https://www.cyber-guard.tech/about"),
            "Cyber Guard"
        );
        assert_eq!(
            DataFetchStage::company_name_from_url("https://acme.com"),
            "Acme"
        );
    }

    #[test]
    fn content_heavy_sites_detected() {
        let list = pages(&[
            ("/blog", PageLabel::Blog),
            ("/blog", PageLabel::Blog),
            ("/pricing", PageLabel::Product),
        ]);
        let data = DataFetchStage::analyze_site_structure(&list);
        assert_eq!(data.site_type, "content_marketing");
        assert!(data.has_blog);
        assert_eq!(data.blog_urls.len(), 2);
    }

    #[test]
    fn corporate_fallback_when_no_focus_dominates() {
        let list = pages(&[
            ("/about", PageLabel::Company),
            ("/contact", PageLabel::Contact),
            ("/team", PageLabel::Company),
            ("/legal", PageLabel::Legal),
        ]);
        let data = DataFetchStage::analyze_site_structure(&list);
        assert_eq!(data.site_type, "corporate");
        assert_eq!(data.content_volume, "low");
    }

    #[test]
    fn crawled_blog_urls_outrank_provided_sitemap_urls() {
        let mut config = JobConfig::default();
        config.sitemap_urls = Some(vec!["https://x.com/magazine/provided".to_string()]);
        let ctx = ExecutionContext::new("j", config);

        let sitemap = SitemapData {
            blog_urls: vec!["https://x.com/blog/crawled".to_string()],
            ..SitemapData::default()
        };
        let pool = DataFetchStage::build_link_pool(&ctx, &sitemap);
        assert_eq!(pool.source, LinkPoolSource::CrawledBlog);
        assert_eq!(pool.urls, vec!["https://x.com/blog/crawled"]);
    }

    #[test]
    fn provided_urls_and_siblings_used_when_no_crawl_results() {
        let mut config = JobConfig::default();
        config.sitemap_urls = Some(vec!["https://x.com/magazine/provided".to_string()]);
        config.batch_siblings = Some(vec![blogsmith_common::types::BatchSibling {
            keyword: "sibling".to_string(),
            url: Some("https://x.com/magazine/sibling".to_string()),
            ..Default::default()
        }]);
        let ctx = ExecutionContext::new("j", config);

        let pool = DataFetchStage::build_link_pool(&ctx, &SitemapData::default());
        assert_eq!(pool.source, LinkPoolSource::ProvidedSitemap);
        assert_eq!(pool.urls.len(), 2);
    }
}
