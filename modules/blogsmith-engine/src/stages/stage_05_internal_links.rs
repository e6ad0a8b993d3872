//! Stage 5: internal-link suggestions. Scores candidate URLs from batch
//! siblings, provided sitemap URLs (crawling any `.xml` entries), and the
//! crawler's blog pool against the article's topics, HEAD-validates the
//! survivors, dedupes by domain, and caps the set at ten.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use blogsmith_citations::UrlValidator;
use blogsmith_common::{extract_domain, slugify, InternalLink};

use crate::context::{ContextView, Scratch};
use crate::deps::PipelineDeps;
use crate::runtime::classify::StageError;
use crate::runtime::fallback::heuristic_internal_links;
use crate::runtime::runner::ParallelStage;

const MAX_LINKS: usize = 10;
const SIBLING_BOOST: u8 = 2;

pub struct InternalLinksStage {
    deps: Arc<PipelineDeps>,
    validator: UrlValidator,
}

impl InternalLinksStage {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self {
            deps,
            validator: UrlValidator::with_defaults(),
        }
    }

    /// Topics from headline and section titles, lowercased.
    fn extract_topics(view: &ContextView<'_>) -> Result<Vec<String>, StageError> {
        let article = view.article()?;
        let mut topics = vec![article.headline.to_lowercase()];
        topics.extend(
            article
                .all_sections()
                .iter()
                .map(|(_, title, _)| title.to_lowercase()),
        );
        Ok(topics)
    }

    /// Word-overlap relevance in 1..10.
    fn relevance(text: &str, topics: &[String]) -> u8 {
        let text_lower = text.to_lowercase();
        let text_words: HashSet<&str> = text_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
            .collect();

        let mut score = 1u8;
        for topic in topics {
            let overlap = topic
                .split_whitespace()
                .filter(|w| w.len() > 3 && text_words.contains(w))
                .count();
            score = score.saturating_add(overlap as u8 * 2);
        }
        score.min(10)
    }

    /// Title from the final slug, mirroring the crawler's derivation.
    fn title_from_url(url: &str) -> String {
        blogsmith_crawler::classify::title_from_url(
            url::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_default().as_str(),
        )
    }

    /// Rewrite an internal candidate onto the canonical `/magazine/<slug>` path.
    fn normalize_internal_url(url: &str, company_base: &str) -> String {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        let slug = path
            .trim_end_matches('/')
            .rsplit('/')
            .find(|part| !part.is_empty() && !part.contains('.'))
            .map(slugify)
            .unwrap_or_default();
        if slug.is_empty() {
            company_base.trim_end_matches('/').to_string()
        } else {
            format!("{}/magazine/{slug}", company_base.trim_end_matches('/'))
        }
    }

    async fn gather_candidates(&self, view: &ContextView<'_>, topics: &[String]) -> Vec<InternalLink> {
        let mut candidates: Vec<InternalLink> = Vec::new();

        // (a) Batch siblings, boosted: same campaign, guaranteed relevant.
        if let Some(siblings) = &view.job_config().batch_siblings {
            for sibling in siblings {
                let Some(url) = sibling.url.clone().or_else(|| {
                    sibling.slug.as_ref().map(|slug| {
                        format!(
                            "{}/magazine/{slug}",
                            view.job_config().company_url.trim_end_matches('/')
                        )
                    })
                }) else {
                    continue;
                };
                let title = sibling
                    .headline
                    .clone()
                    .unwrap_or_else(|| sibling.keyword.clone());
                let relevance = Self::relevance(&title, topics).saturating_add(SIBLING_BOOST).min(10);
                candidates.push(InternalLink {
                    domain: extract_domain(&url),
                    url,
                    title,
                    relevance,
                });
            }
        }

        // (b) Provided sitemap URLs; `.xml` entries are crawled as sitemaps.
        if let Some(sitemap_urls) = &view.job_config().sitemap_urls {
            for entry in sitemap_urls {
                if entry.ends_with(".xml") {
                    let base = entry
                        .rsplit_once('/')
                        .map(|(base, _)| base.to_string())
                        .unwrap_or_else(|| entry.clone());
                    let pages = self.deps.crawler.crawl(&base).await;
                    debug!(sitemap = %entry, urls = pages.count(), "Crawled provided sitemap index");
                    for page in &pages.pages {
                        candidates.push(InternalLink {
                            url: page.url.clone(),
                            title: page.title.clone(),
                            relevance: Self::relevance(&page.title, topics),
                            domain: extract_domain(&page.url),
                        });
                    }
                } else {
                    let title = Self::title_from_url(entry);
                    candidates.push(InternalLink {
                        url: entry.clone(),
                        relevance: Self::relevance(&title, topics),
                        title,
                        domain: extract_domain(entry),
                    });
                }
            }
        }

        // (c) Crawled blog pool.
        for url in &view.link_pool().urls {
            let title = Self::title_from_url(url);
            candidates.push(InternalLink {
                url: url.clone(),
                relevance: Self::relevance(&title, topics),
                title,
                domain: extract_domain(url),
            });
        }

        candidates
    }
}

#[async_trait]
impl ParallelStage for InternalLinksStage {
    fn stage_num(&self) -> u8 {
        5
    }

    fn stage_name(&self) -> &'static str {
        "stage_05_internal_links"
    }

    async fn execute(&self, view: &ContextView<'_>) -> Result<Scratch, StageError> {
        let topics = Self::extract_topics(view)?;
        let company_base = view.job_config().company_url.clone();

        let mut candidates = self.gather_candidates(view, &topics).await;
        if candidates.is_empty() {
            info!(job_id = %view.job_id(), "No internal-link candidates, using heuristic links");
            candidates = heuristic_internal_links(&topics, &company_base);
        }

        // Dedupe by URL before paying for probes.
        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert(c.url.clone()));

        // HEAD-validate; unreachable candidates are dropped.
        let urls: Vec<String> = candidates.iter().map(|c| c.url.clone()).collect();
        let outcomes = self.validator.probe_all(&urls).await;
        let mut validated: Vec<InternalLink> = candidates
            .into_iter()
            .zip(outcomes)
            .filter_map(|(candidate, outcome)| {
                if outcome.ok {
                    Some(candidate)
                } else {
                    warn!(url = %candidate.url, "Internal-link candidate failed validation");
                    None
                }
            })
            .collect();

        // One link per domain, best relevance first, capped.
        validated.sort_by(|a, b| b.relevance.cmp(&a.relevance));
        let mut domains = HashSet::new();
        validated.retain(|link| domains.insert(link.domain.clone()));
        validated.truncate(MAX_LINKS);

        // Canonical internal form for links on the company's own domain.
        let company_domain = extract_domain(&company_base);
        for link in &mut validated {
            if link.domain == company_domain && !link.url.contains("/magazine/") {
                link.url = Self::normalize_internal_url(&link.url, &company_base);
            }
        }

        info!(job_id = %view.job_id(), links = validated.len(), "Internal links selected");

        let mut scratch = Scratch::new();
        scratch.insert("internal_links".to_string(), json!(validated));
        scratch.insert("internal_links_count".to_string(), json!(validated.len()));
        Ok(scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_rises_with_topic_overlap() {
        let topics = vec!["zero trust security architecture".to_string()];
        let high = InternalLinksStage::relevance("Zero Trust Security Rollout Guide", &topics);
        let low = InternalLinksStage::relevance("Quarterly Earnings Report", &topics);
        assert!(high > low);
        assert!(low >= 1);
        assert!(high <= 10);
    }

    #[test]
    fn internal_urls_normalized_to_magazine_path() {
        let normalized = InternalLinksStage::normalize_internal_url(
            "https://x.com/blog/zero-trust-basics/",
            "https://x.com",
        );
        assert_eq!(normalized, "https://x.com/magazine/zero-trust-basics");
    }

    #[test]
    fn normalize_skips_file_like_segments() {
        let normalized =
            InternalLinksStage::normalize_internal_url("https://x.com/assets/page.html", "https://x.com");
        assert_eq!(normalized, "https://x.com/magazine/assets");
    }
}
