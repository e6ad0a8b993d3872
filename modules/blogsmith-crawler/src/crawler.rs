//! Sitemap crawler: fetches a company's sitemap from the standard locations,
//! walks `<sitemapindex>` children concurrently, classifies every URL, and
//! caches the result in a TTL'd LRU keyed by `(company_url, max_urls)`.
//!
//! The crawler never throws into callers: every failure path returns an empty
//! `SitemapPageList`.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use futures::future::join_all;
use lru::LruCache;
use quick_xml::events::Event;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::classify::classify_page;
use crate::page::SitemapPageList;

const SITEMAP_CANDIDATES: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap/sitemap.xml"];
const DANGEROUS_SCHEMES: &[&str] = &[
    "javascript:", "file:", "data:", "vbscript:", "about:", "chrome:", "chrome-extension:",
];
const CANDIDATE_DELAY: Duration = Duration::from_millis(500);
const SUB_SITEMAP_DELAY: Duration = Duration::from_millis(200);
const TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504];
const SKIP_STATUSES: &[u16] = &[404, 403, 401];

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub cache_ttl: Duration,
    pub max_urls: usize,
    pub max_cache_size: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(3600),
            max_urls: 10_000,
            max_cache_size: 100,
        }
    }
}

type CacheKey = (String, usize);

pub struct SitemapCrawler {
    config: CrawlerConfig,
    cache: Mutex<LruCache<CacheKey, (SitemapPageList, Instant)>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl SitemapCrawler {
    /// Build a crawler. Fails fast on a zero `max_urls` or cache size.
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        if config.max_urls == 0 {
            bail!("max_urls must be > 0");
        }
        let capacity = match NonZeroUsize::new(config.max_cache_size) {
            Some(c) => c,
            None => bail!("max_cache_size must be > 0"),
        };
        Ok(Self {
            config,
            cache: Mutex::new(LruCache::new(capacity)),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(CrawlerConfig::default()).expect("default crawler config is valid")
    }

    /// Crawl the company's sitemap and return labeled pages. Never errors;
    /// any failure yields an empty list.
    pub async fn crawl(&self, company_url: &str) -> SitemapPageList {
        let started = Instant::now();
        let company_url = company_url.trim_end_matches('/').to_string();

        info!(url = %company_url, "Starting sitemap crawl");

        if !is_valid_url(&company_url) {
            warn!(url = %company_url, "Invalid company URL");
            return SitemapPageList::empty(&company_url);
        }

        let cache_key = (company_url.clone(), self.config.max_urls);
        {
            let mut cache = self.cache.lock().await;
            if let Some((list, stored_at)) = cache.get(&cache_key) {
                if stored_at.elapsed() < self.config.cache_ttl {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    info!(
                        url = %company_url,
                        pages = list.count(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Sitemap crawl complete (cached)"
                    );
                    return list.clone();
                }
                cache.pop(&cache_key);
            }
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let urls = match self.fetch_all_urls(&company_url).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(url = %company_url, error = %e, "Sitemap fetch failed");
                return SitemapPageList::empty(&company_url);
            }
        };

        if urls.is_empty() {
            warn!(url = %company_url, "No URLs found in sitemap");
            return SitemapPageList::empty(&company_url);
        }

        let mut urls = urls;
        if urls.len() > self.config.max_urls {
            warn!(
                found = urls.len(),
                limit = self.config.max_urls,
                "Sitemap over URL limit, truncating"
            );
            urls.truncate(self.config.max_urls);
        }

        let mut invalid = 0usize;
        let total = urls.len();
        let pages = urls
            .iter()
            .filter(|u| {
                let ok = is_valid_url(u);
                if !ok {
                    invalid += 1;
                    debug!(url = %u, "Invalid URL skipped");
                }
                ok
            })
            .map(|u| classify_page(u))
            .collect();

        if invalid > 0 {
            warn!(skipped = invalid, "Skipped invalid sitemap URLs");
        }

        let list = SitemapPageList {
            pages,
            company_url: company_url.clone(),
            total_urls: total,
            fetch_timestamp: chrono::Utc::now(),
        };

        let cache_size = {
            let mut cache = self.cache.lock().await;
            cache.put(cache_key, (list.clone(), Instant::now()));
            cache.len()
        };

        info!(
            url = %company_url,
            pages = list.count(),
            cache_hits = self.cache_hits.load(Ordering::Relaxed),
            cache_misses = self.cache_misses.load(Ordering::Relaxed),
            cache_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sitemap crawl complete"
        );
        list
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        (
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
        )
    }

    async fn fetch_all_urls(&self, company_url: &str) -> Result<Vec<String>> {
        let mut candidates: Vec<String> = SITEMAP_CANDIDATES
            .iter()
            .map(|path| format!("{company_url}{path}"))
            .collect();

        // Mirror under www. when the host lacks the prefix, same scheme.
        if let Ok(parsed) = Url::parse(company_url) {
            if let Some(host) = parsed.host_str() {
                if !host.starts_with("www.") {
                    let base = format!("{}://www.{}", parsed.scheme(), host);
                    candidates.extend(SITEMAP_CANDIDATES.iter().map(|path| format!("{base}{path}")));
                }
            }
        }

        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .pool_idle_timeout(self.config.pool_idle_timeout)
            .pool_max_idle_per_host(2)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        let mut all_urls: Vec<String> = Vec::new();

        for candidate in &candidates {
            // Polite pacing between candidate locations.
            tokio::time::sleep(CANDIDATE_DELAY).await;

            let body = match self.fetch_with_retry(&client, candidate).await {
                Ok(Some(body)) => body,
                Ok(None) => continue,
                Err(e) => {
                    debug!(url = %candidate, error = %e, "Candidate fetch failed");
                    continue;
                }
            };

            let doc = match parse_sitemap(&body) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(url = %candidate, error = %e, "Failed to parse sitemap XML");
                    continue;
                }
            };

            if !doc.sitemap_locs.is_empty() {
                info!(
                    url = %candidate,
                    children = doc.sitemap_locs.len(),
                    "Found sitemap index, fetching children concurrently"
                );
                let fetches = doc
                    .sitemap_locs
                    .iter()
                    .map(|sub| self.fetch_sub_sitemap(&client, sub));
                for urls in join_all(fetches).await {
                    all_urls.extend(urls);
                }
                if !all_urls.is_empty() {
                    break;
                }
            } else if !doc.url_locs.is_empty() {
                info!(url = %candidate, urls = doc.url_locs.len(), "Fetched sitemap");
                all_urls.extend(doc.url_locs);
                break;
            }
        }

        // Deduplicate preserving first-seen order.
        let mut seen = HashSet::new();
        all_urls.retain(|u| seen.insert(u.clone()));
        Ok(all_urls)
    }

    /// GET a sitemap candidate. `Ok(None)` means skip this location
    /// (missing or permanently denied); transient statuses are retried with
    /// exponential backoff before giving up.
    async fn fetch_with_retry(
        &self,
        client: &reqwest::Client,
        url: &str,
    ) -> Result<Option<String>> {
        let mut delay = Duration::from_secs(2);
        let max_delay = Duration::from_secs(8);

        for attempt in 1..=3 {
            match client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        return Ok(Some(response.text().await?));
                    }
                    if SKIP_STATUSES.contains(&status) {
                        debug!(url = %url, status, "Sitemap not found, skipping");
                        return Ok(None);
                    }
                    if TRANSIENT_STATUSES.contains(&status) && attempt < 3 {
                        warn!(url = %url, status, attempt, "Transient sitemap error, retrying");
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(max_delay);
                        continue;
                    }
                    debug!(url = %url, status, "Unexpected sitemap status, skipping");
                    return Ok(None);
                }
                Err(e) if e.is_timeout() && attempt < 3 => {
                    warn!(url = %url, attempt, "Sitemap fetch timeout, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    async fn fetch_sub_sitemap(&self, client: &reqwest::Client, url: &str) -> Vec<String> {
        tokio::time::sleep(SUB_SITEMAP_DELAY).await;

        let body = match self.fetch_with_retry(client, url).await {
            Ok(Some(body)) => body,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(url = %url, error = %e, "Sub-sitemap fetch failed");
                return Vec::new();
            }
        };

        match parse_sitemap(&body) {
            Ok(doc) => {
                debug!(url = %url, urls = doc.url_locs.len(), "Fetched sub-sitemap");
                doc.url_locs
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to parse sub-sitemap");
                Vec::new()
            }
        }
    }
}

/// Parsed sitemap document: either index children or URL leaves.
#[derive(Debug, Default)]
pub struct SitemapDoc {
    pub sitemap_locs: Vec<String>,
    pub url_locs: Vec<String>,
}

/// Event-driven sitemap parse. quick-xml performs no DTD or external-entity
/// expansion, so hostile XML cannot reach the network or filesystem.
pub fn parse_sitemap(content: &str) -> Result<SitemapDoc> {
    let mut reader = quick_xml::Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut doc = SitemapDoc::default();
    let mut in_sitemap_entry = false;
    let mut in_url_entry = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sitemap" => in_sitemap_entry = true,
                b"url" => in_url_entry = true,
                b"loc" => in_loc = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"sitemap" => in_sitemap_entry = false,
                b"url" => in_url_entry = false,
                b"loc" => in_loc = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc => {
                let text = e.unescape()?.trim().to_string();
                if text.is_empty() {
                    // skip blank loc entries
                } else if in_sitemap_entry {
                    doc.sitemap_locs.push(text);
                } else if in_url_entry {
                    doc.url_locs.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("XML parse error at {}: {e}", reader.buffer_position()),
            _ => {}
        }
        buf.clear();
    }

    Ok(doc)
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Scheme must be http/https, host must contain a dot, dangerous schemes are
/// rejected outright.
pub fn is_valid_url(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    if DANGEROUS_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return false;
    }
    match Url::parse(url.trim()) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| h.contains('.'))
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageLabel;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/blog/first-post</loc></url>
  <url><loc>https://example.com/pricing</loc></url>
  <url><loc>javascript:alert(1)</loc></url>
</urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/sitemap-posts.xml</loc></sitemap>
  <sitemap><loc>https://example.com/sitemap-pages.xml</loc></sitemap>
</sitemapindex>"#;

    #[test]
    fn urlset_yields_leaves() {
        let doc = parse_sitemap(URLSET).unwrap();
        assert!(doc.sitemap_locs.is_empty());
        assert_eq!(doc.url_locs.len(), 3);
    }

    #[test]
    fn index_yields_children() {
        let doc = parse_sitemap(INDEX).unwrap();
        assert_eq!(doc.sitemap_locs.len(), 2);
        assert!(doc.url_locs.is_empty());
    }

    #[test]
    fn non_xml_content_yields_no_urls() {
        let doc = parse_sitemap("this is an HTML error page, not a sitemap").unwrap();
        assert!(doc.url_locs.is_empty());
        assert!(doc.sitemap_locs.is_empty());
    }

    #[test]
    fn dangerous_schemes_rejected() {
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("file:///etc/passwd"));
        assert!(!is_valid_url("data:text/html,<b>x</b>"));
        assert!(is_valid_url("https://example.com/page"));
    }

    #[test]
    fn hosts_without_dot_rejected() {
        assert!(!is_valid_url("http://localhost/x"));
        assert!(is_valid_url("http://a.io/x"));
    }

    #[test]
    fn crawler_constructor_validates_limits() {
        let mut config = CrawlerConfig::default();
        config.max_urls = 0;
        assert!(SitemapCrawler::new(config).is_err());

        let mut config = CrawlerConfig::default();
        config.max_cache_size = 0;
        assert!(SitemapCrawler::new(config).is_err());
    }

    #[tokio::test]
    async fn crawl_of_invalid_url_returns_empty_list() {
        let crawler = SitemapCrawler::with_defaults();
        let list = crawler.crawl("javascript:alert(1)").await;
        assert_eq!(list.count(), 0);
    }

    #[tokio::test]
    async fn cache_evicts_least_recently_used() {
        let mut config = CrawlerConfig::default();
        config.max_cache_size = 2;
        let crawler = SitemapCrawler::new(config).unwrap();

        // Seed the cache directly; the fetch path needs a live host.
        let mut cache = crawler.cache.lock().await;
        for n in 0..2 {
            let url = format!("https://site{n}.com");
            cache.put((url.clone(), 10_000), (SitemapPageList::empty(&url), Instant::now()));
        }
        // Touch site0 so site1 is the LRU entry.
        cache.get(&("https://site0.com".to_string(), 10_000));
        cache.put(
            ("https://site2.com".to_string(), 10_000),
            (SitemapPageList::empty("https://site2.com"), Instant::now()),
        );

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&("https://site1.com".to_string(), 10_000)).is_none());
        assert!(cache.peek(&("https://site0.com".to_string(), 10_000)).is_some());
    }

    #[test]
    fn classified_pages_from_urlset_carry_labels() {
        let doc = parse_sitemap(URLSET).unwrap();
        let pages: Vec<_> = doc
            .url_locs
            .iter()
            .filter(|u| is_valid_url(u))
            .map(|u| classify_page(u))
            .collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].label, PageLabel::Blog);
        assert_eq!(pages[1].label, PageLabel::Product);
    }
}
