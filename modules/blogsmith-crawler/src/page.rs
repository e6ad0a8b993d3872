use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auto-detected page type for a sitemap URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageLabel {
    Blog,
    Product,
    Service,
    Docs,
    Resource,
    Company,
    Legal,
    Contact,
    Landing,
    Other,
}

impl PageLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageLabel::Blog => "blog",
            PageLabel::Product => "product",
            PageLabel::Service => "service",
            PageLabel::Docs => "docs",
            PageLabel::Resource => "resource",
            PageLabel::Company => "company",
            PageLabel::Legal => "legal",
            PageLabel::Contact => "contact",
            PageLabel::Landing => "landing",
            PageLabel::Other => "other",
        }
    }
}

impl std::fmt::Display for PageLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single classified sitemap URL. Equality and hashing are by url.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapPage {
    pub url: String,
    pub path: String,
    pub label: PageLabel,
    pub title: String,
    /// 0.0..=1.0 confidence in the label.
    pub confidence: f64,
}

impl PartialEq for SitemapPage {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for SitemapPage {}

impl Hash for SitemapPage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Classified pages for one company, with crawl provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapPageList {
    pub pages: Vec<SitemapPage>,
    pub company_url: String,
    pub total_urls: usize,
    pub fetch_timestamp: DateTime<Utc>,
}

impl SitemapPageList {
    pub fn empty(company_url: &str) -> Self {
        Self {
            pages: Vec::new(),
            company_url: company_url.to_string(),
            total_urls: 0,
            fetch_timestamp: Utc::now(),
        }
    }

    pub fn count(&self) -> usize {
        self.pages.len()
    }

    /// Pages carrying the given label.
    pub fn with_label(&self, label: PageLabel) -> Vec<&SitemapPage> {
        self.pages.iter().filter(|p| p.label == label).collect()
    }

    /// Count of pages per label name.
    pub fn label_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for page in &self.pages {
            *summary.entry(page.label.as_str().to_string()).or_insert(0) += 1;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn page(url: &str, label: PageLabel) -> SitemapPage {
        SitemapPage {
            url: url.to_string(),
            path: url.to_string(),
            label,
            title: String::new(),
            confidence: 0.4,
        }
    }

    #[test]
    fn pages_dedupe_by_url_regardless_of_label() {
        let mut set = HashSet::new();
        set.insert(page("https://a.com/x", PageLabel::Blog));
        set.insert(page("https://a.com/x", PageLabel::Product));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn label_summary_counts_per_label() {
        let list = SitemapPageList {
            pages: vec![
                page("https://a.com/blog/1", PageLabel::Blog),
                page("https://a.com/blog/2", PageLabel::Blog),
                page("https://a.com/pricing", PageLabel::Product),
            ],
            company_url: "https://a.com".to_string(),
            total_urls: 3,
            fetch_timestamp: Utc::now(),
        };
        let summary = list.label_summary();
        assert_eq!(summary.get("blog"), Some(&2));
        assert_eq!(summary.get("product"), Some(&1));
    }
}
