use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration for a single generation job, as submitted by clients and
/// persisted on the job row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    // Required
    pub primary_keyword: String,
    pub company_url: String,

    // Content options
    pub language: Option<String>,
    pub country: Option<String>,
    pub company_name: Option<String>,
    pub company_data: Option<CompanyData>,
    pub sitemap_urls: Option<Vec<String>>,
    pub existing_blog_slugs: Option<Vec<Value>>,
    pub batch_siblings: Option<Vec<BatchSibling>>,
    pub batch_id: Option<String>,
    pub content_generation_instruction: Option<String>,
    pub word_count: Option<u32>,
    pub tone: Option<String>,
    pub system_prompts: Option<Vec<String>>,
    pub review_prompts: Option<Vec<String>>,
    pub slug: Option<String>,
    pub use_graphics: Option<bool>,
    pub index: Option<bool>,

    // Async-specific
    pub callback_url: Option<String>,
    pub max_duration_minutes: Option<u32>,
    pub priority: Option<u8>,
    pub client_info: Option<Value>,
}

impl JobConfig {
    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }

    pub fn country(&self) -> &str {
        self.country.as_deref().unwrap_or("US")
    }

    pub fn word_count(&self) -> u32 {
        self.word_count.unwrap_or(1500)
    }

    pub fn priority(&self) -> u8 {
        self.priority.unwrap_or(1).clamp(1, 3)
    }

    pub fn max_duration_minutes(&self) -> u32 {
        self.max_duration_minutes.unwrap_or(30)
    }
}

/// A sibling article generated in the same batch, used as an internal-link
/// candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSibling {
    pub keyword: String,
    pub slug: Option<String>,
    pub url: Option<String>,
    pub headline: Option<String>,
}

/// Company attributes; author fields feed E-E-A-T scoring downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyData {
    pub company_url: Option<String>,
    pub company_name: Option<String>,
    pub company_description: Option<String>,
    pub company_competitors: Vec<String>,
    pub author_name: Option<String>,
    pub author_bio: Option<String>,
    pub author_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Sitemap analysis produced once by stage 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SitemapData {
    pub total_pages: usize,
    pub blog_urls: Vec<String>,
    pub label_summary: BTreeMap<String, usize>,
    /// One of content_marketing, product_focused, service_focused, corporate.
    pub site_type: String,
    pub has_blog: bool,
    /// One of high, medium, low.
    pub content_volume: String,
}

/// A source URL the generator reports having consulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroundingUrl {
    pub url: String,
    pub title: String,
    pub domain: String,
}

/// An internal-link suggestion; uniqueness key is the url.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalLink {
    pub url: String,
    pub title: String,
    /// 1..10, higher is more relevant.
    pub relevance: u8,
    pub domain: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityMetrics {
    pub word_count: usize,
    pub read_time_minutes: u32,
    pub citation_count: usize,
    pub internal_link_count: usize,
    pub faq_count: usize,
    pub paa_count: usize,
    pub aeo_score: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityReport {
    pub metrics: QualityMetrics,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub passed: bool,
}

/// Flat description of what stage 12 persisted and where.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageResult {
    pub success: bool,
    pub storage_type: String,
    pub article_id: Option<String>,
    pub article_url: Option<String>,
    pub doc_id: Option<String>,
    pub embedding_stored: bool,
    pub error: Option<String>,
}
