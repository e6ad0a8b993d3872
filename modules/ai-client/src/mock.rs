//! Mock collaborators, used both by tests and as the degraded mode when
//! credentials are absent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use blogsmith_common::GroundingUrl;

use crate::traits::{
    AiClientError, Embedder, GenerateRequest, GenerateResponse, Generator, ImageGenerator,
};

/// A complete, schema-valid article for the given keyword.
pub fn sample_article_json(keyword: &str) -> String {
    let title_cased = keyword
        .split_whitespace()
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    json!({
        "Headline": format!("{title_cased}: A Practical Guide"),
        "Subtitle": format!("What {keyword} means for your organization"),
        "Teaser": format!("Everything you need to know about {keyword}, backed by current research."),
        "Direct_Answer": format!("{title_cased} is an approach that organizations adopt to improve outcomes. Research shows adoption grew 40% year over year [1]."),
        "Intro": format!("<p>Understanding {keyword} has become essential [1]. This guide covers the fundamentals, the trade-offs, and how to get started [2].</p>"),
        "Meta_Title": format!("{title_cased} Guide"),
        "Meta_Description": format!("A practical guide to {keyword}: fundamentals, trade-offs, and first steps."),
        "section_01_title": format!("What Is {title_cased}?"),
        "section_01_content": format!("<p>{title_cased} describes a set of practices with measurable, widely documented benefits for teams of every size [1]. Organizations that adopt it report faster delivery, fewer incidents, and clearer ownership within the first quarter [2].</p>"),
        "section_02_title": "How Does Adoption Work?",
        "section_02_content": "<p>Adoption follows three phases. Each phase builds on the last [2]. Early wins matter most [1].</p><ul><li>Assess</li><li>Pilot</li><li>Scale</li></ul>",
        "section_03_title": "Which Risks Should You Plan For?",
        "section_03_content": "<p>Risk planning starts with an inventory [1]. Most failures trace to skipped fundamentals [2].</p>",
        "key_takeaway_01": format!("{title_cased} adoption is growing fast."),
        "key_takeaway_02": "Phased rollouts outperform big-bang launches.",
        "key_takeaway_03": "Measure before and after adoption.",
        "faq_01_question": format!("What is {keyword}?"),
        "faq_01_answer": "A set of practices with measurable benefits.",
        "faq_02_question": "How long does adoption take?",
        "faq_02_answer": "Most teams see results within one quarter.",
        "faq_03_question": "What does it cost?",
        "faq_03_answer": "Costs vary with scope; pilots are cheap.",
        "paa_01_question": format!("Is {keyword} worth it?"),
        "paa_01_answer": "For most organizations, yes.",
        "paa_02_question": "Where should I start?",
        "paa_02_answer": "Start with an assessment of current practice.",
        "Sources": "[1]: https://example.org/research/adoption-report – Adoption Report 2025\n[2]: https://example.com/guides/rollout – Rollout Field Guide",
        "Search_Queries": format!("{keyword} adoption statistics"),
        "TLDR": format!("{title_cased} works; adopt it in phases."),
        "tables": [],
    })
    .to_string()
}

/// Scripted generator: pops queued responses, else derives a schema-valid
/// article from the prompt. Failures can be injected up front.
pub struct MockGenerator {
    queued: Mutex<VecDeque<String>>,
    fail_first: AtomicUsize,
    calls: AtomicUsize,
    grounding: Vec<GroundingUrl>,
    delay: Option<std::time::Duration>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fail_first: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            grounding: vec![
                GroundingUrl {
                    url: "https://example.org/research/adoption-report".to_string(),
                    title: "Adoption Report 2025".to_string(),
                    domain: "example.org".to_string(),
                },
                GroundingUrl {
                    url: "https://example.com/guides/rollout".to_string(),
                    title: "Rollout Field Guide".to_string(),
                    domain: "example.com".to_string(),
                },
            ],
            delay: None,
        }
    }

    /// Sleep before answering, to simulate slow generation.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a fixed response; queued responses win over the derived article.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.queued.lock().unwrap().push_back(text.into());
        self
    }

    /// Fail the first `n` calls with a rate-limit error.
    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_grounding(mut self, urls: Vec<GroundingUrl>) -> Self {
        self.grounding = urls;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn keyword_from_prompt(prompt: &str) -> String {
        prompt
            .lines()
            .find_map(|line| line.strip_prefix("Primary keyword: "))
            .unwrap_or("the topic")
            .to_string()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, AiClientError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first.load(Ordering::SeqCst) {
            return Err(AiClientError::RateLimited("mock rate limit".to_string()));
        }

        let text = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| sample_article_json(&Self::keyword_from_prompt(&request.prompt)));

        Ok(GenerateResponse {
            text,
            grounding_urls: self.grounding.clone(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Placeholder image generator for tests and keyless startup.
pub struct MockImageGenerator {
    pub fail_first: AtomicUsize,
    calls: AtomicUsize,
}

impl Default for MockImageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageGenerator {
    pub fn new() -> Self {
        Self {
            fail_first: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<String, AiClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first.load(Ordering::SeqCst) {
            return Err(AiClientError::Service {
                status: 503,
                message: "mock image outage".to_string(),
            });
        }
        let slug: String = prompt
            .chars()
            .take(24)
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        Ok(format!("https://images.example.com/generated/{slug}.png"))
    }

    fn name(&self) -> &str {
        "mock-image"
    }
}

/// Deterministic embedder: a fixed-dimension vector derived from bytes.
pub struct MockEmbedder;

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiClientError> {
        let mut v = vec![0.0f32; 16];
        for (i, b) in text.bytes().enumerate() {
            v[i % 16] += (b as f32) / 255.0;
        }
        Ok(v)
    }
}
