//! Replacement lookup for citations whose URLs failed validation. Asks the
//! generator (with web search enabled) for a URL supporting the same claim,
//! filters out domains we must not cite, and can upgrade a domain-only URL
//! to a specific article from the grounding metadata.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use ai_client::{GenerateRequest, Generator};
use blogsmith_common::extract_domain;

use crate::citation::Citation;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s\)\]\}<>\x22']+").expect("url regex"))
}

pub struct AlternativeFinder<'a> {
    generator: &'a dyn Generator,
    /// The company's own domain; its URLs are filtered unless the original
    /// citation already pointed there and was valid.
    company_domain: String,
    competitor_domains: Vec<String>,
    forbidden_domains: Vec<String>,
}

impl<'a> AlternativeFinder<'a> {
    pub fn new(
        generator: &'a dyn Generator,
        company_url: &str,
        competitors: &[String],
        forbidden: &[String],
    ) -> Self {
        Self {
            generator,
            company_domain: extract_domain(company_url),
            competitor_domains: competitors.iter().map(|c| extract_domain(c)).collect(),
            forbidden_domains: forbidden.iter().map(|f| extract_domain(f)).collect(),
        }
    }

    /// Find a replacement URL supporting the same claim as the failed
    /// citation. Returns None when the generator produces nothing usable.
    pub async fn find_alternative(
        &self,
        citation: &Citation,
        original_was_valid: bool,
    ) -> Option<String> {
        let prompt = format!(
            "Find one authoritative, currently-live web page that supports this claim:\n\
             \"{title}\"\n\
             The previous source was {url} but it no longer resolves.\n\
             Reply with the single best replacement URL and nothing else.",
            title = citation.title,
            url = citation.url,
        );

        let request = GenerateRequest::new(prompt)
            .enable_tools(true)
            .timeout(Duration::from_secs(30));

        let response = match self.generator.generate(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(number = citation.number, error = %e, "Alternative lookup failed");
                return None;
            }
        };

        for candidate in url_re().find_iter(&response.text) {
            let url = candidate.as_str().trim_end_matches(['.', ',', ';', ')']);
            if self.is_allowed(url, original_was_valid) {
                info!(number = citation.number, replacement = %url, "Found alternative URL");
                return Some(url.to_string());
            }
            debug!(url = %url, "Alternative candidate filtered");
        }

        None
    }

    /// Upgrade a domain-only URL (`https://ibm.com`) to the deepest grounded
    /// URL on the same domain, when the generator visited one.
    pub fn enhance_from_grounding(
        url: &str,
        grounding_by_domain: &HashMap<String, String>,
    ) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        if parsed.path() != "/" && !parsed.path().is_empty() {
            return None;
        }
        let domain = extract_domain(url);
        grounding_by_domain
            .get(&domain)
            .filter(|grounded| grounded.as_str() != url)
            .cloned()
    }

    fn is_allowed(&self, url: &str, original_was_valid: bool) -> bool {
        let domain = extract_domain(url);
        if domain.is_empty() {
            return false;
        }
        if !original_was_valid && domain_matches(&domain, &self.company_domain) {
            return false;
        }
        if self.competitor_domains.iter().any(|c| domain_matches(&domain, c)) {
            return false;
        }
        if self.forbidden_domains.iter().any(|f| domain_matches(&domain, f)) {
            return false;
        }
        true
    }
}

fn domain_matches(candidate: &str, target: &str) -> bool {
    !target.is_empty() && (candidate == target || candidate.ends_with(&format!(".{target}")))
}
