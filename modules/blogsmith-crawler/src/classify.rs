//! Pattern-based page classification: each label owns a regex table over the
//! URL path; every match adds 0.4 to that label's score, `other` starts at a
//! 0.1 base, and the argmax wins with confidence capped at 1.0.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::page::{PageLabel, SitemapPage};

const MATCH_SCORE: f64 = 0.4;
const OTHER_BASE_SCORE: f64 = 0.1;

fn label_patterns() -> &'static [(PageLabel, Vec<Regex>)] {
    static PATTERNS: OnceLock<Vec<(PageLabel, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static classification pattern"))
                .collect()
        };
        vec![
            (
                PageLabel::Blog,
                compile(&[
                    r"/blog/?", r"/news/?", r"/articles/?", r"/posts/?", r"/insights/?",
                    r"/stories/?", r"/updates/?", r"/press/?",
                ]),
            ),
            (
                PageLabel::Product,
                compile(&[
                    r"/products?/?", r"/solutions?/?", r"/pricing/?", r"/features/?",
                    r"/plans/?", r"/offerings?/?", r"/store/?", r"/shop/?", r"/catalog/?",
                    r"/deals?/?", r"/inventory/?",
                ]),
            ),
            (
                PageLabel::Service,
                compile(&[
                    r"/services?/?", r"/consulting/?", r"/agency/?",
                    r"/professional-services/?",
                ]),
            ),
            (
                PageLabel::Docs,
                compile(&[
                    r"/docs?/?", r"/documentation/?", r"/guides?/?", r"/tutorials?/?",
                    r"/help/?", r"/kb/?", r"/knowledge-base/?", r"/faq/?",
                ]),
            ),
            (
                PageLabel::Resource,
                compile(&[
                    r"/whitepapers?/?", r"/case-stud(y|ies)/?", r"/templates?/?",
                    r"/tools?/?", r"/calculators?/?", r"/webinars?/?", r"/videos?/?",
                    r"/ebooks?/?", r"/reports?/?",
                ]),
            ),
            (
                PageLabel::Company,
                compile(&[
                    r"/about/?", r"/about-us/?", r"/team/?", r"/careers?/?", r"/jobs?/?",
                    r"/culture/?", r"/company/?", r"/who-we-are/?", r"/mission/?",
                    r"/vision/?", r"/values?/?", r"/leadership/?", r"/newsroom/?",
                ]),
            ),
            (
                PageLabel::Legal,
                compile(&[
                    r"/imprint/?", r"/impressum/?", r"/privacy/?", r"/privacy-policy/?",
                    r"/terms?/?", r"/terms-of-service/?", r"/terms-of-use/?", r"/legal/?",
                    r"/disclaimer/?", r"/cookies?/?", r"/data-protection/?", r"/gdpr/?",
                ]),
            ),
            (
                PageLabel::Contact,
                compile(&[
                    r"/contact/?", r"/contact-us/?", r"/get-in-touch/?", r"/reach-us/?",
                    r"/talk-to-us/?", r"/support/?", r"/customer-support/?",
                    r"/help-desk/?", r"/email-us/?",
                ]),
            ),
            (
                PageLabel::Landing,
                compile(&[
                    r"/campaigns?/?", r"/lp/?", r"/landing/?", r"/offers?/?",
                    r"/promotions?/?", r"/deals?/?", r"/promos?/?",
                ]),
            ),
        ]
    })
}

/// Classify a URL into a labeled page.
pub fn classify_page(url: &str) -> SitemapPage {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();

    let mut best_label = PageLabel::Other;
    let mut best_score = OTHER_BASE_SCORE;

    for (label, patterns) in label_patterns() {
        let matches = patterns.iter().filter(|p| p.is_match(&path)).count();
        let score = matches as f64 * MATCH_SCORE;
        if score > best_score {
            best_score = score;
            best_label = *label;
        }
    }

    SitemapPage {
        url: url.to_string(),
        title: title_from_url(&path),
        path,
        label: best_label,
        confidence: best_score.min(1.0),
    }
}

/// Human-readable title from the final non-empty slug:
/// `/blog/invoice-automation-software` → "Invoice Automation Software".
pub fn title_from_url(path: &str) -> String {
    let slug = path.trim_end_matches('/').rsplit('/').find(|part| !part.is_empty());

    let slug = match slug {
        Some(s) => s,
        None => return "Untitled".to_string(),
    };

    let title = slug
        .replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blog_path_classified_as_blog() {
        let page = classify_page("https://example.com/blog/zero-trust-basics");
        assert_eq!(page.label, PageLabel::Blog);
        assert!(page.confidence >= 0.4);
        assert_eq!(page.title, "Zero Trust Basics");
    }

    #[test]
    fn unmatched_path_falls_back_to_other() {
        let page = classify_page("https://example.com/xyzzy");
        assert_eq!(page.label, PageLabel::Other);
        assert!((page.confidence - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn multiple_matches_raise_confidence() {
        // /blog/news/x matches two blog patterns → 0.8
        let page = classify_page("https://example.com/blog/news/weekly");
        assert_eq!(page.label, PageLabel::Blog);
        assert!(page.confidence >= 0.8);
    }

    #[test]
    fn confidence_caps_at_one() {
        let page = classify_page("https://example.com/blog/news/articles/posts/insights");
        assert!(page.confidence <= 1.0);
    }

    #[test]
    fn root_path_titled_untitled() {
        assert_eq!(title_from_url("/"), "Untitled");
        assert_eq!(title_from_url(""), "Untitled");
    }

    #[test]
    fn underscores_and_hyphens_become_spaces() {
        assert_eq!(title_from_url("/docs/getting_started-guide"), "Getting Started Guide");
    }
}
