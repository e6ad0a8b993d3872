//! Graceful-degradation fallbacks for non-critical stages. Critical stages
//! (0, 1, 2, 10, 12) fail the job instead of reaching for these.

use blogsmith_common::{slugify, InternalLink};

/// Placeholder hero image when every generation attempt failed.
pub fn placeholder_image_url() -> String {
    "https://via.placeholder.com/1200x630/2563eb/ffffff?text=Blog+Article+Image".to_string()
}

/// Search-engine URL standing in for a citation whose URL could not be
/// validated or replaced.
pub fn search_citation_url(title: &str) -> String {
    format!(
        "https://www.google.com/search?q={}",
        title.split_whitespace().collect::<Vec<_>>().join("+")
    )
}

/// Keyword-derived internal links when scoring and validation failed.
pub fn heuristic_internal_links(topics: &[String], base_url: &str) -> Vec<InternalLink> {
    topics
        .iter()
        .take(3)
        .map(|topic| {
            let slug = slugify(topic);
            InternalLink {
                url: format!("{}/magazine/{slug}", base_url.trim_end_matches('/')),
                title: topic.clone(),
                relevance: 3,
                domain: blogsmith_common::extract_domain(base_url),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_citation_url_encodes_spaces() {
        assert_eq!(
            search_citation_url("zero trust architecture"),
            "https://www.google.com/search?q=zero+trust+architecture"
        );
    }

    #[test]
    fn heuristic_links_cap_at_three() {
        let topics: Vec<String> = (0..5).map(|n| format!("topic {n}")).collect();
        let links = heuristic_internal_links(&topics, "https://example.com/");
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].url, "https://example.com/magazine/topic-0");
        assert_eq!(links[0].domain, "example.com");
    }
}
