pub mod article;
pub mod config;
pub mod error;
pub mod types;

pub use article::{ArticleOutput, ArticleTable};
pub use config::Config;
pub use error::BlogsmithError;
pub use types::{
    CompanyData, GroundingUrl, InternalLink, JobConfig, QualityMetrics, QualityReport,
    SitemapData, StorageResult,
};

/// Extract the bare domain from a URL: scheme and `www.` stripped, no path.
pub fn extract_domain(url: &str) -> String {
    let stripped = url
        .trim()
        .strip_prefix("https://")
        .or_else(|| url.trim().strip_prefix("http://"))
        .unwrap_or_else(|| url.trim());
    let host = stripped.split('/').next().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_lowercase()
}

/// Slugify a title for anchors and URLs: lowercase, alphanumerics and
/// hyphens only, runs of separators collapsed.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_hyphen = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Strip HTML tags and collapse whitespace, for word counting and previews.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_domain_strips_scheme_www_and_path() {
        assert_eq!(extract_domain("https://www.example.com/blog/x"), "example.com");
        assert_eq!(extract_domain("http://example.co.uk"), "example.co.uk");
        assert_eq!(extract_domain("example.com/path"), "example.com");
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Zero Trust: Security, Architecture!"), "zero-trust-security-architecture");
        assert_eq!(slugify("  -- Hello --  "), "hello");
    }

    #[test]
    fn strip_html_removes_tags_and_collapses_space() {
        assert_eq!(strip_html("<p>Hello   <b>world</b></p>"), "Hello world");
    }
}
