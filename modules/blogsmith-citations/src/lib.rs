pub mod alternatives;
pub mod citation;
pub mod linker;
pub mod parser;
pub mod validator;

pub use alternatives::AlternativeFinder;
pub use citation::{Citation, CitationList};
pub use linker::CitationLinker;
pub use parser::parse_sources;
pub use validator::{ProbeOutcome, UrlValidator, ValidatorConfig};

/// Authority domains the alternative finder is known to fall back on when it
/// cannot ground a claim. Replacements landing here are rejected rather than
/// admitted to the citation map.
pub const GENERIC_FALLBACK_DOMAINS: &[&str] = &[
    "pewresearch.org",
    "nist.gov",
    "census.gov",
    "statista.com",
];

/// Whether a URL points at one of the generic authority fallbacks.
pub fn is_generic_fallback(url: &str) -> bool {
    let domain = blogsmith_common::extract_domain(url);
    GENERIC_FALLBACK_DOMAINS
        .iter()
        .any(|fallback| domain == *fallback || domain.ends_with(&format!(".{fallback}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_fallback_matches_domain_and_subdomains() {
        assert!(is_generic_fallback("https://www.pewresearch.org/internet/2024"));
        assert!(is_generic_fallback("https://data.census.gov/table"));
        assert!(!is_generic_fallback("https://example.com/statista.com"));
    }
}
