//! Source-list parsing. The generator emits free-form lines in the shape
//! `[N]: <url> – <title>`; a strict pass extracts well-formed lines and a
//! relaxed pass recovers lines where the URL is buried in prose. Relative
//! URLs are rejected, and numbers are re-assigned contiguously afterwards.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::citation::{Citation, CitationList};

fn strict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // URL runs to the separator: whitespace + dash + whitespace, or plain
    // whitespace. URLs may themselves contain dashes (saas-metrics.com), so
    // the URL capture is lazy and the separator anchors the split.
    RE.get_or_init(|| {
        Regex::new(r"^\[(\d+)\]:\s*(https?://\S+?)(?:\s+[–\-]\s+|\s+)(.+)$").expect("strict citation regex")
    })
}

fn relaxed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d+)\]:\s*(.+)$").expect("relaxed citation regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s–\)\]\}]+").expect("url regex"))
}

/// Parse the free-form `Sources` text into a renumbered citation list.
pub fn parse_sources(sources_text: &str) -> CitationList {
    let mut citations = Vec::new();

    for line in sources_text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = strict_re().captures(line) {
            let number: u32 = caps[1].parse().unwrap_or(0);
            let url = caps[2].trim().to_string();
            let title = caps[3].trim().to_string();
            debug!(number, url = %url, "Parsed citation");
            citations.push(Citation::new(number, url, title));
            continue;
        }

        if let Some(caps) = relaxed_re().captures(line) {
            let number: u32 = caps[1].parse().unwrap_or(0);
            let content = caps[2].trim();

            let Some(url_match) = url_re().find(content) else {
                warn!(line = %line, "Source line has no URL, skipping");
                continue;
            };
            let url = url_match.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);

            // Remove the URL (and a trailing dash separator) to recover the title.
            let mut title = content.replace(url_match.as_str(), "");
            title = title
                .trim()
                .trim_start_matches(['–', '-'])
                .trim()
                .to_string();
            if title.is_empty() {
                title = url.to_string();
            }

            debug!(number, url = %url, "Parsed citation (relaxed)");
            citations.push(Citation::new(number, url, title));
        }
    }

    let mut list = CitationList { citations };
    list.renumber();
    debug!(count = list.count(), "Source parsing complete");
    list
}
