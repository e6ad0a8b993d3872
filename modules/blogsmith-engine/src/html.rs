//! HTML canonicalization for stage 10: allow-list sanitization, orphaned-tag
//! repair, and whitespace/invisible-character normalization. Everything here
//! is regex-driven over the generator's constrained HTML subset; this is not
//! a general-purpose HTML parser.

use std::sync::OnceLock;

use regex::Regex;

/// Tags that survive sanitization. Anything else is stripped, keeping its
/// inner text.
const ALLOWED_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "ul", "ol", "li", "strong", "em", "b", "i", "a", "br", "sup",
    "blockquote", "table", "thead", "tbody", "tr", "th", "td",
];

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)((?:[^>])*?)>").expect("tag regex"))
}

fn event_handler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|\S+)"#).expect("handler regex"))
}

fn script_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b.*?</script>|<style\b.*?</style>|<iframe\b.*?</iframe>|<object\b.*?</object>|<embed\b.*?</embed>",
        )
        .expect("script regex")
    })
}

/// Sanitize HTML against the allow-list: script/style blocks removed with
/// their content, event handlers and javascript: URLs stripped, unknown tags
/// dropped but their text kept.
pub fn sanitize(html: &str) -> String {
    let html = script_block_re().replace_all(html, "");
    let html = event_handler_re().replace_all(&html, "");

    let sanitized = tag_re().replace_all(&html, |caps: &regex::Captures| {
        let closing = &caps[1];
        let name = caps[2].to_lowercase();
        let attrs = &caps[3];

        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return String::new();
        }

        // Only anchors keep attributes, and only safe href/class/id/rel/target.
        if name == "a" && closing.is_empty() {
            let href = attr_value(attrs, "href").filter(|h| {
                let lower = h.trim().to_lowercase();
                !lower.starts_with("javascript:")
                    && !lower.starts_with("data:")
                    && !lower.starts_with("vbscript:")
            });
            let class = attr_value(attrs, "class");
            let mut tag = String::from("<a");
            if let Some(href) = href {
                tag.push_str(&format!(" href=\"{href}\""));
            }
            if let Some(class) = class {
                tag.push_str(&format!(" class=\"{class}\""));
            }
            if attrs.contains("_blank") {
                tag.push_str(" target=\"_blank\" rel=\"noopener\"");
            }
            tag.push('>');
            return tag;
        }

        let id = attr_value(attrs, "id");
        match (closing.is_empty(), id) {
            (true, Some(id)) => format!("<{name} id=\"{id}\">"),
            (true, None) => format!("<{name}>"),
            (false, _) => format!("</{name}>"),
        }
    });

    remove_invisible_chars(&sanitized)
}

fn attr_value(attrs: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"(?i){name}\s*=\s*("([^"]*)"|'([^']*)')"#)).ok()?;
    let caps = re.captures(attrs)?;
    caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str().to_string())
}

/// Repair the tag damage the generator habitually produces: doubled `</p>`,
/// bold-only orphan paragraphs, stray markdown bold markers.
pub fn repair_tags(html: &str) -> String {
    let mut out = html.to_string();

    // Markdown bold that leaked through.
    out = Regex::new(r"\*\*(.+?)\*\*")
        .expect("bold regex")
        .replace_all(&out, "$1")
        .to_string();

    // Double-closed paragraphs.
    out = Regex::new(r"</p>\s*</p>")
        .expect("pp regex")
        .replace_all(&out, "</p>")
        .to_string();

    // Normalize spacing between paragraphs.
    out = Regex::new(r"</p>\s*<p>")
        .expect("spacing regex")
        .replace_all(&out, "</p><p>")
        .to_string();

    // A <strong> line stranded between paragraphs belongs to the previous one.
    out = Regex::new(r"</p>\s*<strong>([^<]+)</strong>\s*</p>")
        .expect("strong regex")
        .replace_all(&out, " <strong>$1</strong></p>")
        .to_string();

    // Unclosed paragraph at end of fragment.
    let opens = out.matches("<p>").count() + out.matches("<p ").count();
    let closes = out.matches("</p>").count();
    for _ in closes..opens {
        out.push_str("</p>");
    }

    out
}

/// Strip zero-width and BOM characters the generator occasionally emits.
pub fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{00AD}'))
        .collect()
}

/// Paragraph inner texts, in order.
pub fn paragraphs(html: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?s)<p[^>]*>(.*?)</p>").expect("paragraph regex"));
    re.captures_iter(html).map(|c| c[1].to_string()).collect()
}

/// Rebuild content from paragraph inner texts (used by the AEO splitter).
pub fn join_paragraphs(paragraphs: &[String]) -> String {
    paragraphs
        .iter()
        .map(|p| format!("<p>{p}</p>"))
        .collect::<Vec<_>>()
        .join("")
}

pub fn count_words(text: &str) -> usize {
    blogsmith_common::strip_html(text).split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_blocks_removed_with_content() {
        let html = "<p>keep</p><script>alert(1)</script><p>also</p>";
        let clean = sanitize(html);
        assert!(!clean.contains("alert"));
        assert!(clean.contains("<p>keep</p>"));
    }

    #[test]
    fn event_handlers_stripped() {
        let clean = sanitize(r#"<p onclick="steal()">text</p>"#);
        assert_eq!(clean, "<p>text</p>");
    }

    #[test]
    fn javascript_hrefs_dropped_but_anchor_kept() {
        let clean = sanitize(r#"<a href="javascript:alert(1)">x</a>"#);
        assert_eq!(clean, "<a>x</a>");

        let clean = sanitize(r#"<a href="https://example.com" class="citation-link">x</a>"#);
        assert!(clean.contains("href=\"https://example.com\""));
        assert!(clean.contains("class=\"citation-link\""));
    }

    #[test]
    fn unknown_tags_stripped_text_kept() {
        let clean = sanitize("<div><span>hello</span></div>");
        assert_eq!(clean, "hello");
    }

    #[test]
    fn ids_survive_on_headers() {
        let clean = sanitize(r#"<h2 id="what-is-it">What is it?</h2>"#);
        assert_eq!(clean, r#"<h2 id="what-is-it">What is it?</h2>"#);
    }

    #[test]
    fn double_closed_paragraphs_repaired() {
        assert_eq!(repair_tags("<p>a</p></p><p>b</p>"), "<p>a</p><p>b</p>");
    }

    #[test]
    fn unclosed_paragraph_closed() {
        assert_eq!(repair_tags("<p>a</p><p>b"), "<p>a</p><p>b</p>");
    }

    #[test]
    fn markdown_bold_unwrapped() {
        assert_eq!(repair_tags("<p>**важно** rest</p>"), "<p>важно rest</p>");
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn paragraphs_extracts_inner_text() {
        let parts = paragraphs("<p>one</p><h2>skip</h2><p>two</p>");
        assert_eq!(parts, vec!["one", "two"]);
    }

    #[test]
    fn count_words_ignores_tags() {
        assert_eq!(count_words("<p>three small words</p>"), 3);
    }
}
