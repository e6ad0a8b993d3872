//! In-body citation linking. Bracket references `[N]` become anchors to the
//! matching `#source-N` paragraph, and a name map turns natural mentions
//! ("According to IBM") into inline links. Text already inside an anchor is
//! left untouched.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("bracket citation regex"))
}

pub struct CitationLinker {
    citation_count: usize,
    name_map: HashMap<String, String>,
}

impl CitationLinker {
    pub fn new(citation_count: usize, name_map: HashMap<String, String>) -> Self {
        Self {
            citation_count,
            name_map,
        }
    }

    /// Apply both linking passes to one text field.
    pub fn link_field(&self, text: &str) -> String {
        let linked = self.link_brackets(text);
        self.link_names(&linked)
    }

    /// Replace `[N]` (including runs like `[1][2]`) with `#source-N` anchors.
    /// References above the citation count are left as-is.
    pub fn link_brackets(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 64);
        let mut cursor = 0;

        for caps in bracket_re().captures_iter(text) {
            let whole = caps.get(0).expect("match 0");
            let number: usize = caps[1].parse().unwrap_or(0);

            out.push_str(&text[cursor..whole.start()]);
            cursor = whole.end();

            let linkable = number >= 1
                && number <= self.citation_count
                && !inside_anchor(text, whole.start());
            if linkable {
                out.push_str(&format!(
                    "<a class=\"citation-link\" href=\"#source-{number}\">[{number}]</a>"
                ));
            } else {
                out.push_str(whole.as_str());
            }
        }
        out.push_str(&text[cursor..]);
        out
    }

    /// Turn the first bare mention of each mapped name into an inline link.
    pub fn link_names(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, url) in &self.name_map {
            let Ok(re) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
                continue;
            };
            let Some(found) = re.find(&out) else {
                continue;
            };
            if inside_anchor(&out, found.start()) {
                continue;
            }
            let replacement = format!(
                "<a class=\"source-mention\" href=\"{url}\" target=\"_blank\" rel=\"noopener\">{name}</a>"
            );
            out = format!(
                "{}{}{}",
                &out[..found.start()],
                replacement,
                &out[found.end()..]
            );
        }
        out
    }
}

/// Whether the byte offset sits inside an `<a …>…</a>` element (or inside the
/// opening tag itself).
fn inside_anchor(text: &str, offset: usize) -> bool {
    let before = &text[..offset];
    let last_open = before.rfind("<a");
    let last_close = before.rfind("</a>");
    match (last_open, last_close) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linker(count: usize) -> CitationLinker {
        CitationLinker::new(count, HashMap::new())
    }

    #[test]
    fn brackets_become_source_anchors() {
        let out = linker(3).link_brackets("<p>Adoption grew 40% [1].</p>");
        assert_eq!(
            out,
            "<p>Adoption grew 40% <a class=\"citation-link\" href=\"#source-1\">[1]</a>.</p>"
        );
    }

    #[test]
    fn consecutive_brackets_each_get_anchors() {
        let out = linker(3).link_brackets("claims [1][2] here");
        assert!(out.contains("#source-1"));
        assert!(out.contains("#source-2"));
    }

    #[test]
    fn out_of_range_references_left_alone() {
        let out = linker(2).link_brackets("see [7]");
        assert_eq!(out, "see [7]");
    }

    #[test]
    fn brackets_inside_anchors_untouched() {
        let text = "<a href=\"#source-1\">[1]</a> and [2]";
        let out = linker(2).link_brackets(text);
        assert!(out.starts_with("<a href=\"#source-1\">[1]</a>"));
        assert!(out.contains("href=\"#source-2\">[2]</a>"));
    }

    #[test]
    fn name_map_links_first_mention_only() {
        let mut names = HashMap::new();
        names.insert(
            "IBM".to_string(),
            "https://www.ibm.com/reports/breach".to_string(),
        );
        let linker = CitationLinker::new(0, names);
        let out = linker.link_names("<p>According to IBM, breaches cost more. IBM also notes…</p>");
        assert_eq!(out.matches("source-mention").count(), 1);
        assert!(out.contains("href=\"https://www.ibm.com/reports/breach\">IBM</a>"));
    }

    #[test]
    fn name_already_inside_anchor_not_relinked() {
        let mut names = HashMap::new();
        names.insert("IBM".to_string(), "https://ibm.com/x".to_string());
        let linker = CitationLinker::new(0, names);
        let text = "<a href=\"https://ibm.com\">IBM</a> research";
        assert_eq!(linker.link_names(text), text);
    }

    #[test]
    fn partial_word_mentions_not_linked() {
        let mut names = HashMap::new();
        names.insert("IBM".to_string(), "https://ibm.com/x".to_string());
        let linker = CitationLinker::new(0, names);
        assert_eq!(linker.link_names("RIBMAX shipped RIBMAXv2"), "RIBMAX shipped RIBMAXv2");
    }
}
