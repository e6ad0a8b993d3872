use serde::{Deserialize, Serialize};

/// One numbered source reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// 1-based position in the source list.
    pub number: u32,
    /// Absolute http/https URL.
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
}

impl Citation {
    pub fn new(number: u32, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            number,
            url: url.into(),
            title: title.into(),
            meta_description: None,
        }
    }

    /// The canonical text form: `[N]: <url> – <title>`.
    pub fn format(&self) -> String {
        format!("[{}]: {} – {}", self.number, self.url, self.title)
    }
}

/// Ordered citations, numbered contiguously from 1 after any filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CitationList {
    pub citations: Vec<Citation>,
}

impl CitationList {
    pub fn new(citations: Vec<Citation>) -> Self {
        let mut list = Self { citations };
        list.renumber();
        list
    }

    pub fn count(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    /// Re-assign numbers 1..N in current order.
    pub fn renumber(&mut self) {
        for (i, citation) in self.citations.iter_mut().enumerate() {
            citation.number = (i + 1) as u32;
        }
    }

    /// Drop citations not matching the predicate, then renumber.
    pub fn retain(&mut self, f: impl FnMut(&Citation) -> bool) {
        self.citations.retain(f);
        self.renumber();
    }

    /// The canonical text form, one citation per line.
    pub fn format(&self) -> String {
        self.citations
            .iter()
            .map(Citation::format)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Superscript-anchored paragraph list for the article footer. Each
    /// paragraph carries the `source-N` anchor the in-body links resolve to.
    pub fn to_html_paragraph_list(&self) -> String {
        self.citations
            .iter()
            .map(|c| {
                format!(
                    "<p class=\"citation\" id=\"source-{n}\"><sup>{n}</sup> <a href=\"{url}\" target=\"_blank\" rel=\"noopener\">{title}</a></p>",
                    n = c.number,
                    url = c.url,
                    title = html_escape(&c.title),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sources;

    #[test]
    fn renumber_assigns_contiguous_numbers() {
        let mut list = CitationList {
            citations: vec![
                Citation::new(3, "https://a.com", "A"),
                Citation::new(7, "https://b.com", "B"),
            ],
        };
        list.renumber();
        assert_eq!(list.citations[0].number, 1);
        assert_eq!(list.citations[1].number, 2);
    }

    #[test]
    fn retain_renumbers_after_filtering() {
        let mut list = CitationList::new(vec![
            Citation::new(0, "https://a.com", "A"),
            Citation::new(0, "https://b.com", "B"),
            Citation::new(0, "https://c.com", "C"),
        ]);
        list.retain(|c| c.url != "https://b.com");
        assert_eq!(list.count(), 2);
        assert_eq!(list.citations[1].number, 2);
        assert_eq!(list.citations[1].url, "https://c.com");
    }

    #[test]
    fn parse_format_round_trips() {
        let list = CitationList::new(vec![
            Citation::new(0, "https://example.org/report", "Annual Report"),
            Citation::new(0, "https://saas-metrics.com/churn", "Churn Benchmarks"),
        ]);
        let parsed = parse_sources(&list.format());
        assert_eq!(parsed, list);
    }

    #[test]
    fn html_paragraphs_carry_source_anchors() {
        let list = CitationList::new(vec![Citation::new(0, "https://a.com", "A <b>title</b>")]);
        let html = list.to_html_paragraph_list();
        assert!(html.contains("id=\"source-1\""));
        assert!(html.contains("<sup>1</sup>"));
        assert!(html.contains("A &lt;b&gt;title&lt;/b&gt;"));
    }
}
