//! AEO post-processing corrections over the flat validated article:
//! citation distribution, conversational lead-ins (English only), question-
//! format headers, and long-paragraph splitting. Non-English content keeps
//! every rule except phrase injection.

use serde_json::{Map, Value};
use tracing::debug;

use crate::html::{count_words, join_paragraphs, paragraphs};
use crate::quality::{
    bracket_citations, conversational_phrase_count, question_header_count, MAX_PARAGRAPH_WORDS,
    QUESTION_PATTERNS,
};

const TARGET_PHRASES: usize = 12;
const TARGET_QUESTION_HEADERS: usize = 3;

/// Lead-in phrases cycled through during injection, with the words that must
/// not follow them (articles, pronouns, gerunds make the splice ungrammatical).
const INJECTION_PHRASES: &[&str] = &["Here's how", "You can see that", "That's why", "Which means"];
const SKIP_FIRST_WORDS: &[&str] = &[
    "the", "a", "an", "however", "although", "despite", "while", "because", "this", "that",
    "these", "those", "it", "they", "we", "you", "in", "on", "at", "by", "for", "with",
];

/// Apply all enforcement passes in place.
pub fn enforce(article: &mut Map<String, Value>, citation_count: usize, language: &str) {
    debug!(language, citation_count, "Enforcing AEO requirements");

    fix_citation_distribution(article, citation_count);
    if language == "en" {
        add_conversational_phrases(article);
    } else {
        debug!(language, "Skipping conversational phrase injection for non-English content");
    }
    convert_headers_to_questions(article);
    split_long_paragraphs(article);
}

fn section_keys(article: &Map<String, Value>) -> Vec<String> {
    (1..=9)
        .map(|n| format!("section_{n:02}_content"))
        .filter(|key| {
            article
                .get(key)
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.trim().is_empty())
        })
        .collect()
}

/// Append citations to paragraphs carrying fewer than two, cycling through
/// the available numbers.
fn fix_citation_distribution(article: &mut Map<String, Value>, citation_count: usize) {
    if citation_count == 0 {
        return;
    }

    for key in section_keys(article) {
        let Some(content) = article.get(&key).and_then(|v| v.as_str()).map(str::to_string) else {
            continue;
        };
        let paras = paragraphs(&content);
        if paras.is_empty() {
            continue;
        }

        let mut next_citation = 1usize;
        let fixed: Vec<String> = paras
            .into_iter()
            .map(|p| {
                let have = bracket_citations(&p);
                if have >= 2 {
                    return p;
                }
                let mut p = p;
                for _ in have..2 {
                    p.push_str(&format!(" [{next_citation}]"));
                    next_citation = next_citation % citation_count + 1;
                }
                p
            })
            .collect();

        article.insert(key, Value::String(join_paragraphs(&fixed)));
    }
}

/// Inject conversational lead-ins at paragraph starts until the phrase count
/// reaches the target. Paragraphs whose first word would make the splice
/// ungrammatical are left alone.
fn add_conversational_phrases(article: &mut Map<String, Value>) {
    let all_content: String = section_keys(article)
        .iter()
        .filter_map(|key| article.get(key).and_then(|v| v.as_str()))
        .collect();
    let mut have = conversational_phrase_count(&all_content);
    if have >= TARGET_PHRASES {
        return;
    }

    let mut phrase_index = 0usize;
    for key in section_keys(article) {
        if have >= TARGET_PHRASES {
            break;
        }
        let Some(content) = article.get(&key).and_then(|v| v.as_str()).map(str::to_string) else {
            continue;
        };

        let paras = paragraphs(&content);
        let mut changed = false;
        let rewritten: Vec<String> = paras
            .into_iter()
            .map(|p| {
                if have >= TARGET_PHRASES {
                    return p;
                }
                let plain = blogsmith_common::strip_html(&p);
                let Some(first_word) = plain.split_whitespace().next() else {
                    return p;
                };
                let first_lower = first_word.to_lowercase();
                if SKIP_FIRST_WORDS.contains(&first_lower.as_str())
                    || first_lower.ends_with("ing")
                    || conversational_phrase_count(&p) > 0
                {
                    return p;
                }

                let phrase = INJECTION_PHRASES[phrase_index % INJECTION_PHRASES.len()];
                phrase_index += 1;
                have += 1;
                changed = true;

                // Lower-case the original first letter so the splice reads
                // as one sentence.
                let mut chars = p.chars();
                let spliced = match chars.next() {
                    Some(c) => format!("{phrase} {}{}", c.to_lowercase(), chars.as_str()),
                    None => p.clone(),
                };
                spliced
            })
            .collect();

        if changed {
            article.insert(key, Value::String(join_paragraphs(&rewritten)));
        }
    }
    debug!(phrases = have, "Conversational phrase injection complete");
}

/// Rewrite section titles into question form until the target is met.
fn convert_headers_to_questions(article: &mut Map<String, Value>) {
    let titles: Vec<String> = (1..=9)
        .filter_map(|n| {
            article
                .get(&format!("section_{n:02}_title"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .filter(|t| !t.trim().is_empty())
        .collect();

    let mut questions = question_header_count(&titles);
    if questions >= TARGET_QUESTION_HEADERS {
        return;
    }

    for n in 1..=9 {
        if questions >= TARGET_QUESTION_HEADERS {
            break;
        }
        let key = format!("section_{n:02}_title");
        let Some(title) = article.get(&key).and_then(|v| v.as_str()).map(str::to_string) else {
            continue;
        };
        if title.trim().is_empty() || title.ends_with('?') {
            continue;
        }
        let lower = title.to_lowercase();
        if QUESTION_PATTERNS.iter().any(|p| lower.contains(p)) || lower.starts_with("how to ") {
            continue;
        }

        let converted = if let Some(rest) = title.strip_prefix("Why ") {
            format!("Why is {}?", rest.trim_end_matches('.'))
        } else if let Some(rest) = title.strip_prefix("How ") {
            format!("How does {}?", rest.trim_end_matches('.'))
        } else if title.starts_with("What ") {
            format!("{}?", title.trim_end_matches('.'))
        } else if let Some((left, right)) = split_versus(&title) {
            format!("What is the difference between {left} and {right}?")
        } else {
            format!("What are {}?", lowercase_first(title.trim_end_matches('.')))
        };

        debug!(from = %title, to = %converted, "Converted header to question");
        article.insert(key, Value::String(converted));
        questions += 1;
    }
}

fn split_versus(title: &str) -> Option<(String, String)> {
    let re = regex::Regex::new(r"(?i)\s+vs\.?\s+").ok()?;
    let parts: Vec<&str> = re.split(title).collect();
    if parts.len() == 2 {
        Some((parts[0].to_string(), parts[1].to_string()))
    } else {
        None
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Split paragraphs longer than the cap at the sentence boundary nearest the
/// midpoint.
fn split_long_paragraphs(article: &mut Map<String, Value>) {
    for key in section_keys(article) {
        let Some(content) = article.get(&key).and_then(|v| v.as_str()).map(str::to_string) else {
            continue;
        };
        let paras = paragraphs(&content);
        if paras.is_empty() {
            continue;
        }

        let mut changed = false;
        let mut rebuilt: Vec<String> = Vec::with_capacity(paras.len());
        for p in paras {
            if count_words(&p) <= MAX_PARAGRAPH_WORDS {
                rebuilt.push(p);
                continue;
            }
            match split_at_middle_sentence(&p) {
                Some((first, second)) => {
                    changed = true;
                    rebuilt.push(first);
                    rebuilt.push(second);
                }
                None => rebuilt.push(p),
            }
        }

        if changed {
            article.insert(key, Value::String(join_paragraphs(&rebuilt)));
        }
    }
}

fn split_at_middle_sentence(paragraph: &str) -> Option<(String, String)> {
    let boundaries: Vec<usize> = paragraph
        .match_indices(". ")
        .map(|(i, _)| i + 1)
        .collect();
    if boundaries.is_empty() {
        return None;
    }
    let middle = paragraph.len() / 2;
    let split_at = boundaries
        .into_iter()
        .min_by_key(|&i| i.abs_diff(middle))?;
    let (first, second) = paragraph.split_at(split_at);
    let second = second.trim_start();
    if first.trim().is_empty() || second.is_empty() {
        return None;
    }
    Some((first.trim_end().to_string(), second.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article(content: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("section_01_title".to_string(), json!("Implementation Steps"));
        map.insert("section_01_content".to_string(), json!(content));
        map
    }

    #[test]
    fn sparse_paragraphs_gain_citations() {
        let mut map = article("<p>No citations here at all.</p>");
        enforce(&mut map, 3, "en");
        let content = map["section_01_content"].as_str().unwrap();
        assert!(bracket_citations(content) >= 2);
    }

    #[test]
    fn zero_citations_leaves_content_untouched_by_distribution() {
        let mut map = article("<p>Nothing to add.</p>");
        fix_citation_distribution(&mut map, 0);
        assert_eq!(map["section_01_content"], "<p>Nothing to add.</p>");
    }

    #[test]
    fn non_english_skips_phrase_injection_but_splits_paragraphs() {
        let long: String = std::iter::repeat("Wort und mehr. ").take(30).collect();
        let mut map = article(&format!("<p>{long}</p>"));
        enforce(&mut map, 1, "de");
        let content = map["section_01_content"].as_str().unwrap();
        // Paragraph was split even though no phrases were injected.
        assert!(paragraphs(content).len() >= 2);
        assert!(!content.contains("Here's how"));
    }

    #[test]
    fn headers_become_questions_up_to_target() {
        let mut map = Map::new();
        map.insert("section_01_title".to_string(), json!("Why Adoption Accelerates"));
        map.insert("section_01_content".to_string(), json!("<p>x</p>"));
        map.insert("section_02_title".to_string(), json!("Cloud vs. On-Premise"));
        map.insert("section_02_content".to_string(), json!("<p>x</p>"));
        map.insert("section_03_title".to_string(), json!("Strategic Steps"));
        map.insert("section_03_content".to_string(), json!("<p>x</p>"));

        convert_headers_to_questions(&mut map);
        assert_eq!(map["section_01_title"], "Why is Adoption Accelerates?");
        assert_eq!(
            map["section_02_title"],
            "What is the difference between Cloud and On-Premise?"
        );
        assert_eq!(map["section_03_title"], "What are strategic Steps?");
    }

    #[test]
    fn how_to_titles_left_alone() {
        let mut map = Map::new();
        map.insert("section_01_title".to_string(), json!("How to Build a Pipeline"));
        map.insert("section_01_content".to_string(), json!("<p>x</p>"));
        convert_headers_to_questions(&mut map);
        assert_eq!(map["section_01_title"], "How to Build a Pipeline");
    }

    #[test]
    fn long_paragraph_split_near_sentence_boundary() {
        let text = format!(
            "<p>{} Breakpoint sentence. {}</p>",
            "start words ".repeat(20),
            "end words ".repeat(20)
        );
        let mut map = article(&text);
        split_long_paragraphs(&mut map);
        let content = map["section_01_content"].as_str().unwrap();
        assert_eq!(paragraphs(content).len(), 2);
    }
}
