//! Quality checker: scores the merged article against the AEO checklist and
//! collects issues/warnings. Scoring is read-only; corrections live in
//! [`crate::aeo`].

use serde_json::{Map, Value};

use blogsmith_common::{QualityMetrics, QualityReport};

use crate::html::{count_words, paragraphs};

pub const CONVERSATIONAL_PHRASES: &[&str] = &[
    "how to", "what is", "why does", "when should", "where can",
    "you can", "you'll", "you should", "let's", "here's", "this is",
    "how can", "what are", "how do", "why should", "where are",
    "we'll", "that's", "when you", "if you", "so you can", "which means",
];

pub const QUESTION_PATTERNS: &[&str] = &[
    "what is", "how does", "why does", "when should", "where can", "what are", "how can",
];

const PASSING_SCORE: u32 = 70;
pub const MAX_PARAGRAPH_WORDS: usize = 60;

fn get_str<'a>(article: &'a Map<String, Value>, key: &str) -> &'a str {
    article.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

/// All section contents concatenated.
fn section_contents(article: &Map<String, Value>) -> String {
    (1..=9)
        .map(|n| get_str(article, &format!("section_{n:02}_content")).to_string())
        .collect::<Vec<_>>()
        .join("")
}

fn section_titles(article: &Map<String, Value>) -> Vec<String> {
    (1..=9)
        .map(|n| get_str(article, &format!("section_{n:02}_title")).to_string())
        .filter(|t| !t.trim().is_empty())
        .collect()
}

/// Count of bracket citations `[N]` in a text.
pub fn bracket_citations(text: &str) -> usize {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\[\d+\]").expect("citation count regex"))
        .find_iter(text)
        .count()
}

pub fn conversational_phrase_count(content: &str) -> usize {
    let lower = content.to_lowercase();
    CONVERSATIONAL_PHRASES.iter().filter(|p| lower.contains(**p)).count()
}

pub fn question_header_count(titles: &[String]) -> usize {
    titles
        .iter()
        .filter(|t| {
            let lower = t.to_lowercase();
            t.ends_with('?') || QUESTION_PATTERNS.iter().any(|p| lower.contains(p))
        })
        .count()
}

pub fn long_paragraph_count(content: &str) -> usize {
    paragraphs(content)
        .iter()
        .filter(|p| count_words(p) > MAX_PARAGRAPH_WORDS)
        .count()
}

pub fn list_count(content: &str) -> usize {
    content.matches("<ul").count() + content.matches("<ol").count()
}

/// Score the merged article. `language` gates the conversational-phrase
/// check: non-English content is scored as if it passed that dimension,
/// since phrase injection is English-only.
pub fn check(article: &Map<String, Value>, language: &str) -> QualityReport {
    let content = section_contents(article);
    let titles = section_titles(article);
    let intro = get_str(article, "Intro");
    let all_text = format!("{intro}{content}");

    let paras = paragraphs(&content);
    let paras_with_two = paras.iter().filter(|p| bracket_citations(p) >= 2).count();
    let citation_pct = if paras.is_empty() {
        0
    } else {
        (paras_with_two * 100 / paras.len()) as u32
    };

    let phrases = conversational_phrase_count(&all_text);
    let questions = question_header_count(&titles);
    let long_paras = long_paragraph_count(&content);
    let lists = list_count(&content);

    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut score = 0u32;

    // Citation distribution: 30 points, linear to the 60% target.
    score += (citation_pct.min(60) * 30) / 60;
    if citation_pct < 60 {
        warnings.push(format!(
            "citation distribution below target: {citation_pct}% of paragraphs have 2+ citations (target 60%)"
        ));
    }

    // Conversational phrases: 20 points, 12-phrase target, English only.
    if language != "en" {
        score += 20;
    } else {
        score += ((phrases.min(12) * 20) / 12) as u32;
        if phrases < 12 {
            warnings.push(format!("conversational phrases below target: {phrases} (target 12)"));
        }
    }

    // Question-format headers: 20 points, 3-question target.
    score += ((questions.min(3) * 20) / 3) as u32;
    if questions < 2 {
        warnings.push(format!("question headers below target: {questions} (target 2+)"));
    }

    // Paragraph length: 15 points when no paragraph exceeds the cap.
    if long_paras == 0 {
        score += 15;
    } else {
        issues.push(format!("{long_paras} paragraphs exceed {MAX_PARAGRAPH_WORDS} words"));
    }

    // Lists: 15 points when at least one list is present.
    if lists > 0 {
        score += 15;
    } else {
        warnings.push("no lists found in article body".to_string());
    }

    let word_count = article
        .get("word_count")
        .and_then(|v| v.as_u64())
        .unwrap_or_else(|| count_words(&all_text) as u64) as usize;

    let metrics = QualityMetrics {
        word_count,
        read_time_minutes: article
            .get("read_time")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as u32,
        citation_count: article
            .get("citations_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
        internal_link_count: article
            .get("internal_links_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
        faq_count: article.get("faq_count").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
        paa_count: article.get("paa_count").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
        aeo_score: score.min(100),
    };

    QualityReport {
        passed: metrics.aeo_score >= PASSING_SCORE && issues.is_empty(),
        metrics,
        issues,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article_with(content: &str, title: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("section_01_title".to_string(), json!(title));
        map.insert("section_01_content".to_string(), json!(content));
        map.insert("Intro".to_string(), json!("<p>intro [1][2]</p>"));
        map
    }

    #[test]
    fn fully_conforming_article_scores_high() {
        let content = "<p>You can start here [1][2].</p><ul><li>a</li></ul>";
        let report = check(&article_with(content, "What Is Zero Trust?"), "en");
        assert!(report.metrics.aeo_score >= 50);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn long_paragraphs_are_an_issue() {
        let long = format!("<p>{}</p>", "word ".repeat(80));
        let report = check(&article_with(&long, "Title"), "en");
        assert!(!report.issues.is_empty());
        assert!(!report.passed);
    }

    #[test]
    fn non_english_skips_phrase_dimension() {
        let content = "<p>Inhalt ohne Phrasen [1][2].</p><ul><li>a</li></ul>";
        let report_de = check(&article_with(content, "Was ist Zero Trust?"), "de");
        let report_en = check(&article_with(content, "Was ist Zero Trust?"), "en");
        assert!(report_de.metrics.aeo_score > report_en.metrics.aeo_score);
    }

    #[test]
    fn question_headers_counted_by_pattern_and_mark() {
        let titles = vec![
            "What Are the Risks?".to_string(),
            "Implementation Steps".to_string(),
            "How Does It Work?".to_string(),
        ];
        assert_eq!(question_header_count(&titles), 2);
    }

    #[test]
    fn list_count_spots_both_list_kinds() {
        assert_eq!(list_count("<ul><li>a</li></ul><ol><li>b</li></ol>"), 2);
    }
}
