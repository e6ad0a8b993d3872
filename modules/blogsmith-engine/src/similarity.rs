//! SEO-level duplicate detection across generated articles.
//!
//! Every stored article leaves a fingerprint (keyword, meta, headings, top
//! key phrases, FAQ questions, intro prefix). New keywords are checked for
//! cannibalization before generation, and finished articles are scored
//! against every stored fingerprint before persistence. The fingerprint
//! store is a single JSON file shared across jobs.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use blogsmith_common::{slugify, strip_html};

/// Overall score at or above this is a definite duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 70.0;
/// Overall score at or above this is potential cannibalization.
pub const WARNING_THRESHOLD: f64 = 50.0;
/// Word-overlap ratio at which two keywords target the same query.
const KEYWORD_OVERLAP_THRESHOLD: f64 = 0.8;

const KEY_PHRASE_COUNT: usize = 50;
const NGRAM_SIZE: usize = 3;
const INTRO_PREFIX_CHARS: usize = 200;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for",
    "of", "with", "by", "from", "is", "are", "was", "were", "be", "been",
    "have", "has", "had", "do", "does", "did", "will", "would", "could",
    "should", "can", "this", "that", "these", "those", "it", "its", "as",
    "if", "when", "where", "how", "what", "which", "who", "not", "no",
    "yes", "all", "any", "both", "each", "more", "most", "other", "some",
    "such", "than", "too", "very", "just", "also", "now", "then", "so",
    "your", "you", "they", "their", "our", "we", "i", "my", "me", "us",
];

/// Fingerprint of one stored article, the unit of comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleFingerprint {
    pub slug: String,
    pub primary_keyword: String,
    pub meta_title: String,
    pub meta_description: String,
    pub headings: Vec<String>,
    pub key_phrases: Vec<String>,
    pub faq_questions: Vec<String>,
    /// First 200 chars of the intro, normalized.
    pub intro_hash: String,
}

/// Detailed similarity verdict against the closest stored article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub is_duplicate: bool,
    /// 0..=100 weighted score.
    pub overall_score: f64,
    /// Slug of the most similar stored article.
    pub similar_to: Option<String>,

    pub keyword_match: bool,
    pub title_similarity: f64,
    pub heading_overlap: f64,
    pub content_overlap: f64,
    pub faq_overlap: f64,

    /// Headings shared with the most similar article, for targeted
    /// regeneration.
    pub overlapping_headings: Vec<String>,
    pub issues: Vec<String>,
}

pub struct SimilarityChecker {
    storage_path: Option<PathBuf>,
    fingerprints: Mutex<BTreeMap<String, ArticleFingerprint>>,
}

impl SimilarityChecker {
    /// Open a checker backed by the given JSON file, loading any existing
    /// fingerprints. A broken file is logged and treated as empty.
    pub fn open(storage_path: &str) -> Self {
        let path = PathBuf::from(storage_path);
        let fingerprints = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable fingerprint store, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        if !fingerprints.is_empty() {
            info!(path = %path.display(), count = fingerprints.len(), "Loaded article fingerprints");
        }
        Self {
            storage_path: Some(path),
            fingerprints: Mutex::new(fingerprints),
        }
    }

    /// Checker with no file persistence, for tests and keyless setups.
    pub fn in_memory() -> Self {
        Self {
            storage_path: None,
            fingerprints: Mutex::new(BTreeMap::new()),
        }
    }

    fn save(&self, fingerprints: &BTreeMap<String, ArticleFingerprint>) {
        let Some(path) = &self.storage_path else {
            return;
        };
        match serde_json::to_string_pretty(fingerprints) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(path, contents) {
                    warn!(path = %path.display(), error = %e, "Failed to save fingerprints");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize fingerprints"),
        }
    }

    // ---------------------------------------------------------------------
    // Extraction
    // ---------------------------------------------------------------------

    /// Build a fingerprint from the flat validated article.
    pub fn extract_fingerprint(
        article: &Map<String, Value>,
        primary_keyword: &str,
        slug: Option<&str>,
    ) -> ArticleFingerprint {
        let get = |key: &str| {
            article
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let slug = slug
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .or_else(|| Some(get("slug")).filter(|s| !s.is_empty()))
            .unwrap_or_else(|| slugify(&get("Headline")));

        let mut headings: Vec<String> = Vec::new();
        if let Some(Value::Array(toc)) = article.get("toc_items") {
            for item in toc {
                if let Some(title) = item.get("title").and_then(|v| v.as_str()) {
                    headings.push(title.to_lowercase());
                }
            }
        }
        for n in 1..=9 {
            let title = get(&format!("section_{n:02}_title"));
            if !title.trim().is_empty() {
                headings.push(title.to_lowercase());
            }
        }
        let mut seen = HashSet::new();
        headings.retain(|h| seen.insert(h.clone()));

        let mut text_parts: Vec<String> = vec![get("Intro")];
        for n in 1..=9 {
            text_parts.push(get(&format!("section_{n:02}_content")));
        }
        for n in 1..=3 {
            text_parts.push(get(&format!("key_takeaway_{n:02}")));
        }
        let key_phrases = top_ngrams(&text_parts.join(" "), NGRAM_SIZE, KEY_PHRASE_COUNT);

        let mut faq_questions: Vec<String> = Vec::new();
        for list_key in ["faq_items", "paa_items"] {
            if let Some(Value::Array(items)) = article.get(list_key) {
                for item in items {
                    if let Some(question) = item.get("question").and_then(|v| v.as_str()) {
                        faq_questions.push(question.to_lowercase());
                    }
                }
            }
        }

        let intro = get("Intro");
        let intro_prefix: String = intro.chars().take(INTRO_PREFIX_CHARS).collect();

        ArticleFingerprint {
            slug,
            primary_keyword: primary_keyword.to_lowercase().trim().to_string(),
            meta_title: get("Meta_Title").to_lowercase(),
            meta_description: get("Meta_Description").to_lowercase(),
            headings,
            key_phrases,
            faq_questions,
            intro_hash: normalize_text(&intro_prefix),
        }
    }

    // ---------------------------------------------------------------------
    // Comparison
    // ---------------------------------------------------------------------

    /// Pre-generation cannibalization check: is the keyword already targeted
    /// by stored content? Returns the slugs targeting the same or a nearly
    /// identical keyword.
    pub fn check_keyword(&self, keyword: &str) -> (bool, Vec<String>) {
        let keyword = keyword.to_lowercase();
        let keyword = keyword.trim();
        let kw_words: HashSet<&str> = keyword.split_whitespace().collect();

        let fingerprints = self.fingerprints.lock().expect("fingerprint lock");
        let matches: Vec<String> = fingerprints
            .values()
            .filter(|fp| {
                if fp.primary_keyword == keyword {
                    return true;
                }
                let fp_words: HashSet<&str> = fp.primary_keyword.split_whitespace().collect();
                if kw_words.is_empty() || fp_words.is_empty() {
                    return false;
                }
                let overlap = kw_words.intersection(&fp_words).count() as f64
                    / kw_words.len().max(fp_words.len()) as f64;
                overlap >= KEYWORD_OVERLAP_THRESHOLD
            })
            .map(|fp| fp.slug.clone())
            .collect();

        (!matches.is_empty(), matches)
    }

    /// Score the article against every stored fingerprint and report the
    /// closest match.
    pub fn check_article(
        &self,
        article: &Map<String, Value>,
        primary_keyword: &str,
        slug: Option<&str>,
    ) -> SimilarityReport {
        let new_fp = Self::extract_fingerprint(article, primary_keyword, slug);
        let fingerprints = self.fingerprints.lock().expect("fingerprint lock");

        let mut best: Option<(String, SimilarityReport)> = None;
        for (existing_slug, existing_fp) in fingerprints.iter() {
            if *existing_slug == new_fp.slug {
                continue;
            }
            let report = compare_fingerprints(&new_fp, existing_fp);
            let better = best
                .as_ref()
                .map(|(_, b)| report.overall_score > b.overall_score)
                .unwrap_or(true);
            if better {
                best = Some((existing_slug.clone(), report));
            }
        }

        match best {
            Some((slug, mut report)) => {
                report.similar_to = Some(slug);
                report.is_duplicate = report.overall_score >= DUPLICATE_THRESHOLD;
                report
            }
            None => SimilarityReport::default(),
        }
    }

    // ---------------------------------------------------------------------
    // Storage
    // ---------------------------------------------------------------------

    /// Store the article's fingerprint for future comparisons.
    pub fn store_article(
        &self,
        article: &Map<String, Value>,
        primary_keyword: &str,
        slug: Option<&str>,
    ) {
        let fp = Self::extract_fingerprint(article, primary_keyword, slug);
        let mut fingerprints = self.fingerprints.lock().expect("fingerprint lock");
        info!(slug = %fp.slug, "Stored article fingerprint");
        fingerprints.insert(fp.slug.clone(), fp);
        self.save(&fingerprints);
    }

    pub fn remove_article(&self, slug: &str) {
        let mut fingerprints = self.fingerprints.lock().expect("fingerprint lock");
        if fingerprints.remove(slug).is_some() {
            info!(slug, "Removed article fingerprint");
            self.save(&fingerprints);
        }
    }

    pub fn list_articles(&self) -> Vec<String> {
        self.fingerprints
            .lock()
            .expect("fingerprint lock")
            .keys()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        let mut fingerprints = self.fingerprints.lock().expect("fingerprint lock");
        fingerprints.clear();
        self.save(&fingerprints);
    }
}

fn compare_fingerprints(new: &ArticleFingerprint, existing: &ArticleFingerprint) -> SimilarityReport {
    let mut issues = Vec::new();

    let keyword_match =
        !new.primary_keyword.is_empty() && new.primary_keyword == existing.primary_keyword;
    if keyword_match {
        issues.push(format!(
            "CRITICAL: same target keyword '{}'",
            new.primary_keyword
        ));
    }

    let title_sim = text_similarity(&new.meta_title, &existing.meta_title);
    if title_sim > 0.7 {
        issues.push(format!("high title similarity ({:.0}%)", title_sim * 100.0));
    }

    let heading_overlap = list_overlap(&new.headings, &existing.headings);
    if heading_overlap > 0.5 {
        issues.push(format!("overlapping headings ({:.0}%)", heading_overlap * 100.0));
    }

    let content_overlap = list_overlap(&new.key_phrases, &existing.key_phrases);
    if content_overlap > 0.3 {
        issues.push(format!("content phrase overlap ({:.0}%)", content_overlap * 100.0));
    }

    let faq_overlap = list_overlap(&new.faq_questions, &existing.faq_questions);
    if faq_overlap > 0.5 {
        issues.push(format!("FAQ question overlap ({:.0}%)", faq_overlap * 100.0));
    }

    let intro_sim = text_similarity(&new.intro_hash, &existing.intro_hash);
    if intro_sim > 0.6 {
        issues.push(format!("similar intro ({:.0}%)", intro_sim * 100.0));
    }

    let existing_headings: HashSet<&String> = existing.headings.iter().collect();
    let overlapping_headings = new
        .headings
        .iter()
        .filter(|h| existing_headings.contains(h))
        .cloned()
        .collect();

    // Keyword identity dominates; the softer signals share the rest.
    let overall = (if keyword_match { 30.0 } else { 0.0 })
        + title_sim * 20.0
        + heading_overlap * 20.0
        + content_overlap * 20.0
        + faq_overlap * 5.0
        + intro_sim * 5.0;

    SimilarityReport {
        is_duplicate: false,
        overall_score: overall.min(100.0),
        similar_to: None,
        keyword_match,
        title_similarity: title_sim * 100.0,
        heading_overlap: heading_overlap * 100.0,
        content_overlap: content_overlap * 100.0,
        faq_overlap: faq_overlap * 100.0,
        overlapping_headings,
        issues,
    }
}

/// Jaccard similarity over word sets.
fn text_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

/// Overlap of two lists relative to the smaller one.
fn list_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&String> = a.iter().collect();
    let set_b: HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count();
    let smaller = set_a.len().min(set_b.len());
    intersection as f64 / smaller as f64
}

fn normalize_text(text: &str) -> String {
    strip_html(text)
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Most frequent n-grams after stop-word and short-word filtering.
fn top_ngrams(text: &str, n: usize, top_k: usize) -> Vec<String> {
    let normalized = normalize_text(text);
    let words: Vec<&str> = normalized
        .split_whitespace()
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .collect();

    if words.len() < n {
        return Vec::new();
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for window in words.windows(n) {
        *counts.entry(window.join(" ")).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(top_k).map(|(phrase, _)| phrase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article(keyword: &str, headline: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Headline".to_string(), json!(headline));
        map.insert("Meta_Title".to_string(), json!(format!("{headline} Guide")));
        map.insert(
            "Meta_Description".to_string(),
            json!(format!("Everything about {keyword}.")),
        );
        map.insert("slug".to_string(), json!(slugify(headline)));
        map.insert(
            "Intro".to_string(),
            json!(format!("<p>Understanding {keyword} has become essential for modern security teams everywhere.</p>")),
        );
        map.insert("section_01_title".to_string(), json!(format!("What Is {headline}?")));
        map.insert(
            "section_01_content".to_string(),
            json!(format!("<p>{keyword} adoption continues growing across regulated industries with strict compliance demands and continuous verification requirements.</p>")),
        );
        map.insert(
            "faq_items".to_string(),
            json!([{"question": format!("What is {keyword}?"), "answer": "A model."}]),
        );
        map
    }

    #[test]
    fn fingerprint_extracts_headings_phrases_and_questions() {
        let map = article("zero trust", "Zero Trust");
        let fp = SimilarityChecker::extract_fingerprint(&map, "zero trust", None);

        assert_eq!(fp.slug, "zero-trust");
        assert_eq!(fp.primary_keyword, "zero trust");
        assert_eq!(fp.headings, vec!["what is zero trust?"]);
        assert!(!fp.key_phrases.is_empty());
        assert_eq!(fp.faq_questions, vec!["what is zero trust?"]);
        assert!(!fp.intro_hash.contains('<'));
    }

    #[test]
    fn keyword_check_flags_exact_and_high_overlap() {
        let checker = SimilarityChecker::in_memory();
        checker.store_article(&article("zero trust security", "Zero Trust Security"), "zero trust security", None);

        let (dup, slugs) = checker.check_keyword("zero trust security");
        assert!(dup);
        assert_eq!(slugs, vec!["zero-trust-security"]);

        // Two of three words shared: below the 80% bar.
        let (dup, _) = checker.check_keyword("zero trust adoption");
        assert!(!dup);

        let (dup, _) = checker.check_keyword("cloud compliance auditing");
        assert!(!dup);
    }

    #[test]
    fn near_identical_article_is_a_duplicate() {
        let checker = SimilarityChecker::in_memory();
        checker.store_article(&article("zero trust", "Zero Trust"), "zero trust", None);

        let mut near_copy = article("zero trust", "Zero Trust");
        near_copy.insert("slug".to_string(), json!("zero-trust-2"));
        let report = checker.check_article(&near_copy, "zero trust", None);

        assert!(report.is_duplicate);
        assert!(report.overall_score >= DUPLICATE_THRESHOLD);
        assert_eq!(report.similar_to.as_deref(), Some("zero-trust"));
        assert!(report.keyword_match);
        assert!(report.overlapping_headings.contains(&"what is zero trust?".to_string()));
        assert!(!report.issues.is_empty());
    }

    #[test]
    fn unrelated_article_scores_low() {
        let checker = SimilarityChecker::in_memory();
        checker.store_article(&article("zero trust", "Zero Trust"), "zero trust", None);

        let other = article("container image scanning", "Container Image Scanning");
        let report = checker.check_article(&other, "container image scanning", None);

        assert!(!report.is_duplicate);
        assert!(report.overall_score < WARNING_THRESHOLD);
        assert!(!report.keyword_match);
    }

    #[test]
    fn self_comparison_is_skipped() {
        let checker = SimilarityChecker::in_memory();
        let map = article("zero trust", "Zero Trust");
        checker.store_article(&map, "zero trust", None);

        // Same slug: the stored copy of itself must not count as a match.
        let report = checker.check_article(&map, "zero trust", None);
        assert!(!report.is_duplicate);
        assert!(report.similar_to.is_none());
    }

    #[test]
    fn store_list_remove_clear_round_trip() {
        let checker = SimilarityChecker::in_memory();
        checker.store_article(&article("a b c", "Alpha"), "a b c", None);
        checker.store_article(&article("d e f", "Delta"), "d e f", None);
        assert_eq!(checker.list_articles().len(), 2);

        checker.remove_article("alpha");
        assert_eq!(checker.list_articles(), vec!["delta"]);

        checker.clear();
        assert!(checker.list_articles().is_empty());
    }

    #[test]
    fn fingerprints_persist_across_reopen() {
        let path = std::env::temp_dir().join(format!(
            "fingerprints-test-{}.json",
            std::process::id()
        ));
        let path_str = path.to_string_lossy().to_string();
        let _ = std::fs::remove_file(&path);

        {
            let checker = SimilarityChecker::open(&path_str);
            checker.store_article(&article("zero trust", "Zero Trust"), "zero trust", None);
        }

        let reopened = SimilarityChecker::open(&path_str);
        assert_eq!(reopened.list_articles(), vec!["zero-trust"]);
        let (dup, _) = reopened.check_keyword("zero trust");
        assert!(dup);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn ngrams_skip_stop_words_and_rank_by_frequency() {
        let text = "the quick brown fox jumps over the lazy dog quick brown fox jumps again";
        let phrases = top_ngrams(text, 3, 5);
        // The two repeated trigrams outrank every single-occurrence one.
        assert!(phrases[..2].contains(&"quick brown fox".to_string()));
        assert!(phrases[..2].contains(&"brown fox jumps".to_string()));
        assert!(!phrases.iter().any(|p| p.contains("the ")));
    }
}
