use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The generator's structured output: a flat record of short strings plus
/// numbered field families (sections 01–09, takeaways 01–03, FAQ 01–06,
/// PAA 01–04, images 01–03).
///
/// Field names mirror the response schema handed to the generator, so serde
/// names are authoritative and schemars derives the schema from this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ArticleOutput {
    #[serde(rename = "Headline")]
    pub headline: String,
    #[serde(rename = "Subtitle")]
    pub subtitle: String,
    #[serde(rename = "Teaser")]
    pub teaser: String,
    #[serde(rename = "Direct_Answer")]
    pub direct_answer: String,
    #[serde(rename = "Intro")]
    pub intro: String,
    #[serde(rename = "Meta_Title")]
    pub meta_title: String,
    #[serde(rename = "Meta_Description")]
    pub meta_description: String,

    pub section_01_title: String,
    pub section_01_content: String,
    pub section_02_title: String,
    pub section_02_content: String,
    pub section_03_title: String,
    pub section_03_content: String,
    pub section_04_title: String,
    pub section_04_content: String,
    pub section_05_title: String,
    pub section_05_content: String,
    pub section_06_title: String,
    pub section_06_content: String,
    pub section_07_title: String,
    pub section_07_content: String,
    pub section_08_title: String,
    pub section_08_content: String,
    pub section_09_title: String,
    pub section_09_content: String,

    pub key_takeaway_01: String,
    pub key_takeaway_02: String,
    pub key_takeaway_03: String,

    pub faq_01_question: String,
    pub faq_01_answer: String,
    pub faq_02_question: String,
    pub faq_02_answer: String,
    pub faq_03_question: String,
    pub faq_03_answer: String,
    pub faq_04_question: String,
    pub faq_04_answer: String,
    pub faq_05_question: String,
    pub faq_05_answer: String,
    pub faq_06_question: String,
    pub faq_06_answer: String,

    pub paa_01_question: String,
    pub paa_01_answer: String,
    pub paa_02_question: String,
    pub paa_02_answer: String,
    pub paa_03_question: String,
    pub paa_03_answer: String,
    pub paa_04_question: String,
    pub paa_04_answer: String,

    pub image_01_url: String,
    pub image_01_alt_text: String,
    pub image_01_credit: String,
    pub image_02_url: String,
    pub image_02_alt_text: String,
    pub image_02_credit: String,
    pub image_03_url: String,
    pub image_03_alt_text: String,
    pub image_03_credit: String,

    /// Newline-delimited source list: `[N]: <url> – <title>`.
    #[serde(rename = "Sources")]
    pub sources: String,
    #[serde(rename = "Search_Queries")]
    pub search_queries: String,
    #[serde(rename = "TLDR")]
    pub tldr: String,

    pub tables: Vec<ArticleTable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ArticleTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Required top-level fields; missing any of these after extraction is fatal.
pub const REQUIRED_FIELDS: &[&str] = &[
    "Headline",
    "Subtitle",
    "Teaser",
    "Direct_Answer",
    "Intro",
    "Meta_Title",
    "Meta_Description",
];

impl ArticleOutput {
    /// Section at 1-based index, present iff its title is non-empty.
    pub fn section(&self, n: usize) -> Option<(&str, &str)> {
        let (title, content) = match n {
            1 => (&self.section_01_title, &self.section_01_content),
            2 => (&self.section_02_title, &self.section_02_content),
            3 => (&self.section_03_title, &self.section_03_content),
            4 => (&self.section_04_title, &self.section_04_content),
            5 => (&self.section_05_title, &self.section_05_content),
            6 => (&self.section_06_title, &self.section_06_content),
            7 => (&self.section_07_title, &self.section_07_content),
            8 => (&self.section_08_title, &self.section_08_content),
            9 => (&self.section_09_title, &self.section_09_content),
            _ => return None,
        };
        if title.trim().is_empty() {
            None
        } else {
            Some((title.as_str(), content.as_str()))
        }
    }

    /// Sections for rendering: dense from 01, terminated by the first empty
    /// title.
    pub fn rendered_sections(&self) -> Vec<(usize, &str, &str)> {
        let mut out = Vec::new();
        for n in 1..=9 {
            match self.section(n) {
                Some((title, content)) => out.push((n, title, content)),
                None => break,
            }
        }
        out
    }

    /// Every non-empty section, gaps tolerated.
    pub fn all_sections(&self) -> Vec<(usize, &str, &str)> {
        (1..=9).filter_map(|n| self.section(n).map(|(t, c)| (n, t, c))).collect()
    }

    pub fn key_takeaways(&self) -> Vec<&str> {
        [&self.key_takeaway_01, &self.key_takeaway_02, &self.key_takeaway_03]
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.as_str())
            .collect()
    }

    /// FAQ pairs in declared order, empty questions skipped.
    pub fn faq_pairs(&self) -> Vec<(&str, &str)> {
        [
            (&self.faq_01_question, &self.faq_01_answer),
            (&self.faq_02_question, &self.faq_02_answer),
            (&self.faq_03_question, &self.faq_03_answer),
            (&self.faq_04_question, &self.faq_04_answer),
            (&self.faq_05_question, &self.faq_05_answer),
            (&self.faq_06_question, &self.faq_06_answer),
        ]
        .into_iter()
        .filter(|(q, _)| !q.trim().is_empty())
        .map(|(q, a)| (q.as_str(), a.as_str()))
        .collect()
    }

    /// PAA pairs in declared order, empty questions skipped.
    pub fn paa_pairs(&self) -> Vec<(&str, &str)> {
        [
            (&self.paa_01_question, &self.paa_01_answer),
            (&self.paa_02_question, &self.paa_02_answer),
            (&self.paa_03_question, &self.paa_03_answer),
            (&self.paa_04_question, &self.paa_04_answer),
        ]
        .into_iter()
        .filter(|(q, _)| !q.trim().is_empty())
        .map(|(q, a)| (q.as_str(), a.as_str()))
        .collect()
    }

    /// Flatten to a JSON object keyed by the serialized field names.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Read a field by its serialized name.
    pub fn field(&self, name: &str) -> Option<String> {
        self.to_map().get(name).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Overwrite a string field by its serialized name. Unknown names are
    /// ignored; fields are never removed (the record is append-only).
    pub fn set_field(&mut self, name: &str, value: &str) {
        let mut map = self.to_map();
        if map.contains_key(name) {
            map.insert(name.to_string(), Value::String(value.to_string()));
            if let Ok(updated) = serde_json::from_value(Value::Object(map)) {
                *self = updated;
            }
        }
    }

    /// Names of required fields that are empty or missing.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let map = self.to_map();
        REQUIRED_FIELDS
            .iter()
            .filter(|name| {
                map.get(**name)
                    .and_then(|v| v.as_str())
                    .map(|s| s.trim().is_empty())
                    .unwrap_or(true)
            })
            .copied()
            .collect()
    }
}
