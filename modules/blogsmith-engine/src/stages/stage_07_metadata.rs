//! Stage 7: word count, read time, and a publication date drawn uniformly
//! from the last 90 days.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::json;
use tracing::debug;

use crate::context::{ContextView, Scratch};
use crate::html::count_words;
use crate::runtime::classify::StageError;
use crate::runtime::runner::ParallelStage;

const WORDS_PER_MINUTE: usize = 200;
const MAX_READ_TIME_MINUTES: u32 = 30;
const PUBLICATION_WINDOW_DAYS: i64 = 90;

pub struct MetadataStage;

impl MetadataStage {
    pub fn new() -> Self {
        Self
    }

    fn count_article_words(article: &blogsmith_common::ArticleOutput) -> usize {
        let mut words = 0;
        words += count_words(&article.headline);
        words += count_words(&article.teaser);
        words += count_words(&article.direct_answer);
        words += count_words(&article.intro);
        for (_, _, content) in article.all_sections() {
            words += count_words(content);
        }
        words
    }

    pub fn read_time_minutes(word_count: usize) -> u32 {
        let minutes = (word_count as f64 / WORDS_PER_MINUTE as f64).round() as u32;
        minutes.clamp(1, MAX_READ_TIME_MINUTES)
    }

    fn random_publication_date() -> String {
        let seconds_back =
            rand::rng().random_range(0..PUBLICATION_WINDOW_DAYS * 24 * 60 * 60);
        (Utc::now() - Duration::seconds(seconds_back))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string()
    }
}

#[async_trait]
impl ParallelStage for MetadataStage {
    fn stage_num(&self) -> u8 {
        7
    }

    fn stage_name(&self) -> &'static str {
        "stage_07_metadata"
    }

    async fn execute(&self, view: &ContextView<'_>) -> Result<Scratch, StageError> {
        let article = view.article()?;

        let word_count = Self::count_article_words(article);
        let read_time = Self::read_time_minutes(word_count);
        let publication_date = Self::random_publication_date();
        debug!(job_id = %view.job_id(), word_count, read_time, "Metadata computed");

        let mut scratch = Scratch::new();
        scratch.insert("word_count".to_string(), json!(word_count));
        scratch.insert("read_time".to_string(), json!(read_time));
        scratch.insert("publication_date".to_string(), json!(publication_date));
        scratch.insert(
            "metadata".to_string(),
            json!({
                "word_count": word_count,
                "read_time_minutes": read_time,
                "publication_date": publication_date,
            }),
        );
        Ok(scratch)
    }
}
