//! Immutable collaborator bundle handed to every stage.
//!
//! Pure assembly, no logic. The caller decides which implementations to
//! wire (live clients, or mocks when credentials are absent).

use std::sync::Arc;

use ai_client::{
    Embedder, GeminiGenerator, Generator, HttpEmbedder, ImageGenerator, ImagenClient,
    MockEmbedder, MockGenerator, MockImageGenerator,
};
use blogsmith_common::Config;
use blogsmith_crawler::SitemapCrawler;

use crate::runtime::breaker::Breakers;
use crate::runtime::report::ErrorReporter;
use crate::similarity::SimilarityChecker;
use crate::storage::{ArticleStore, NoopStore, SupabaseStore};

pub struct PipelineDeps {
    pub generator: Arc<dyn Generator>,
    pub image_generator: Arc<dyn ImageGenerator>,
    pub embedder: Arc<dyn Embedder>,
    pub crawler: Arc<SitemapCrawler>,
    pub store: Arc<dyn ArticleStore>,
    pub similarity: Arc<SimilarityChecker>,
    pub breakers: Arc<Breakers>,
    pub reporter: Arc<ErrorReporter>,
}

impl PipelineDeps {
    /// Wire production collaborators from config. Each missing credential
    /// downgrades its component to the mock/placeholder implementation.
    pub fn from_config(config: &Config) -> Self {
        let generator: Arc<dyn Generator> = if config.generator_api_key.is_empty() {
            tracing::warn!("GENERATOR_API_KEY absent, using mock generator");
            Arc::new(MockGenerator::new())
        } else {
            Arc::new(GeminiGenerator::new(
                &config.generator_api_key,
                &config.generator_model,
            ))
        };

        let image_generator: Arc<dyn ImageGenerator> = if config.image_api_key.is_empty() {
            tracing::warn!("IMAGE_API_KEY absent, using placeholder images");
            Arc::new(MockImageGenerator::new())
        } else {
            Arc::new(ImagenClient::new(&config.image_api_key))
        };

        let embedder: Arc<dyn Embedder> = if config.embedder_url.is_empty() {
            Arc::new(MockEmbedder)
        } else {
            Arc::new(HttpEmbedder::new(&config.embedder_url))
        };

        let store: Arc<dyn ArticleStore> =
            if config.supabase_url.is_empty() || config.supabase_key.is_empty() {
                tracing::warn!("Supabase credentials absent, storage runs in noop mode");
                Arc::new(NoopStore)
            } else {
                let mut store = SupabaseStore::new(&config.supabase_url, &config.supabase_key);
                if !config.drive_folder_id.is_empty() && !config.drive_access_token.is_empty() {
                    store = store.with_drive(crate::storage::DriveMirror::new(
                        &config.drive_access_token,
                        &config.drive_folder_id,
                    ));
                }
                Arc::new(store)
            };

        Self {
            generator,
            image_generator,
            embedder,
            crawler: Arc::new(SitemapCrawler::with_defaults()),
            store,
            similarity: Arc::new(SimilarityChecker::open(&config.fingerprints_path)),
            breakers: Arc::new(Breakers::default()),
            reporter: Arc::new(ErrorReporter::new()),
        }
    }

    /// Fully mocked bundle for tests.
    pub fn mocked() -> Self {
        Self {
            generator: Arc::new(MockGenerator::new()),
            image_generator: Arc::new(MockImageGenerator::new()),
            embedder: Arc::new(MockEmbedder),
            crawler: Arc::new(SitemapCrawler::with_defaults()),
            store: Arc::new(crate::storage::InMemoryStore::new()),
            similarity: Arc::new(SimilarityChecker::in_memory()),
            breakers: Arc::new(Breakers::default()),
            reporter: Arc::new(ErrorReporter::new()),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_image_generator(mut self, image_generator: Arc<dyn ImageGenerator>) -> Self {
        self.image_generator = image_generator;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ArticleStore>) -> Self {
        self.store = store;
        self
    }
}
