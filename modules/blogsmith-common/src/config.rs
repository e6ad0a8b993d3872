use std::env;

/// Application configuration loaded from environment variables.
///
/// Absent credentials degrade the corresponding collaborator to its
/// mock/placeholder mode; startup never fails on a missing API key.
#[derive(Debug, Clone)]
pub struct Config {
    // Generator (LLM with web search + structured output)
    pub generator_api_key: String,
    pub generator_model: String,

    // Image generation
    pub image_api_key: String,

    // Embedding service
    pub embedder_url: String,

    // Storage (Supabase REST)
    pub supabase_url: String,
    pub supabase_key: String,

    // Optional Google Drive mirror
    pub drive_folder_id: String,
    pub drive_access_token: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Job manager
    pub jobs_db_path: String,
    pub max_concurrent_jobs: usize,

    // Content-similarity fingerprint store
    pub fingerprints_path: String,
}

impl Config {
    /// Load config for the API server and its embedded job manager.
    pub fn api_from_env() -> Self {
        Self {
            generator_api_key: env::var("GENERATOR_API_KEY")
                .or_else(|_| env::var("GEMINI_API_KEY"))
                .unwrap_or_default(),
            generator_model: env::var("GENERATOR_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-pro".to_string()),
            image_api_key: env::var("IMAGE_API_KEY").unwrap_or_default(),
            embedder_url: env::var("EMBEDDER_URL").unwrap_or_default(),
            supabase_url: env::var("SUPABASE_URL").unwrap_or_default(),
            supabase_key: env::var("SUPABASE_KEY")
                .or_else(|_| env::var("SUPABASE_SERVICE_ROLE_KEY"))
                .unwrap_or_default(),
            drive_folder_id: env::var("DRIVE_FOLDER_ID").unwrap_or_default(),
            drive_access_token: env::var("DRIVE_ACCESS_TOKEN").unwrap_or_default(),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            jobs_db_path: env::var("JOBS_DB_PATH").unwrap_or_else(|_| "jobs.db".to_string()),
            max_concurrent_jobs: env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            fingerprints_path: env::var("FINGERPRINTS_PATH")
                .unwrap_or_else(|_| "content_fingerprints.json".to_string()),
        }
    }

    /// Load config for a standalone worker (no web server fields needed).
    pub fn worker_from_env() -> Self {
        let mut config = Self::api_from_env();
        config.web_host = String::new();
        config.web_port = 0;
        config
    }

    /// Log the presence of each sensitive env var without leaking values.
    pub fn log_redacted(&self) {
        let vars = [
            ("GENERATOR_API_KEY", &self.generator_api_key),
            ("IMAGE_API_KEY", &self.image_api_key),
            ("EMBEDDER_URL", &self.embedder_url),
            ("SUPABASE_URL", &self.supabase_url),
            ("SUPABASE_KEY", &self.supabase_key),
            ("DRIVE_FOLDER_ID", &self.drive_folder_id),
            ("DRIVE_ACCESS_TOKEN", &self.drive_access_token),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}
