use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlogsmithError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("Crawling error: {0}")]
    Crawling(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
