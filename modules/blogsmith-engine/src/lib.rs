pub mod aeo;
pub mod context;
pub mod deps;
pub mod html;
pub mod quality;
pub mod render;
pub mod runtime;
pub mod similarity;
pub mod stages;
pub mod storage;

pub use context::{ContextView, ExecutionContext, Scratch};
pub use deps::PipelineDeps;
pub use runtime::runner::{PipelineRunner, ProgressCallback, TOTAL_STAGES};
pub use runtime::classify::{ErrorCategory, Severity, StageError};
pub use similarity::{SimilarityChecker, SimilarityReport};
pub use stages::build_production_runner;
pub use storage::{ArticleStore, DriveMirror, InMemoryStore, NoopStore, SupabaseStore};
