pub mod stage_00_data_fetch;
pub mod stage_01_prompt;
pub mod stage_02_generate;
pub mod stage_03_extraction;
pub mod stage_04_citations;
pub mod stage_05_internal_links;
pub mod stage_06_toc;
pub mod stage_07_metadata;
pub mod stage_08_faq_paa;
pub mod stage_09_image;
pub mod stage_10_cleanup;
pub mod stage_11_review;
pub mod stage_12_storage;

use std::sync::Arc;

use crate::deps::PipelineDeps;
use crate::runtime::runner::{ParallelStage, PipelineRunner, Stage};

/// Assemble the production pipeline: 0–3 sequential, 4–9 fan-out, 10–12 tail.
pub fn build_production_runner(deps: Arc<PipelineDeps>) -> PipelineRunner {
    let head: Vec<Arc<dyn Stage>> = vec![
        Arc::new(stage_00_data_fetch::DataFetchStage::new(deps.clone())),
        Arc::new(stage_01_prompt::PromptBuildStage::new()),
        Arc::new(stage_02_generate::GenerateStage::new(deps.clone())),
        Arc::new(stage_03_extraction::ExtractionStage::new(deps.clone())),
    ];

    let parallel: Vec<Arc<dyn ParallelStage>> = vec![
        Arc::new(stage_04_citations::CitationsStage::new(deps.clone())),
        Arc::new(stage_05_internal_links::InternalLinksStage::new(deps.clone())),
        Arc::new(stage_06_toc::TocStage::new()),
        Arc::new(stage_07_metadata::MetadataStage::new()),
        Arc::new(stage_08_faq_paa::FaqPaaStage::new()),
        Arc::new(stage_09_image::ImageStage::new(deps.clone())),
    ];

    let tail: Vec<Arc<dyn Stage>> = vec![
        Arc::new(stage_10_cleanup::CleanupStage::new(deps.clone())),
        Arc::new(stage_11_review::ReviewIterationStage::new(deps.clone())),
        Arc::new(stage_12_storage::StorageStage::new(deps.clone())),
    ];

    PipelineRunner::new(head, parallel, tail, deps.reporter.clone())
}
