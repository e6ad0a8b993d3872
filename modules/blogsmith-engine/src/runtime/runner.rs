//! Stage contract and the dependency-aware runner.
//!
//! Stages 0–3 run strictly in order and may mutate the context. Stages 4–9
//! fan out cooperatively over a read-only view and return scratch fragments;
//! the runner merges them (collision = internal error). Stages 10–12 close
//! the run sequentially, with 11 gated on `review_prompts`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::{ContextView, ExecutionContext, Scratch};
use crate::runtime::classify::StageError;
use crate::runtime::report::ErrorReporter;

/// Total registered stages (0–12 inclusive); progress is reported against
/// this count.
pub const TOTAL_STAGES: usize = 13;

/// A sequential pipeline stage. `execute` must be idempotent over an already
/// advanced context: re-running may re-derive but never destroys.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Small integer for logging only; never used for ordering.
    fn stage_num(&self) -> u8;
    fn stage_name(&self) -> &'static str;
    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), StageError>;
}

/// A fan-out stage: reads the shared view, returns its own scratch keys.
#[async_trait]
pub trait ParallelStage: Send + Sync {
    fn stage_num(&self) -> u8;
    fn stage_name(&self) -> &'static str;
    async fn execute(&self, view: &ContextView<'_>) -> Result<Scratch, StageError>;
}

/// Invoked around stage execution: `(stage_name, sequence_index, completed)`.
/// Sequential stages fire once with `completed = false` when they start and
/// once with `true` when they finish; parallel stages fire only on
/// completion.
pub type ProgressCallback = Arc<dyn Fn(&str, usize, bool) + Send + Sync>;

pub struct PipelineRunner {
    head: Vec<Arc<dyn Stage>>,
    parallel: Vec<Arc<dyn ParallelStage>>,
    tail: Vec<Arc<dyn Stage>>,
    reporter: Arc<ErrorReporter>,
}

impl PipelineRunner {
    pub fn new(
        head: Vec<Arc<dyn Stage>>,
        parallel: Vec<Arc<dyn ParallelStage>>,
        tail: Vec<Arc<dyn Stage>>,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            head,
            parallel,
            tail,
            reporter,
        }
    }

    pub fn total_stages(&self) -> usize {
        self.head.len() + self.parallel.len() + self.tail.len()
    }

    /// Run the full pipeline over `ctx`. Cancellation is honored at stage
    /// boundaries; parallel-stage failures degrade (their scratch is simply
    /// absent) while sequential failures abort the run.
    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        let mut seq_index = 0usize;

        for stage in &self.head {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            info!(job_id = %ctx.job_id, stage = stage.stage_name(), "Running stage");
            Self::notify_started(&progress, stage.stage_name(), seq_index);
            stage.execute(ctx).await.map_err(|e| {
                self.report(ctx, stage.stage_name(), &e);
                e
            })?;
            Self::notify(&progress, stage.stage_name(), seq_index);
            seq_index += 1;
        }

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        // Fan-out: every stage sees the same read-only view and contributes
        // a disjoint set of scratch keys.
        let view = ContextView::new(ctx);
        let view_ref = &view;
        let results = join_all(self.parallel.iter().map(|stage| async move {
            let result = stage.execute(view_ref).await;
            (stage.stage_name(), result)
        }))
        .await;
        drop(view);

        for (i, (stage_name, result)) in results.into_iter().enumerate() {
            match result {
                Ok(scratch) => ctx.merge_scratch(stage_name, scratch)?,
                Err(e) if matches!(e, StageError::Internal(_)) => {
                    self.report(ctx, stage_name, &e);
                    return Err(e);
                }
                Err(e) => {
                    // Non-critical by construction: every fan-out stage has
                    // already applied its own fallback before erroring here.
                    self.report(ctx, stage_name, &e);
                    warn!(job_id = %ctx.job_id, stage = stage_name, error = %e, "Parallel stage degraded");
                }
            }
            Self::notify(&progress, stage_name, seq_index + i);
        }
        seq_index += self.parallel.len();

        for stage in &self.tail {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }

            let skip_review = stage.stage_num() == 11
                && ctx
                    .job_config
                    .review_prompts
                    .as_ref()
                    .map(|prompts| prompts.is_empty())
                    .unwrap_or(true);

            if skip_review {
                info!(job_id = %ctx.job_id, "No review prompts, skipping review iteration");
            } else {
                info!(job_id = %ctx.job_id, stage = stage.stage_name(), "Running stage");
                Self::notify_started(&progress, stage.stage_name(), seq_index);
                stage.execute(ctx).await.map_err(|e| {
                    self.report(ctx, stage.stage_name(), &e);
                    e
                })?;
            }
            Self::notify(&progress, stage.stage_name(), seq_index);
            seq_index += 1;
        }

        Ok(())
    }

    fn notify(progress: &Option<ProgressCallback>, stage_name: &str, seq_index: usize) {
        if let Some(callback) = progress {
            callback(stage_name, seq_index, true);
        }
    }

    fn notify_started(progress: &Option<ProgressCallback>, stage_name: &str, seq_index: usize) {
        if let Some(callback) = progress {
            callback(stage_name, seq_index, false);
        }
    }

    fn report(&self, ctx: &ExecutionContext, stage_name: &str, error: &StageError) {
        self.reporter.report(
            error.category(),
            error.severity(),
            stage_name,
            Some(&ctx.job_id),
            &error.to_string(),
        );
    }
}
