use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use crate::job::{JobMode, JobResult, JobStatus};
use crate::sanitize;
use crate::stages::{
    InputResolver, ResolvedInput, StageUpdate, StatusCallback, Synthesizer, Transformer,
};

use super::context::PipelineContext;
use super::error::{Stage, StageError};
use super::progress::{ProgressEvent, ProgressReporter, StageWeights};

/// Sequences resolve, transform and synthesize for one job.
#[derive(Clone)]
pub struct Pipeline {
    resolver: Arc<dyn InputResolver>,
    transformer: Arc<dyn Transformer>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl Pipeline {
    pub fn new(
        resolver: Arc<dyn InputResolver>,
        transformer: Arc<dyn Transformer>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            resolver,
            transformer,
            synthesizer,
        }
    }

    /// Runs every stage the job's mode needs.
    ///
    /// Merge children stop after transform and complete with their
    /// transcript only. The resolved input is released once transform
    /// ends, whatever its outcome.
    pub async fn run(
        &self,
        ctx: &PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<JobResult, StageError> {
        let span = info_span!("pipeline",
            job_id = %ctx.job_id,
            locator = %sanitize::redact_locator(&ctx.locator),
            mode = ?ctx.mode,
        );
        self.run_stages(ctx, progress).instrument(span).await
    }

    async fn run_stages(
        &self,
        ctx: &PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<JobResult, StageError> {
        let weights = StageWeights::for_mode(ctx.mode);
        let on_status = |update: StageUpdate| report(progress, weights, update);

        // Step 1: Resolve
        on_status(StageUpdate::new(Stage::Resolve, 0, "Downloading media"));
        let ResolvedInput { handle, cleanup } = self
            .resolver
            .resolve(&ctx.locator, &on_status)
            .instrument(info_span!("resolve"))
            .await?;
        on_status(StageUpdate::new(Stage::Resolve, 100, "Media downloaded"));

        // Step 2: Transform, then release the input
        on_status(StageUpdate::new(Stage::Transform, 0, "Transcribing audio"));
        let transcript = self
            .transformer
            .transform(&handle, &ctx.credentials, &on_status)
            .instrument(info_span!("transform"))
            .await;
        cleanup.run().await;

        let transcript = transcript?;
        if transcript.trim().is_empty() {
            return Err(StageError::empty_transcript());
        }
        on_status(StageUpdate::new(Stage::Transform, 100, "Transcription finished"));

        if ctx.mode == JobMode::MergeChild {
            debug!(chars = transcript.len(), "Child transcript ready");
            return Ok(JobResult {
                transcript,
                presentation_url: None,
            });
        }

        // Step 3: Synthesize
        on_status(StageUpdate::new(
            Stage::Synthesize,
            0,
            "Generating presentation",
        ));
        let url = self.synthesize_with(&transcript, ctx, &on_status).await?;

        Ok(JobResult {
            transcript,
            presentation_url: Some(url),
        })
    }

    /// Synthesize stage for a merge parent whose children are all done.
    ///
    /// Returns the artifact URL; progress continues from 75.
    pub async fn synthesize_merged(
        &self,
        ctx: &PipelineContext,
        combined: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<String, StageError> {
        let span = info_span!("merge_synthesis",
            job_id = %ctx.job_id,
            chars = combined.len(),
        );

        async {
            progress.report(ProgressEvent {
                status: JobStatus::Generating,
                progress: 75,
                message: "Generating presentation from all sources".to_string(),
            });
            let on_status =
                |update: StageUpdate| report(progress, StageWeights::FULL, update);
            self.synthesize_with(combined, ctx, &on_status).await
        }
        .instrument(span)
        .await
    }

    async fn synthesize_with(
        &self,
        text: &str,
        ctx: &PipelineContext,
        on_status: StatusCallback<'_>,
    ) -> Result<String, StageError> {
        let url = self
            .synthesizer
            .synthesize(text, &ctx.credentials, on_status)
            .instrument(info_span!("synthesize"))
            .await?;
        on_status(StageUpdate::new(
            Stage::Synthesize,
            100,
            "Presentation ready",
        ));
        Ok(url)
    }
}

fn report(progress: &dyn ProgressReporter, weights: StageWeights, update: StageUpdate) {
    progress.report(ProgressEvent {
        status: JobStatus::for_stage(update.stage),
        progress: weights.overall(update.stage, update.progress),
        message: update.message,
    });
}
