use std::sync::Arc;

use crate::credentials::Credentials;
use crate::job::{Job, JobMode};

/// What the pipeline needs to know about the job it drives.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub job_id: String,
    pub locator: String,
    pub mode: JobMode,
    pub credentials: Arc<Credentials>,
}

impl PipelineContext {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            locator: job.locator.clone(),
            mode: job.mode,
            credentials: Arc::clone(&job.credentials),
        }
    }
}
