//! Job records and their externally visible summaries.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::SchedulerError;
use crate::pipeline::error::{ErrorCode, Stage, StageError};

static RE_LOCATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:https?)://([^/?#]*)(.*)$").unwrap());

/// How a job takes part in the pipeline. Fixed at creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JobMode {
    Individual,
    MergeParent,
    MergeChild,
}

/// Status of a job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Downloading,
    Transcribing,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// True while the job holds a concurrency slot.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobStatus::Downloading | JobStatus::Transcribing | JobStatus::Generating
        )
    }

    /// Status a job shows while the given stage runs.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Resolve => JobStatus::Downloading,
            Stage::Transform => JobStatus::Transcribing,
            Stage::Synthesize => JobStatus::Generating,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Downloading => write!(f, "downloading"),
            JobStatus::Transcribing => write!(f, "transcribing"),
            JobStatus::Generating => write!(f, "generating"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Output of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Transcribed text, or the labelled combined text for a merge parent.
    pub transcript: String,
    /// Reference to the generated presentation. Absent for merge children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_url: Option<String>,
}

/// Terminal failure of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub message: String,
    pub code: ErrorCode,
    pub retryable: bool,
}

impl From<&StageError> for JobFailure {
    fn from(err: &StageError) -> Self {
        Self {
            message: err.message(),
            code: err.code(),
            retryable: err.retryable(),
        }
    }
}

/// One schedulable unit of pipeline work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    /// Source URL. For a merge parent, the child locators joined with `", "`.
    pub locator: String,
    pub credentials: Arc<Credentials>,
    pub mode: JobMode,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<JobResult>,
    pub failure: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Submission order; breaks `created_at` ties when listing.
    pub seq: u64,
}

impl Job {
    fn new(locator: &str, credentials: Arc<Credentials>, mode: JobMode, seq: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            locator: locator.to_string(),
            credentials,
            mode,
            parent_id: None,
            child_ids: Vec::new(),
            status: JobStatus::Queued,
            progress: 0,
            message: "Waiting in queue".to_string(),
            result: None,
            failure: None,
            created_at: now,
            updated_at: now,
            seq,
        }
    }

    pub fn individual(locator: &str, credentials: Arc<Credentials>, seq: u64) -> Self {
        Self::new(locator, credentials, JobMode::Individual, seq)
    }

    pub fn merge_child(
        locator: &str,
        credentials: Arc<Credentials>,
        parent_id: &str,
        seq: u64,
    ) -> Self {
        let mut job = Self::new(locator, credentials, JobMode::MergeChild, seq);
        job.parent_id = Some(parent_id.to_string());
        job
    }

    /// Creates a parent with a pre-assigned id so children can reference it.
    pub fn merge_parent(
        id: String,
        locators: &[String],
        credentials: Arc<Credentials>,
        child_ids: Vec<String>,
        seq: u64,
    ) -> Self {
        let mut job = Self::new(&locators.join(", "), credentials, JobMode::MergeParent, seq);
        job.id = id;
        job.message = format!("Waiting for {} sources to be transcribed", child_ids.len());
        job.child_ids = child_ids;
        job
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a progress update. Progress never decreases and terminal
    /// jobs are left untouched. Returns whether anything changed.
    pub fn advance(&mut self, status: JobStatus, progress: u8, message: &str) -> bool {
        if self.is_finished() || status.is_terminal() {
            return false;
        }

        let progress = progress.min(100).max(self.progress);
        if self.status == status && self.progress == progress && self.message == message {
            return false;
        }

        self.status = status;
        self.progress = progress;
        self.message = message.to_string();
        self.updated_at = Utc::now();
        true
    }

    /// Marks the job completed. Returns false if it was already terminal.
    pub fn complete(&mut self, result: JobResult) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.message = "Completed".to_string();
        self.result = Some(result);
        self.updated_at = Utc::now();
        true
    }

    /// Marks the job failed. Returns false if it was already terminal.
    pub fn fail(&mut self, failure: JobFailure) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.message = "Failed".to_string();
        self.failure = Some(failure);
        self.updated_at = Utc::now();
        true
    }

    /// Credential-free view of the job.
    pub fn summary(&self) -> JobSummary {
        // Child transcripts only surface through their parent.
        let result = self.result.as_ref().map(|r| JobResultSummary {
            transcript: match self.mode {
                JobMode::MergeChild => None,
                _ => Some(r.transcript.clone()),
            },
            presentation_url: r.presentation_url.clone(),
        });

        JobSummary {
            id: self.id.clone(),
            locator: crate::sanitize::redact_locator(&self.locator),
            mode: self.mode,
            parent_id: self.parent_id.clone(),
            child_ids: self.child_ids.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            result,
            error: self.failure.as_ref().map(|f| f.message.clone()),
            error_code: self.failure.as_ref().map(|f| f.code),
            retryable: self.failure.as_ref().map(|f| f.retryable),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Result fields exposed in a [`JobSummary`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobResultSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_url: Option<String>,
}

/// Externally visible job state. Never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub locator: String,
    pub mode: JobMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Checks that a locator is an absolute http(s) URL with a host.
pub fn validate_locator(locator: &str) -> Result<(), SchedulerError> {
    let invalid = |reason: &str| SchedulerError::InvalidLocator {
        locator: crate::sanitize::redact_locator(locator),
        reason: reason.to_string(),
    };

    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }

    let caps = RE_LOCATOR
        .captures(trimmed)
        .ok_or_else(|| invalid("must start with http:// or https://"))?;

    let authority = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    if host.is_empty() {
        return Err(invalid("must include a host"));
    }

    Ok(())
}
