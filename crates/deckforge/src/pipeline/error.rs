use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of the pipeline a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Transform,
    Synthesize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Resolve => write!(f, "Download"),
            Stage::Transform => write!(f, "Transcription"),
            Stage::Synthesize => write!(f, "Presentation generation"),
        }
    }
}

/// Stable machine-readable classification of a [`StageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Authentication,
    QuotaExhausted,
    RateLimited,
    Unavailable,
    EmptyResult,
    RemoteFailed,
    Timeout,
    ToolInvocation,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Authentication => "authentication",
            ErrorCode::QuotaExhausted => "quota_exhausted",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::EmptyResult => "empty_result",
            ErrorCode::RemoteFailed => "remote_failed",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ToolInvocation => "tool_invocation",
            ErrorCode::Unknown => "unknown",
        }
    }
}

/// A classified failure of one pipeline stage.
///
/// The `Display` output is meant to be shown to users as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("{stage} failed: the service rejected the credentials ({detail})")]
    Authentication { stage: Stage, detail: String },

    #[error("{stage} failed: account quota or credits exhausted ({detail})")]
    QuotaExhausted { stage: Stage, detail: String },

    #[error("{stage} failed: rate limited by the service, try again later ({detail})")]
    RateLimited { stage: Stage, detail: String },

    #[error("{stage} failed: the resource is private, missing or unavailable ({detail})")]
    Unavailable { stage: Stage, detail: String },

    #[error("{stage} failed: {detail}")]
    EmptyResult { stage: Stage, detail: String },

    #[error("{stage} failed: {reason}")]
    RemoteFailed { stage: Stage, reason: String },

    #[error("{stage} timed out after {attempts} status checks ({}s)", .waited.as_secs())]
    Timeout {
        stage: Stage,
        attempts: u32,
        waited: Duration,
    },

    #[error("{stage} failed: '{tool}' could not complete ({detail})")]
    ToolInvocation {
        stage: Stage,
        tool: String,
        detail: String,
    },

    #[error("{stage} failed: {detail}")]
    Unknown { stage: Stage, detail: String },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Authentication { stage, .. }
            | StageError::QuotaExhausted { stage, .. }
            | StageError::RateLimited { stage, .. }
            | StageError::Unavailable { stage, .. }
            | StageError::EmptyResult { stage, .. }
            | StageError::RemoteFailed { stage, .. }
            | StageError::Timeout { stage, .. }
            | StageError::ToolInvocation { stage, .. }
            | StageError::Unknown { stage, .. } => *stage,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            StageError::Authentication { .. } => ErrorCode::Authentication,
            StageError::QuotaExhausted { .. } => ErrorCode::QuotaExhausted,
            StageError::RateLimited { .. } => ErrorCode::RateLimited,
            StageError::Unavailable { .. } => ErrorCode::Unavailable,
            StageError::EmptyResult { .. } => ErrorCode::EmptyResult,
            StageError::RemoteFailed { .. } => ErrorCode::RemoteFailed,
            StageError::Timeout { .. } => ErrorCode::Timeout,
            StageError::ToolInvocation { .. } => ErrorCode::ToolInvocation,
            StageError::Unknown { .. } => ErrorCode::Unknown,
        }
    }

    /// Advisory only: nothing in the scheduler re-runs a failed stage.
    pub fn retryable(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::RateLimited
                | ErrorCode::RemoteFailed
                | ErrorCode::Timeout
                | ErrorCode::ToolInvocation
                | ErrorCode::Unknown
        )
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Classifies an HTTP error response returned by a remote service.
    pub fn from_http_status(stage: Stage, status: u16, body: &str) -> Self {
        let detail = summarize_body(status, body);
        match status {
            401 | 403 => StageError::Authentication { stage, detail },
            402 => StageError::QuotaExhausted { stage, detail },
            429 => StageError::RateLimited { stage, detail },
            404 | 410 => StageError::Unavailable { stage, detail },
            500..=599 => StageError::RemoteFailed {
                stage,
                reason: format!("the service reported an internal error ({detail})"),
            },
            _ => StageError::Unknown { stage, detail },
        }
    }

    pub fn empty_transcript() -> Self {
        StageError::EmptyResult {
            stage: Stage::Transform,
            detail: "no speech was detected in the media".to_string(),
        }
    }
}

/// Keeps remote bodies short enough to show to a user.
fn summarize_body(status: u16, body: &str) -> String {
    const MAX_BODY: usize = 160;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {}", status);
    }
    let mut summary: String = trimmed.chars().take(MAX_BODY).collect();
    if trimmed.chars().count() > MAX_BODY {
        summary.push('…');
    }
    format!("HTTP {}: {}", status, summary)
}
