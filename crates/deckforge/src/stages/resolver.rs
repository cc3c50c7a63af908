use std::future::Future;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use super::StatusCallback;
use crate::pipeline::error::StageError;

/// A locally available input produced by an [`InputResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub path: PathBuf,
    pub media_type: String,
}

/// Release action for a resolved resource.
///
/// Run it with [`ScopedCleanup::run`]. If it is dropped without being run,
/// the action is spawned on the current tokio runtime. Failures are logged
/// and never returned.
pub struct ScopedCleanup {
    label: String,
    action: Option<BoxFuture<'static, io::Result<()>>>,
}

impl ScopedCleanup {
    pub fn new<F>(label: impl Into<String>, action: F) -> Self
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            action: Some(Box::pin(action)),
        }
    }

    /// A cleanup with nothing to release.
    pub fn noop() -> Self {
        Self {
            label: "noop".to_string(),
            action: None,
        }
    }

    pub async fn run(mut self) {
        if let Some(action) = self.action.take() {
            report(&self.label, action.await);
        }
    }
}

fn report(label: &str, outcome: io::Result<()>) {
    match outcome {
        Ok(()) => debug!(cleanup = label, "Released resolved input"),
        Err(e) => warn!(cleanup = label, error = %e, "Cleanup failed, ignoring"),
    }
}

impl Drop for ScopedCleanup {
    fn drop(&mut self) {
        let Some(action) = self.action.take() else {
            return;
        };
        let label = std::mem::take(&mut self.label);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { report(&label, action.await) });
            }
            Err(_) => warn!(cleanup = %label, "Cleanup dropped outside a runtime, skipping"),
        }
    }
}

impl std::fmt::Debug for ScopedCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCleanup")
            .field("label", &self.label)
            .field("pending", &self.action.is_some())
            .finish()
    }
}

/// Output of a successful resolve.
#[derive(Debug)]
pub struct ResolvedInput {
    pub handle: ResourceHandle,
    pub cleanup: ScopedCleanup,
}

/// Turns a locator into a local resource.
#[async_trait]
pub trait InputResolver: Send + Sync {
    async fn resolve(
        &self,
        locator: &str,
        on_status: StatusCallback<'_>,
    ) -> Result<ResolvedInput, StageError>;
}
