//! Collaborators the pipeline drives: an input resolver, a transformer and
//! a synthesizer, plus adapters that build the latter two from remote
//! start/check APIs.

pub mod command_resolver;
pub mod operations;
pub mod remote;
pub mod resolver;

pub use command_resolver::CommandResolver;
pub use operations::{Synthesizer, Transformer};
pub use remote::{PolledSynthesizer, PolledTransformer, RemoteOperation};
pub use resolver::{InputResolver, ResolvedInput, ResourceHandle, ScopedCleanup};

use crate::pipeline::error::Stage;

/// Stage-local progress reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub stage: Stage,
    /// 0..=100 within the stage.
    pub progress: u8,
    pub message: String,
}

impl StageUpdate {
    pub fn new(stage: Stage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.min(100),
            message: message.into(),
        }
    }
}

/// Callback a collaborator invokes with its stage-local progress.
pub type StatusCallback<'a> = &'a (dyn Fn(StageUpdate) + Send + Sync);
