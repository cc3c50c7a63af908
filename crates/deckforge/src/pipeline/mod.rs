pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use context::PipelineContext;
pub use error::{ErrorCode, Stage, StageError};
pub use progress::{NoopProgress, ProgressEvent, ProgressReporter, StageSlice, StageWeights};
pub use runner::Pipeline;
