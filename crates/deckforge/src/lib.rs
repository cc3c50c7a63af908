pub mod broadcast;
pub mod config;
pub mod credentials;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod poll;
pub mod sanitize;
pub mod scheduler;
pub mod stages;

pub use broadcast::{JobCounts, JobEvent, JobEventBroadcaster, JobStore};
pub use config::{load_config, load_config_from_str, Config};
pub use credentials::{resolve_secret, Credentials, SecretError};
pub use error::{
    ConfigError, DeckforgeError, ErrorCode, LoggingError, Result, SchedulerError, Stage,
    StageError,
};
pub use job::{Job, JobMode, JobResult, JobStatus, JobSummary};
pub use logging::init_logging;
pub use pipeline::{Pipeline, PipelineContext};
pub use poll::{PollPolicy, PollState, Sleeper, TokioSleeper};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use stages::{
    CommandResolver, InputResolver, PolledSynthesizer, PolledTransformer, RemoteOperation,
    ResolvedInput, ResourceHandle, ScopedCleanup, StageUpdate, Synthesizer, Transformer,
};
