use std::path::PathBuf;
use thiserror::Error;

pub use crate::pipeline::error::{ErrorCode, Stage, StageError};

#[derive(Error, Debug)]
pub enum DeckforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::credentials::SecretError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("At least one URL is required")]
    EmptySubmission,

    #[error("Invalid URL '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Merging needs at least two URLs, got {count}")]
    MergeTooSmall { count: usize },

    #[error("The scheduler has been stopped")]
    Stopped,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("A global logger is already installed: {0}")]
    AlreadyInitialized(String),
}

pub type Result<T> = std::result::Result<T, DeckforgeError>;
