use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_transcription_poll")]
    pub transcription_poll: PollSettings,
    #[serde(default = "default_generation_poll")]
    pub generation_poll: PollSettings,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named credential sources callers may resolve instead of passing secrets inline.
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialSource>,
}

fn default_max_concurrency() -> usize {
    2
}

fn default_event_capacity() -> usize {
    1024
}

fn default_transcription_poll() -> PollSettings {
    PollSettings {
        interval_ms: 3000,
        max_attempts: 200,
    }
}

fn default_generation_poll() -> PollSettings {
    PollSettings {
        interval_ms: 5000,
        max_attempts: 120,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            max_concurrency: default_max_concurrency(),
            event_capacity: default_event_capacity(),
            transcription_poll: default_transcription_poll(),
            generation_poll: default_generation_poll(),
            resolver: ResolverConfig::default(),
            logging: LoggingConfig::default(),
            credentials: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Argument template; `{url}` and `{output_dir}` are substituted per job.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub work_directory: Option<PathBuf>,
}

fn default_program() -> String {
    "yt-dlp".to_string()
}

fn default_args() -> Vec<String> {
    [
        "--no-playlist",
        "--quiet",
        "-f",
        "bestaudio/best",
        "-o",
        "{output_dir}/%(id)s.%(ext)s",
        "{url}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl ResolverConfig {
    /// Configured work directory, or `<cache dir>/deckforge/downloads`.
    pub fn work_directory(&self) -> PathBuf {
        self.work_directory.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("deckforge")
                .join("downloads")
        })
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            work_directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// Where to find one secret. The first non-empty source wins, in field order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialSource {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
}
