//! Per-job credentials and secret resolution.
//!
//! Jobs carry an opaque bag of named secrets for the remote services they
//! talk to. Secrets are held as [`SecretString`] so they never show up in
//! `Debug` output, and the bag itself is not serializable.
//!
//! Secrets can also be resolved from several sources in priority order:
//!
//! 1. **Direct value** - for quick local testing
//! 2. **File reference** - for the Docker secrets pattern (`/run/secrets/...`)
//! 3. **Env var reference** - for Kubernetes/production

use secrecy::SecretString;
use std::collections::BTreeMap;
use std::fs;

use crate::config::schema::CredentialSource;
use crate::pipeline::error::{Stage, StageError};

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Credential '{name}': {source}")]
    Named {
        name: String,
        #[source]
        source: Box<SecretError>,
    },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Opaque bag of named secrets.
#[derive(Default)]
pub struct Credentials {
    secrets: BTreeMap<String, SecretString>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a plain value.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, SecretString::from(value.into()));
        self
    }

    pub fn insert(&mut self, name: &str, secret: SecretString) {
        self.secrets.insert(name.to_string(), secret);
    }

    pub fn get(&self, name: &str) -> Option<&SecretString> {
        self.secrets.get(name)
    }

    /// Looks up a secret a stage cannot run without.
    pub fn require(&self, name: &str, stage: Stage) -> std::result::Result<&SecretString, StageError> {
        self.get(name).ok_or_else(|| StageError::Authentication {
            stage,
            detail: format!("no '{}' credential was provided", name),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Resolves every configured source into a credential bag.
    pub fn from_sources(sources: &BTreeMap<String, CredentialSource>) -> Result<Self> {
        let mut credentials = Self::new();
        for (name, source) in sources {
            let secret = resolve_secret(
                source.value.as_deref(),
                source.file.as_deref(),
                source.env_var.as_deref(),
            )
            .map_err(|e| SecretError::Named {
                name: name.clone(),
                source: Box::new(e),
            })?;
            credentials.insert(name, secret);
        }
        Ok(credentials)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("names", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves a secret from multiple sources in priority order:
/// 1. Direct value (if provided and non-empty)
/// 2. File contents (if path provided)
/// 3. Environment variable (if name provided)
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct {
        if !value.is_empty() {
            return Ok(SecretString::from(value.to_string()));
        }
    }

    if let Some(path) = file_path {
        if !path.is_empty() {
            let expanded = expand_home(path);
            return match fs::read_to_string(&expanded) {
                Ok(content) => Ok(SecretString::from(content.trim().to_string())),
                Err(e) => Err(SecretError::FileReadError {
                    path: expanded,
                    source: e,
                }),
            };
        }
    }

    if let Some(var_name) = env_var {
        if !var_name.is_empty() {
            return match std::env::var(var_name) {
                // Env vars may carry trailing newlines
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: var_name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: var_name.to_string(),
                }),
            };
        }
    }

    Err(SecretError::NoSourceProvided)
}

/// Expands `~` and `~/path` to the user's home directory.
///
/// `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
