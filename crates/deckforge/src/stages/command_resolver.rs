//! Resolver that runs an external download tool.
//!
//! Each resolve gets its own directory under the work directory. The tool is
//! expected to write exactly one media file there; the directory is removed
//! by the returned cleanup.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::resolver::{InputResolver, ResolvedInput, ResourceHandle, ScopedCleanup};
use super::{StageUpdate, StatusCallback};
use crate::config::schema::ResolverConfig;
use crate::pipeline::error::{Stage, StageError};
use crate::sanitize;

/// Phrases in a tool's stderr that mean the resource cannot be fetched.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "unavailable",
    "private",
    "not found",
    "404",
    "removed",
    "does not exist",
];

/// Partial downloads some tools leave behind.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".tmp"];

pub struct CommandResolver {
    program: String,
    args: Vec<String>,
    work_directory: PathBuf,
}

impl CommandResolver {
    pub fn new(program: impl Into<String>, args: Vec<String>, work_directory: PathBuf) -> Self {
        Self {
            program: program.into(),
            args,
            work_directory,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.work_directory(),
        )
    }

    fn render_args(&self, locator: &str, output_dir: &Path) -> Vec<String> {
        let output_dir = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{url}", locator)
                    .replace("{output_dir}", &output_dir)
            })
            .collect()
    }

    fn tool_error(&self, detail: impl Into<String>) -> StageError {
        StageError::ToolInvocation {
            stage: Stage::Resolve,
            tool: self.program.clone(),
            detail: detail.into(),
        }
    }

    async fn download(
        &self,
        locator: &str,
        output_dir: &Path,
        on_status: StatusCallback<'_>,
    ) -> Result<ResourceHandle, StageError> {
        let args = self.render_args(locator, output_dir);
        on_status(StageUpdate::new(Stage::Resolve, 10, "Downloading media"));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.tool_error(format!("could not start: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&self.program, output.status.code(), &stderr));
        }

        on_status(StageUpdate::new(Stage::Resolve, 90, "Download finished"));

        let path = first_media_file(output_dir)
            .await
            .map_err(|e| self.tool_error(format!("could not read output directory: {}", e)))?
            .ok_or_else(|| StageError::EmptyResult {
                stage: Stage::Resolve,
                detail: "the download produced no media file".to_string(),
            })?;

        let media_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(ResourceHandle { path, media_type })
    }
}

#[async_trait]
impl InputResolver for CommandResolver {
    async fn resolve(
        &self,
        locator: &str,
        on_status: StatusCallback<'_>,
    ) -> Result<ResolvedInput, StageError> {
        on_status(StageUpdate::new(Stage::Resolve, 0, "Preparing download"));

        let output_dir = self.work_directory.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| {
            self.tool_error(format!(
                "could not create work directory '{}': {}",
                output_dir.display(),
                e
            ))
        })?;

        let cleanup = ScopedCleanup::new("download directory", {
            let dir = output_dir.clone();
            async move { tokio::fs::remove_dir_all(dir).await }
        });

        match self.download(locator, &output_dir, on_status).await {
            Ok(handle) => {
                debug!(
                    locator = %sanitize::redact_locator(locator),
                    file = %sanitize::redact_path(&handle.path),
                    media_type = %handle.media_type,
                    "Resolved input"
                );
                on_status(StageUpdate::new(Stage::Resolve, 100, "Media ready"));
                Ok(ResolvedInput { handle, cleanup })
            }
            Err(e) => {
                warn!(
                    locator = %sanitize::redact_locator(locator),
                    code = e.code().as_str(),
                    "Download failed"
                );
                cleanup.run().await;
                Err(e)
            }
        }
    }
}

fn classify_failure(program: &str, exit_code: Option<i32>, stderr: &str) -> StageError {
    let last_line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output");
    let detail: String = last_line.chars().take(200).collect();

    let lowered = stderr.to_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return StageError::Unavailable {
            stage: Stage::Resolve,
            detail,
        };
    }

    let status = match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    };
    StageError::ToolInvocation {
        stage: Stage::Resolve,
        tool: program.to_string(),
        detail: format!("{}: {}", status, detail),
    }
}

/// First regular, complete file in `dir`, by name.
async fn first_media_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files.into_iter().next())
}
