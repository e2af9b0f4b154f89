//! Converter Gateway - external format conversion, one file per call
//!
//! Each call runs the tool in its own temporary directory, picks the newest
//! output file with the tool's own extension, renames it to the canonical
//! `<UTC timestamp>.<ext>` of the pipeline and moves it to the destination
//! directory. The
//! temporary directory is removed when the call returns, whatever the
//! outcome.
//!
//! In the forward direction the raw input is always moved to the raw archive,
//! even when conversion fails, so the inbox never sees it again.

pub mod invoker;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use invoker::{ProcessInvoker, ToolInvoker, ToolOutput, ToolRequest};

use crate::config::{ConverterConfig, ToolConfig};
use crate::storage::frame_store::{list_files, move_file};
use crate::storage::timestamp::{canonical_name, frame_timestamp_or_mtime, parse_frame_timestamp};

/// Characters of stderr kept in a `ToolFailed` error.
const STDERR_TAIL_CHARS: usize = 2_000;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConverterError {
    #[error("Conversion tool not available: {tool}")]
    ToolMissing { tool: String },

    #[error("{tool} failed (exit code {code:?}): {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} exited cleanly but produced no .{extension} file")]
    NoOutputProduced { tool: String, extension: String },

    #[error("{tool} timed out after {secs:.1}s")]
    Timeout { tool: String, secs: f64 },

    #[error("Converter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Direction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Raw volume -> grid document
    Forward,
    /// Grid document -> raw volume
    Reverse,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

// ============================================================================
// Tool Spec
// ============================================================================

/// A tool whose binary has been located.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub binary: PathBuf,
    pub params_file: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub timeout: Duration,
    /// What the tool writes, when it differs from the pipeline's extension
    pub output_extension: Option<String>,
}

impl ToolSpec {
    /// Locate `config.binary` (absolute path or PATH lookup).
    pub fn resolve(config: &ToolConfig) -> Result<Self, ConverterError> {
        let binary = which::which(&config.binary).map_err(|_| ConverterError::ToolMissing {
            tool: config.binary.clone(),
        })?;
        Ok(Self::unresolved(binary, config))
    }

    /// Use `binary` as given, without checking it exists.
    pub fn unresolved(binary: PathBuf, config: &ToolConfig) -> Self {
        Self {
            binary,
            params_file: config.params_file.clone(),
            extra_args: config.extra_args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_extension: config.output_extension.clone(),
        }
    }

    fn arguments(&self, input: &Path, out_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(params) = &self.params_file {
            args.push("-params".into());
            args.push(params.clone().into_os_string());
        }
        args.push("-f".into());
        args.push(input.as_os_str().to_owned());
        args.push("-out_dir".into());
        args.push(out_dir.as_os_str().to_owned());
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }
}

// ============================================================================
// Gateway
// ============================================================================

pub struct ConverterGateway {
    invoker: Arc<dyn ToolInvoker>,
    forward: ToolSpec,
    reverse: Option<ToolSpec>,
    raw_extension: String,
    converted_extension: String,
    raw_archive: PathBuf,
}

impl ConverterGateway {
    /// Resolve both tools. A missing forward tool is fatal; a missing
    /// reverse tool only disables reverse conversion.
    pub fn from_config(
        config: &ConverterConfig,
        invoker: Arc<dyn ToolInvoker>,
        raw_extension: &str,
        converted_extension: &str,
        raw_archive: &Path,
    ) -> Result<Self, ConverterError> {
        let forward = ToolSpec::resolve(&config.forward)?;
        info!(tool = %forward.binary.display(), "Forward converter located");

        let reverse = if config.reverse_enabled {
            match ToolSpec::resolve(&config.reverse) {
                Ok(spec) => {
                    info!(tool = %spec.binary.display(), "Reverse converter located");
                    Some(spec)
                }
                Err(e) => {
                    warn!(error = %e, "Reverse converter unavailable — forecasts stay in grid format only");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(
            invoker,
            forward,
            reverse,
            raw_extension,
            converted_extension,
            raw_archive,
        ))
    }

    pub fn new(
        invoker: Arc<dyn ToolInvoker>,
        forward: ToolSpec,
        reverse: Option<ToolSpec>,
        raw_extension: &str,
        converted_extension: &str,
        raw_archive: &Path,
    ) -> Self {
        Self {
            invoker,
            forward,
            reverse,
            raw_extension: raw_extension.to_string(),
            converted_extension: converted_extension.to_string(),
            raw_archive: raw_archive.to_path_buf(),
        }
    }

    pub fn reverse_available(&self) -> bool {
        self.reverse.is_some()
    }

    /// Convert `input` and place the result in `dest_dir`.
    ///
    /// Forward conversions archive `input` whatever the outcome.
    pub async fn convert(
        &self,
        input: &Path,
        direction: Direction,
        dest_dir: &Path,
    ) -> Result<PathBuf, ConverterError> {
        let timestamp = parse_frame_timestamp(input).value();
        let result = match direction {
            Direction::Forward => {
                self.run_tool(&self.forward, input, dest_dir, &self.converted_extension, timestamp)
                    .await
            }
            Direction::Reverse => match &self.reverse {
                Some(spec) => self.run_tool(spec, input, dest_dir, &self.raw_extension, timestamp).await,
                None => Err(ConverterError::ToolMissing {
                    tool: "reverse converter".to_string(),
                }),
            },
        };

        if direction == Direction::Forward {
            self.archive_input(input);
        }

        match &result {
            Ok(out) => debug!(%direction, input = %input.display(), output = %out.display(), "Conversion complete"),
            Err(e) => warn!(%direction, input = %input.display(), error = %e, "Conversion failed"),
        }
        result
    }

    fn archive_input(&self, input: &Path) {
        let Some(name) = input.file_name() else { return };
        let dest = self.raw_archive.join(name);
        if let Err(e) = move_file(input, &dest) {
            warn!(input = %input.display(), error = %e, "Failed to archive raw input");
        }
    }

    async fn run_tool(
        &self,
        spec: &ToolSpec,
        input: &Path,
        dest_dir: &Path,
        extension: &str,
        timestamp: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<PathBuf, ConverterError> {
        let workdir = tempfile::Builder::new().prefix("hailcast-conv-").tempdir()?;
        let out_dir = workdir.path().join("out");
        std::fs::create_dir_all(&out_dir)?;

        let request = ToolRequest {
            binary: spec.binary.clone(),
            args: spec.arguments(input, &out_dir),
            workdir: workdir.path().to_path_buf(),
            out_dir: out_dir.clone(),
            timeout: spec.timeout,
        };
        let tool = request.tool_name();
        let output = self.invoker.invoke(&request).await?;

        if !output.stdout.trim().is_empty() {
            debug!(tool = %tool, stdout = %output.stdout.trim(), "Converter stdout");
        }
        if !output.success {
            return Err(ConverterError::ToolFailed {
                tool,
                code: output.exit_code,
                stderr: tail(&output.stderr, STDERR_TAIL_CHARS),
            });
        }

        let produced_extension = spec.output_extension.as_deref().unwrap_or(extension);
        let produced = newest_file(workdir.path(), produced_extension)?.ok_or_else(|| {
            ConverterError::NoOutputProduced {
                tool: tool.clone(),
                extension: produced_extension.to_string(),
            }
        })?;

        // Input name, then output name, then input mtime.
        let at = timestamp
            .or_else(|| parse_frame_timestamp(&produced).value())
            .unwrap_or_else(|| frame_timestamp_or_mtime(input));

        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(canonical_name(at, extension));
        move_file(&produced, &dest)?;
        Ok(dest)
        // `workdir` dropped here: the sandbox is deleted on every path
    }
}

/// Newest file (by modification time) under `dir` with `extension`.
fn newest_file(dir: &Path, extension: &str) -> Result<Option<PathBuf>, ConverterError> {
    let files = list_files(dir, extension, true).map_err(|e| match e {
        crate::storage::StoreError::Io { source, .. } => ConverterError::Io(source),
    })?;
    Ok(files
        .into_iter()
        .filter_map(|p| {
            let modified = std::fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, p)| p))
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - max_chars).collect()
    }
}
