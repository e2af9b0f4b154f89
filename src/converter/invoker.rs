//! Subprocess invocation for the conversion tools.
//!
//! The gateway talks to a [`ToolInvoker`] so tests can swap the real
//! subprocess for an in-process fake.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::ConverterError;

/// One tool run.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub binary: PathBuf,
    pub args: Vec<OsString>,
    /// Isolated working directory for this call
    pub workdir: PathBuf,
    /// Directory passed to the tool with `-out_dir`
    pub out_dir: PathBuf,
    pub timeout: Duration,
}

impl ToolRequest {
    pub fn tool_name(&self) -> String {
        self.binary
            .file_name()
            .map_or_else(|| self.binary.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// What the tool printed and how it exited.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput, ConverterError>;
}

/// Runs the tool as a child process under a timeout.
///
/// The child is killed when the timeout fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput, ConverterError> {
        let tool = request.tool_name();
        let mut cmd = Command::new(&request.binary);
        cmd.args(&request.args)
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(tool = %tool, args = ?request.args, "Spawning converter");

        let output = match tokio::time::timeout(request.timeout, cmd.output()).await {
            Err(_) => {
                return Err(ConverterError::Timeout {
                    tool,
                    secs: request.timeout.as_secs_f64(),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConverterError::ToolMissing { tool })
            }
            Ok(Err(e)) => return Err(ConverterError::Io(e)),
            Ok(Ok(output)) => output,
        };

        Ok(ToolOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
