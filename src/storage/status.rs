//! Status Reporter - externalizes the loop state for health checks.
//!
//! The file is replaced atomically (write temp, rename) so readers never
//! observe a half-written record.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::frame_store::StoreError;
use crate::types::{PipelinePhase, PipelineStatus};

/// Writes [`PipelineStatus`] records to a fixed path.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    path: PathBuf,
}

impl StatusReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `phase` with the current buffer occupancy.
    pub fn report(&self, phase: PipelinePhase, buffer_count: usize, target_count: usize) -> Result<(), StoreError> {
        self.write(&PipelineStatus::new(phase, buffer_count, target_count))
    }

    /// Record the generic error status.
    pub fn report_error(&self) -> Result<(), StoreError> {
        self.write(&PipelineStatus::error())
    }

    pub fn write(&self, status: &PipelineStatus) -> Result<(), StoreError> {
        let io = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io)?;
            }
        }
        let json = serde_json::to_vec_pretty(status)
            .map_err(|e| io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io)?;
        fs::rename(&tmp, &self.path).map_err(io)?;
        debug!(phase = %status.phase, buffer = status.buffer_count, "Status updated");
        Ok(())
    }

    /// Read the current record back (tests and `check-config`).
    pub fn read(&self) -> Option<PipelineStatus> {
        let bytes = fs::read(&self.path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
