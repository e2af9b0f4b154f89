//! Frame Store - filesystem-backed frame queues
//!
//! The directories are the durable state of the pipeline:
//!
//! - raw inbox: volumes delivered by the radar, possibly in date subdirectories
//! - raw processing: the single volume currently being converted (claim)
//! - raw archive: every raw volume once handed to the converter
//! - converted buffer: grid documents forming the sliding window
//! - converted archive: frames evicted from the window
//!
//! Listings are sorted by the timestamp parsed from the file name, so a
//! restart resumes exactly where the previous run stopped.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::timestamp::{canonical_name, frame_timestamp_or_mtime};
use crate::config::{PathsConfig, WindowConfig};
use crate::types::{Frame, FrameFormat};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Filesystem queues for raw and converted frames.
#[derive(Debug, Clone)]
pub struct FrameStore {
    raw_inbox: PathBuf,
    raw_processing: PathBuf,
    raw_archive: PathBuf,
    converted_buffer: PathBuf,
    converted_archive: PathBuf,
    raw_extension: String,
    converted_extension: String,
}

impl FrameStore {
    /// Create or open the store, creating every directory.
    pub fn open(paths: &PathsConfig, window: &WindowConfig) -> Result<Self, StoreError> {
        let store = Self {
            raw_inbox: paths.raw_inbox.clone(),
            raw_processing: paths.raw_processing.clone(),
            raw_archive: paths.raw_archive.clone(),
            converted_buffer: paths.converted_buffer.clone(),
            converted_archive: paths.converted_archive.clone(),
            raw_extension: window.raw_extension.clone(),
            converted_extension: window.converted_extension.clone(),
        };
        for dir in [
            &store.raw_inbox,
            &store.raw_processing,
            &store.raw_archive,
            &store.converted_buffer,
            &store.converted_archive,
        ] {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }

        let pending = store.raw_frames()?.len();
        let buffered = store.converted_frames()?.len();
        info!(
            inbox = %store.raw_inbox.display(),
            pending_raw = pending,
            buffered_converted = buffered,
            "Frame store opened"
        );
        Ok(store)
    }

    pub fn raw_extension(&self) -> &str {
        &self.raw_extension
    }

    pub fn converted_extension(&self) -> &str {
        &self.converted_extension
    }

    pub fn converted_buffer_dir(&self) -> &Path {
        &self.converted_buffer
    }

    pub fn raw_archive_dir(&self) -> &Path {
        &self.raw_archive
    }

    /// Move claims left behind by a crashed run back to the inbox.
    ///
    /// Each leftover gets exactly one more attempt.
    pub fn recover_claims(&self) -> Result<usize, StoreError> {
        let leftovers = list_files(&self.raw_processing, &self.raw_extension, false)?;
        for path in &leftovers {
            let Some(name) = path.file_name() else { continue };
            let dest = self.raw_inbox.join(name);
            move_file(path, &dest).map_err(io_err(path))?;
            warn!(file = %dest.display(), "Recovered interrupted conversion back to inbox");
        }
        Ok(leftovers.len())
    }

    // ========================================================================
    // Raw side
    // ========================================================================

    /// Raw frames in the inbox, oldest first. Date subdirectories are scanned.
    pub fn raw_frames(&self) -> Result<Vec<Frame>, StoreError> {
        let files = list_files(&self.raw_inbox, &self.raw_extension, true)?;
        Ok(sorted_frames(files, FrameFormat::Raw))
    }

    /// The oldest raw frame in the inbox, if any.
    pub fn oldest_raw(&self) -> Result<Option<Frame>, StoreError> {
        Ok(self.raw_frames()?.into_iter().next())
    }

    /// Move a raw frame from the inbox into the processing directory.
    ///
    /// The claimed file gets a canonical name so the scan time survives
    /// leaving its date subdirectory.
    pub fn claim(&self, frame: &Frame) -> Result<Frame, StoreError> {
        let dest = self
            .raw_processing
            .join(canonical_name(frame.timestamp, &self.raw_extension));
        move_file(&frame.path, &dest).map_err(io_err(&frame.path))?;
        debug!(from = %frame.path.display(), to = %dest.display(), "Raw frame claimed");
        Ok(Frame::new(dest, frame.timestamp, FrameFormat::Raw))
    }

    /// Move a raw file into the raw archive. Overwrites a same-named entry.
    pub fn archive_raw(&self, path: &Path) -> Result<PathBuf, StoreError> {
        archive_into(path, &self.raw_archive)
    }

    // ========================================================================
    // Converted side
    // ========================================================================

    /// Converted frames in the buffer, oldest first.
    pub fn converted_frames(&self) -> Result<Vec<Frame>, StoreError> {
        let files = list_files(&self.converted_buffer, &self.converted_extension, false)?;
        Ok(sorted_frames(files, FrameFormat::Converted))
    }

    /// Move a converted frame into the converted archive.
    pub fn archive_converted(&self, frame: &Frame) -> Result<PathBuf, StoreError> {
        archive_into(&frame.path, &self.converted_archive)
    }
}

fn archive_into(path: &Path, archive_dir: &Path) -> Result<PathBuf, StoreError> {
    let name = path.file_name().ok_or_else(|| StoreError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    let dest = archive_dir.join(name);
    move_file(path, &dest).map_err(io_err(path))?;
    debug!(file = %dest.display(), "Archived");
    Ok(dest)
}

fn sorted_frames(files: Vec<PathBuf>, format: FrameFormat) -> Vec<Frame> {
    let mut frames: Vec<Frame> = files
        .into_iter()
        .map(|p| {
            let ts = frame_timestamp_or_mtime(&p);
            Frame::new(p, ts, format)
        })
        .collect();
    frames.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
    frames
}

/// Files in `dir` whose extension equals `extension` (case-insensitive).
pub fn list_files(dir: &Path, extension: &str, recursive: bool) -> Result<Vec<PathBuf>, StoreError> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).map_err(io_err(dir))?;
    for entry in entries {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_err(&path))?;
        if file_type.is_dir() {
            if recursive {
                out.extend(list_files(&path, extension, true)?);
            }
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches {
            out.push(path);
        }
    }
    Ok(out)
}

/// Rename, falling back to copy + delete when crossing filesystems.
pub fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !src.exists() {
                return Err(rename_err);
            }
            fs::copy(src, dst)?;
            fs::remove_file(src)?;
            Ok(())
        }
    }
}
