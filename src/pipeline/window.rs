//! Window Buffer - sliding window over the converted-frame buffer
//!
//! The buffer directory is the durable queue; this is a view over it. A
//! window is always the N most recent frames, oldest first. Anything older
//! than the window can never be used again and is archived.

use tracing::{debug, info};

use crate::storage::{move_file, FrameStore, StoreError};
use crate::types::{Frame, FrameFormat, Window};

pub struct WindowBuffer {
    store: FrameStore,
    length: usize,
}

impl WindowBuffer {
    pub fn new(store: FrameStore, length: usize) -> Self {
        Self { store, length }
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    /// Window length N.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Frames currently buffered.
    pub fn occupancy(&self) -> Result<usize, StoreError> {
        Ok(self.store.converted_frames()?.len())
    }

    /// Place an externally produced converted frame into the buffer.
    pub fn push(&self, frame: &Frame) -> Result<Frame, StoreError> {
        let dest = self.store.converted_buffer_dir().join(frame.file_name());
        if dest != frame.path {
            move_file(&frame.path, &dest).map_err(|source| StoreError::Io {
                path: frame.path.clone(),
                source,
            })?;
        }
        debug!(frame = %dest.display(), "Frame buffered");
        Ok(Frame::new(dest, frame.timestamp, FrameFormat::Converted))
    }

    pub fn is_ready(&self) -> Result<bool, StoreError> {
        Ok(self.occupancy()? >= self.length)
    }

    /// The N most recent frames, oldest first. `None` if fewer than N.
    pub fn snapshot(&self) -> Result<Option<Window>, StoreError> {
        let frames = self.store.converted_frames()?;
        if frames.len() < self.length {
            return Ok(None);
        }
        let start = frames.len() - self.length;
        Ok(Some(Window::new(frames[start..].to_vec())))
    }

    /// Archive the `count` oldest buffered frames. Returns how many moved.
    pub fn evict_oldest(&self, count: usize) -> Result<usize, StoreError> {
        let frames = self.store.converted_frames()?;
        let mut evicted = 0;
        for frame in frames.iter().take(count) {
            self.store.archive_converted(frame)?;
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Archive everything older than the current window (M − N frames).
    pub fn trim_backlog(&self) -> Result<usize, StoreError> {
        let occupancy = self.occupancy()?;
        let excess = occupancy.saturating_sub(self.length);
        if excess == 0 {
            return Ok(0);
        }
        let evicted = self.evict_oldest(excess)?;
        info!(evicted, window = self.length, "Backlog trimmed");
        Ok(evicted)
    }

    /// Advance after a successful cycle: trim the backlog, then drop one
    /// more so the next arrival triggers the next cycle.
    pub fn evict_after_cycle(&self) -> Result<usize, StoreError> {
        let trimmed = self.trim_backlog()?;
        let advanced = self.evict_oldest(1)?;
        Ok(trimmed + advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathsConfig, WindowConfig};
    use std::path::Path;
    use tempfile::tempdir;

    fn buffer(root: &Path, length: usize) -> WindowBuffer {
        let store = FrameStore::open(&PathsConfig::rooted_at(root), &WindowConfig::default()).unwrap();
        WindowBuffer::new(store, length)
    }

    fn seed(root: &Path, minutes: &[u32]) {
        for m in minutes {
            let name = format!("2026012512{m:02}00.json");
            std::fs::write(root.join("converted/buffer").join(name), b"{}").unwrap();
        }
    }

    #[test]
    fn test_not_ready_below_length() {
        let dir = tempdir().unwrap();
        let wb = buffer(dir.path(), 3);
        seed(dir.path(), &[0, 3]);
        assert!(!wb.is_ready().unwrap());
        assert!(wb.snapshot().unwrap().is_none());
    }

    #[test]
    fn test_snapshot_takes_most_recent_ascending() {
        let dir = tempdir().unwrap();
        let wb = buffer(dir.path(), 3);
        seed(dir.path(), &[12, 0, 9, 3, 6]);

        let window = wb.snapshot().unwrap().unwrap();
        let names: Vec<String> = window.frames().iter().map(Frame::file_name).collect();
        assert_eq!(names, vec!["20260125120600.json", "20260125120900.json", "20260125121200.json"]);
    }

    #[test]
    fn test_trim_then_advance_leaves_n_minus_one() {
        let dir = tempdir().unwrap();
        let wb = buffer(dir.path(), 3);
        seed(dir.path(), &[0, 3, 6, 9, 12]);

        assert_eq!(wb.trim_backlog().unwrap(), 2);
        assert_eq!(wb.occupancy().unwrap(), 3);
        assert!(dir.path().join("converted/archive/20260125120000.json").exists());
        assert!(dir.path().join("converted/archive/20260125120300.json").exists());

        assert_eq!(wb.evict_oldest(1).unwrap(), 1);
        let remaining: Vec<String> = wb
            .store()
            .converted_frames()
            .unwrap()
            .iter()
            .map(Frame::file_name)
            .collect();
        assert_eq!(remaining, vec!["20260125120900.json", "20260125121200.json"]);
    }

    #[test]
    fn test_evict_after_cycle() {
        let dir = tempdir().unwrap();
        let wb = buffer(dir.path(), 3);
        seed(dir.path(), &[0, 3, 6, 9]);
        assert_eq!(wb.evict_after_cycle().unwrap(), 2);
        assert_eq!(wb.occupancy().unwrap(), 2);
    }

    #[test]
    fn test_push_moves_into_buffer() {
        let dir = tempdir().unwrap();
        let wb = buffer(dir.path(), 2);
        let outside = dir.path().join("20260125120000.json");
        std::fs::write(&outside, b"{}").unwrap();
        let frame = Frame::new(
            outside.clone(),
            crate::storage::timestamp::frame_timestamp_or_mtime(&outside),
            FrameFormat::Converted,
        );
        let pushed = wb.push(&frame).unwrap();
        assert!(pushed.path.starts_with(dir.path().join("converted/buffer")));
        assert!(!outside.exists());
        assert_eq!(wb.occupancy().unwrap(), 1);
    }
}
