//! Radar frames as they move through the filesystem queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which side of the converter a frame is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// Radar-native volume, as delivered to the inbox
    Raw,
    /// Grid document readable by the preprocessor
    Converted,
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameFormat::Raw => write!(f, "raw"),
            FrameFormat::Converted => write!(f, "converted"),
        }
    }
}

/// One radar volume at one timestamp.
///
/// The grid itself is loaded lazily by the preprocessor; a `Frame` is the
/// file handle plus the timestamp parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub format: FrameFormat,
}

impl Frame {
    pub fn new(path: PathBuf, timestamp: DateTime<Utc>, format: FrameFormat) -> Self {
        Self {
            path,
            timestamp,
            format,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Exactly N converted frames, oldest first.
#[derive(Debug, Clone)]
pub struct Window {
    frames: Vec<Frame>,
}

impl Window {
    /// Build a window, sorting by timestamp (file name breaks ties).
    pub fn new(mut frames: Vec<Frame>) -> Self {
        frames.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.path.cmp(&b.path))
        });
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first(&self) -> Option<&Frame> {
        self.frames.first()
    }

    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Time between the two most recent frames, if there are two.
    pub fn last_cadence(&self) -> Option<chrono::Duration> {
        match self.frames.as_slice() {
            [.., prev, last] => Some(last.timestamp - prev.timestamp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn frame(name: &str, minute: u32) -> Frame {
        Frame::new(
            PathBuf::from(name),
            Utc.with_ymd_and_hms(2026, 1, 25, 12, minute, 0).unwrap(),
            FrameFormat::Converted,
        )
    }

    #[test]
    fn test_window_sorted_oldest_first() {
        let w = Window::new(vec![frame("c", 9), frame("a", 3), frame("b", 6)]);
        let names: Vec<_> = w.frames().iter().map(Frame::file_name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_last_cadence() {
        let w = Window::new(vec![frame("a", 3), frame("b", 6), frame("c", 10)]);
        assert_eq!(w.last_cadence(), Some(chrono::Duration::minutes(4)));
        assert_eq!(Window::new(vec![frame("a", 3)]).last_cadence(), None);
    }
}
