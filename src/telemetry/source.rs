//! Incremental reader for the daily position files
//!
//! The feed appends to `<dir>/<YYYYMMDD>.data`. We remember the byte offset
//! of the last complete line and only hand out what was appended since.
//!
//! A file that already exists when the reader starts is tailed from its
//! end, so positions logged before startup are never replayed. A file that
//! appears later, or the next day's file, is read from the start. The
//! offset resets when the file shrinks. Files are ISO-8859-1, decoded byte
//! by byte.

use chrono::{DateTime, Local, NaiveDate, Utc};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::FeedDateZone;

/// Day whose file holds the positions being written at `now`.
pub fn feed_day(zone: FeedDateZone, now: DateTime<Utc>) -> NaiveDate {
    match zone {
        FeedDateZone::Local => now.with_timezone(&Local).date_naive(),
        FeedDateZone::Utc => now.date_naive(),
    }
}

pub struct TelemetryFile {
    dir: PathBuf,
    current: Option<PathBuf>,
    offset: u64,
    skip_backlog: bool,
}

impl TelemetryFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
            offset: 0,
            skip_backlog: true,
        }
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.data", day.format("%Y%m%d")))
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Complete lines appended to `day`'s file since the last call.
    ///
    /// A missing file yields no lines. A trailing partial line is left for
    /// the next call.
    pub fn read_new_lines(&mut self, day: NaiveDate) -> io::Result<Vec<String>> {
        let path = self.path_for(day);
        if self.current.as_deref() != Some(path.as_path()) {
            if self.current.is_some() {
                info!(file = %path.display(), "🌙 New telemetry day, switching file");
            }
            self.current = Some(path.clone());
            self.offset = 0;
        }

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "Telemetry file not present yet");
                self.skip_backlog = false;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if self.skip_backlog {
            self.skip_backlog = false;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            self.offset = bytes
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |i| i as u64 + 1);
            info!(file = %path.display(), skipped_bytes = self.offset, "📡 Tailing telemetry feed from its current end");
            return Ok(Vec::new());
        }

        let len = file.metadata()?.len();
        if len < self.offset {
            info!(file = %path.display(), "Telemetry file truncated, rereading from start");
            self.offset = 0;
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let Some(last_newline) = bytes.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &bytes[..=last_newline];
        self.offset += complete.len() as u64;

        Ok(split_latin1_lines(complete))
    }
}

fn split_latin1_lines(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == b'\n')
        .map(|line| line.iter().map(|&b| char::from(b)).collect::<String>())
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn append(path: &Path, text: &[u8]) {
        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
        f.write_all(text).unwrap();
    }

    #[test]
    fn test_reads_only_new_complete_lines() {
        let dir = tempdir().unwrap();
        let mut source = TelemetryFile::new(dir.path());
        let path = source.path_for(day(25));
        assert_eq!(path.file_name().unwrap(), "20260125.data");

        assert!(source.read_new_lines(day(25)).unwrap().is_empty());

        append(&path, b"a\r\nb\npart");
        assert_eq!(source.read_new_lines(day(25)).unwrap(), vec!["a", "b"]);
        assert_eq!(source.offset(), 5);

        append(&path, b"ial\n");
        assert_eq!(source.read_new_lines(day(25)).unwrap(), vec!["partial"]);
        assert!(source.read_new_lines(day(25)).unwrap().is_empty());
    }

    #[test]
    fn test_existing_file_is_tailed_from_its_end() {
        let dir = tempdir().unwrap();
        let mut source = TelemetryFile::new(dir.path());
        let path = source.path_for(day(25));
        append(&path, b"old1\nold2\npar");

        assert!(source.read_new_lines(day(25)).unwrap().is_empty());
        assert_eq!(source.offset(), 10);

        append(&path, b"tial\nnew\n");
        assert_eq!(source.read_new_lines(day(25)).unwrap(), vec!["partial", "new"]);
    }

    #[test]
    fn test_day_rollover_and_truncation_reset_offset() {
        let dir = tempdir().unwrap();
        let mut source = TelemetryFile::new(dir.path());
        assert!(source.read_new_lines(day(25)).unwrap().is_empty());
        append(&source.path_for(day(25)), b"one\ntwo\n");
        assert_eq!(source.read_new_lines(day(25)).unwrap().len(), 2);

        append(&source.path_for(day(26)), b"three\n");
        assert_eq!(source.read_new_lines(day(26)).unwrap(), vec!["three"]);

        std::fs::write(source.path_for(day(26)), b"x\n").unwrap();
        assert_eq!(source.read_new_lines(day(26)).unwrap(), vec!["x"]);
    }

    #[test]
    fn test_latin1_decoding() {
        let dir = tempdir().unwrap();
        let mut source = TelemetryFile::new(dir.path());
        assert!(source.read_new_lines(day(25)).unwrap().is_empty());
        append(&source.path_for(day(25)), b"# Mendoza \xe1rea\n");
        assert_eq!(source.read_new_lines(day(25)).unwrap(), vec!["# Mendoza área"]);
    }

    #[test]
    fn test_feed_day_follows_the_configured_clock() {
        let late = Utc.with_ymd_and_hms(2026, 1, 25, 23, 30, 0).unwrap();
        assert_eq!(feed_day(FeedDateZone::Utc, late), day(25));
        assert_eq!(
            feed_day(FeedDateZone::Local, late),
            late.with_timezone(&Local).date_naive()
        );
    }
}
