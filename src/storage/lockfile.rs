//! Single-writer guard for the data directory
//!
//! The queue directories, the status file and the sled registry all assume
//! one writer. `ProcessLock` records the owning PID and start time in
//! `<data_dir>/.hailcast.lock` and removes the file when dropped.

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCK_FILE_NAME: &str = ".hailcast.lock";

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("hailcast is already running as PID {pid} (lock {path}); stop it or delete the lock if it is stale")]
    Held { pid: u32, path: PathBuf },

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Who the existing lock file points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holder {
    Live(u32),
    Stale,
    Unreadable,
}

#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    acquired_at: DateTime<Utc>,
    released: bool,
}

impl ProcessLock {
    /// Take the lock for `data_dir`, creating the directory if needed.
    ///
    /// Stale or unreadable lock files are replaced; a live holder is an error.
    pub fn acquire(data_dir: impl AsRef<Path>) -> Result<Self, LockError> {
        let data_dir = data_dir.as_ref();
        let path = data_dir.join(LOCK_FILE_NAME);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(data_dir).map_err(io_err)?;

        if path.exists() {
            match read_holder(&path) {
                Holder::Live(pid) => return Err(LockError::Held { pid, path }),
                Holder::Stale => info!(lock = %path.display(), "Replacing stale lock from a previous run"),
                Holder::Unreadable => warn!(lock = %path.display(), "Replacing unreadable lock file"),
            }
            fs::remove_file(&path).map_err(io_err)?;
        }

        let acquired_at = Utc::now();
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_err)?;
        writeln!(file, "{}\n{}", std::process::id(), acquired_at.to_rfc3339()).map_err(io_err)?;

        debug!(pid = std::process::id(), lock = %path.display(), "Process lock acquired");
        Ok(Self {
            path,
            acquired_at,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Remove the lock file. Idempotent; also runs on drop.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(lock = %self.path.display(), "Process lock released"),
            Err(e) => warn!(lock = %self.path.display(), error = %e, "Failed to remove lock file"),
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// The first line holds the PID; anything after it is informational.
fn read_holder(path: &Path) -> Holder {
    let Some(pid) = fs::read_to_string(path)
        .ok()
        .and_then(|text| text.lines().next().and_then(|l| l.trim().parse::<u32>().ok()))
    else {
        return Holder::Unreadable;
    };
    if pid != std::process::id() && is_hailcast_process(pid) {
        Holder::Live(pid)
    } else {
        Holder::Stale
    }
}

/// PIDs get reused, so only a live process whose command line names
/// hailcast counts as the holder.
#[cfg(unix)]
fn is_hailcast_process(pid: u32) -> bool {
    fs::read(format!("/proc/{pid}/cmdline"))
        .is_ok_and(|cmdline| String::from_utf8_lossy(&cmdline).contains("hailcast"))
}

#[cfg(not(unix))]
fn is_hailcast_process(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_records_pid_and_start() {
        let dir = tempdir().unwrap();
        let lock = ProcessLock::acquire(dir.path()).unwrap();
        let text = fs::read_to_string(lock.path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap().parse::<u32>().unwrap(), std::process::id());
        let started = DateTime::parse_from_rfc3339(lines.next().unwrap()).unwrap();
        assert_eq!(started.with_timezone(&Utc), lock.acquired_at());
    }

    #[test]
    fn test_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = ProcessLock::acquire(dir.path()).unwrap().path().to_path_buf();
        assert!(!path.exists());
    }

    #[test]
    fn test_dead_pid_is_stale() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LOCK_FILE_NAME), "999999999\n2026-01-25T12:00:00Z\n").unwrap();
        assert_eq!(read_holder(&dir.path().join(LOCK_FILE_NAME)), Holder::Stale);
        assert!(ProcessLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_garbage_lock_replaced() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LOCK_FILE_NAME), "not-a-pid").unwrap();
        assert_eq!(read_holder(&dir.path().join(LOCK_FILE_NAME)), Holder::Unreadable);
        let lock = ProcessLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_data_dir_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("state").join("deep");
        let lock = ProcessLock::acquire(&nested).unwrap();
        assert!(lock.path().starts_with(&nested));
    }
}
