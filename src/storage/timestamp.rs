//! Frame timestamps from file names
//!
//! Radar products encode their scan time in the file name in a handful of
//! layouts. Each layout is one strategy; strategies are tried in order and
//! the first match wins. Callers fall back to the file modification time
//! when nothing matches.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Canonical layout for converted frames: lexical order == chronological order.
pub const CANONICAL_FORMAT: &str = "%Y%m%d%H%M%S";

/// Which layout produced a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStrategy {
    /// `20260125123456`
    Compact,
    /// `20260125_123456`
    Underscore,
    /// `20260125-123456`
    Dashed,
    /// `20260125/123456.mdv`
    DateDirectory,
}

/// Result of running the strategy list over a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    Parsed {
        at: DateTime<Utc>,
        strategy: TimestampStrategy,
    },
    Unrecognized,
}

impl ParsedTimestamp {
    pub fn value(self) -> Option<DateTime<Utc>> {
        match self {
            ParsedTimestamp::Parsed { at, .. } => Some(at),
            ParsedTimestamp::Unrecognized => None,
        }
    }
}

struct Patterns {
    compact: Regex,
    separated: Regex,
    date_dir: Regex,
    time_stem: Regex,
}

#[allow(clippy::expect_used)]
fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        compact: Regex::new(r"(\d{8})(\d{6})").expect("static regex"),
        separated: Regex::new(r"(\d{8})([_-])(\d{6})").expect("static regex"),
        date_dir: Regex::new(r"^(\d{8})$").expect("static regex"),
        time_stem: Regex::new(r"^(\d{6})").expect("static regex"),
    })
}

fn combine(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let d = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let t = NaiveTime::parse_from_str(time, "%H%M%S").ok()?;
    Some(NaiveDateTime::new(d, t).and_utc())
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

fn try_compact(path: &Path) -> Option<DateTime<Utc>> {
    let caps = patterns().compact.captures(file_stem(path)?)?;
    combine(&caps[1], &caps[2])
}

fn try_separated(path: &Path, sep: char) -> Option<DateTime<Utc>> {
    patterns()
        .separated
        .captures_iter(file_stem(path)?)
        .filter(|c| c[2].starts_with(sep))
        .find_map(|c| combine(&c[1], &c[3]))
}

fn try_date_directory(path: &Path) -> Option<DateTime<Utc>> {
    let p = patterns();
    let dir = path.parent()?.file_name()?.to_str()?;
    let date = p.date_dir.captures(dir)?;
    let time = p.time_stem.captures(file_stem(path)?)?;
    combine(&date[1], &time[1])
}

/// Run the strategy list over `path`.
pub fn parse_frame_timestamp(path: &Path) -> ParsedTimestamp {
    let strategies: [(TimestampStrategy, fn(&Path) -> Option<DateTime<Utc>>); 4] = [
        (TimestampStrategy::Compact, try_compact),
        (TimestampStrategy::Underscore, |p| try_separated(p, '_')),
        (TimestampStrategy::Dashed, |p| try_separated(p, '-')),
        (TimestampStrategy::DateDirectory, try_date_directory),
    ];
    strategies
        .iter()
        .find_map(|(strategy, parse)| {
            parse(path).map(|at| ParsedTimestamp::Parsed {
                at,
                strategy: *strategy,
            })
        })
        .unwrap_or(ParsedTimestamp::Unrecognized)
}

/// File name timestamp, else modification time, else `now`.
pub fn frame_timestamp_or_mtime(path: &Path) -> DateTime<Utc> {
    if let Some(at) = parse_frame_timestamp(path).value() {
        return at;
    }
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Canonical file name for a converted frame.
pub fn canonical_name(at: DateTime<Utc>, extension: &str) -> String {
    format!("{}.{}", at.format(CANONICAL_FORMAT), extension)
}
