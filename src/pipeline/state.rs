//! Loop bookkeeping: interval gates and run statistics

use std::time::{Duration, Instant};

// ============================================================================
// Interval Gate
// ============================================================================

/// Lets a task run at most once per interval. The first check always passes.
#[derive(Debug, Clone)]
pub struct IntervalGate {
    interval: Duration,
    last_run: Option<Instant>,
}

impl IntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    /// True (and the gate re-arms) if the interval has elapsed at `now`.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        let due = self
            .last_run
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_run = Some(now);
        }
        due
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for the lifetime of one `ProcessingLoop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub frames_drained: u64,
    pub conversion_failures: u64,
    pub cycles_completed: u64,
    pub forecasts_written: u64,
    pub alerts_sent: u64,
    pub telemetry_passes: u64,
    pub errors: u64,
}

impl std::fmt::Display for LoopStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Loop: {} iterations, {} frames drained ({} failed), {} cycles, {} forecasts, {} alerts, {} errors",
            self.iterations,
            self.frames_drained,
            self.conversion_failures,
            self.cycles_completed,
            self.forecasts_written,
            self.alerts_sent,
            self.errors
        )
    }
}
