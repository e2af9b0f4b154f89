//! Pipeline phase and the externally visible status record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Main loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelinePhase {
    /// Startup, before the first iteration
    Initializing,
    /// Converting one raw frame from the inbox
    DrainingInbox,
    /// Nothing to do; waiting for the next poll
    IdleWaiting,
    /// Running predict -> postprocess -> detect -> alert
    RunningCycle,
    /// Last iteration failed; backing off
    Error,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Initializing => write!(f, "INITIALIZING"),
            PipelinePhase::DrainingInbox => write!(f, "DRAINING_INBOX"),
            PipelinePhase::IdleWaiting => write!(f, "IDLE_WAITING"),
            PipelinePhase::RunningCycle => write!(f, "RUNNING_CYCLE"),
            PipelinePhase::Error => write!(f, "ERROR"),
        }
    }
}

/// Status surface read by external health checks.
///
/// Counts are `-1` while in `ERROR`, when occupancy is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub phase: PipelinePhase,
    pub message: String,
    pub buffer_count: i64,
    pub target_count: i64,
    pub last_update_utc: DateTime<Utc>,
}

impl PipelineStatus {
    pub fn new(phase: PipelinePhase, buffer_count: usize, target_count: usize) -> Self {
        let message = match phase {
            PipelinePhase::Initializing => "Starting up".to_string(),
            PipelinePhase::DrainingInbox => "Converting new radar volume".to_string(),
            PipelinePhase::IdleWaiting => format!("Waiting for data ({buffer_count}/{target_count})"),
            PipelinePhase::RunningCycle => "Running forecast cycle".to_string(),
            PipelinePhase::Error => "ERROR - Check logs for details".to_string(),
        };
        Self {
            phase,
            message,
            buffer_count: i64::try_from(buffer_count).unwrap_or(i64::MAX),
            target_count: i64::try_from(target_count).unwrap_or(i64::MAX),
            last_update_utc: Utc::now(),
        }
    }

    /// Generic error record; details belong in the log stream.
    pub fn error() -> Self {
        Self {
            phase: PipelinePhase::Error,
            message: "ERROR - Check logs for details".to_string(),
            buffer_count: -1,
            target_count: -1,
            last_update_utc: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_screaming_case() {
        let json = serde_json::to_string(&PipelinePhase::DrainingInbox).unwrap();
        assert_eq!(json, "\"DRAINING_INBOX\"");
        assert_eq!(PipelinePhase::IdleWaiting.to_string(), "IDLE_WAITING");
    }

    #[test]
    fn test_error_status_hides_counts() {
        let s = PipelineStatus::error();
        assert_eq!(s.buffer_count, -1);
        assert_eq!(s.target_count, -1);
        assert!(!s.message.contains("panic"));
    }

    #[test]
    fn test_idle_message_shows_occupancy() {
        let s = PipelineStatus::new(PipelinePhase::IdleWaiting, 3, 8);
        assert_eq!(s.message, "Waiting for data (3/8)");
    }
}
