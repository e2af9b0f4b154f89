//! Processing loop - drives the coordinator until cancelled
//!
//! Each iteration does exactly one of:
//!
//! - DRAINING_INBOX: convert one raw frame, then go again immediately
//! - RUNNING_CYCLE: the window is full, run one cycle, go again immediately
//! - IDLE_WAITING: nothing to do, sleep one poll interval
//!
//! The phase of the finished step is written to the status file afterwards.
//! The telemetry pass is checked once per iteration behind its own gate.
//! Any error escaping an iteration writes `ERROR` to the status file and
//! backs off for twice the poll interval. Cancellation is observed between
//! iterations and during sleeps; an iteration in flight always completes.

use anyhow::{Context, Result};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::storage::StatusReporter;
use crate::telemetry::TelemetryMonitor;
use crate::types::PipelinePhase;

use super::coordinator::{CycleCoordinator, DrainOutcome};
use super::state::{IntervalGate, LoopStats};

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Drained,
    Cycled,
    Idle,
}

pub struct ProcessingLoop {
    coordinator: CycleCoordinator,
    status: StatusReporter,
    poll_interval: Duration,
    telemetry: Option<(TelemetryMonitor, IntervalGate)>,
    cancel_token: CancellationToken,
    stats: LoopStats,
}

impl ProcessingLoop {
    pub fn new(
        coordinator: CycleCoordinator,
        status: StatusReporter,
        poll_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            status,
            poll_interval,
            telemetry: None,
            cancel_token,
            stats: LoopStats::default(),
        }
    }

    /// Attach the aircraft telemetry pass, run at most once per `interval`.
    pub fn with_telemetry(mut self, monitor: TelemetryMonitor, interval: Duration) -> Self {
        self.telemetry = Some((monitor, IntervalGate::new(interval)));
        self
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn coordinator(&self) -> &CycleCoordinator {
        &self.coordinator
    }

    /// Write `INITIALIZING`, recover claims left by a crashed run, and trim
    /// any backlog beyond the window.
    pub fn initialize(&self) -> Result<()> {
        self.report(PipelinePhase::Initializing)?;
        let store = self.coordinator.buffer().store();
        let recovered = store.recover_claims().context("recovering claimed raw frames")?;
        if recovered > 0 {
            info!(recovered, "Returned interrupted raw frames to the inbox");
        }
        self.coordinator
            .buffer()
            .trim_backlog()
            .context("trimming converted backlog")?;
        Ok(())
    }

    /// One pass of the state machine. The status file is written once the
    /// step has finished, so an interrupted step leaves the previous status.
    pub async fn iterate(&mut self) -> Result<Step> {
        self.stats.iterations += 1;
        self.telemetry_tick().await;

        let step = self.step().await?;
        let phase = match step {
            Step::Drained => PipelinePhase::DrainingInbox,
            Step::Cycled => PipelinePhase::RunningCycle,
            Step::Idle => PipelinePhase::IdleWaiting,
        };
        self.report(phase)?;
        Ok(step)
    }

    async fn step(&mut self) -> Result<Step> {
        if self.coordinator.inbox_pending()? {
            match self.coordinator.drain_one().await? {
                DrainOutcome::Buffered(_) => self.stats.frames_drained += 1,
                DrainOutcome::Failed => self.stats.conversion_failures += 1,
                DrainOutcome::Empty => {}
            }
            return Ok(Step::Drained);
        }

        if self.coordinator.buffer().is_ready().context("checking window")? {
            if let Some(report) = self.coordinator.run_cycle(Utc::now()).await? {
                self.stats.cycles_completed += 1;
                self.stats.forecasts_written += report.forecast.len() as u64;
                self.stats.alerts_sent += report.alerts_sent as u64;
            }
            return Ok(Step::Cycled);
        }

        Ok(Step::Idle)
    }

    /// Iterate until cancelled. Returns the final statistics.
    pub async fn run(mut self) -> LoopStats {
        info!(
            window = self.coordinator.buffer().length(),
            poll_secs = self.poll_interval.as_secs_f64(),
            telemetry = self.telemetry.is_some(),
            "📡 Processing loop started"
        );
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        while !self.cancel_token.is_cancelled() {
            let delay = self.iterate_or_recover().await;
            if delay.is_zero() {
                continue;
            }
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.log_final_stats();
        self.stats
    }

    /// Single iteration with the error path applied, for `--once`.
    pub async fn run_once(mut self) -> LoopStats {
        self.iterate_or_recover().await;
        self.log_final_stats();
        self.stats
    }

    /// Run one iteration; returns how long to sleep afterwards.
    async fn iterate_or_recover(&mut self) -> Duration {
        match self.iterate().await {
            Ok(Step::Drained | Step::Cycled) => Duration::ZERO,
            Ok(Step::Idle) => self.poll_interval,
            Err(e) => {
                self.stats.errors += 1;
                error!(error = ?e, "❌ Iteration failed");
                if let Err(status_err) = self.status.report_error() {
                    warn!(error = %status_err, "Failed to write ERROR status");
                }
                self.poll_interval * 2
            }
        }
    }

    async fn telemetry_tick(&mut self) {
        let Some((monitor, gate)) = self.telemetry.as_mut() else {
            return;
        };
        if !gate.try_pass(Instant::now()) {
            return;
        }
        #[cfg(feature = "opensky")]
        monitor.refresh_remote(Utc::now()).await;
        match monitor.run(self.coordinator.latest_cells(), Utc::now()) {
            Ok(summary) => {
                self.stats.telemetry_passes += 1;
                debug!(?summary, "Telemetry pass complete");
            }
            Err(e) => warn!(error = %e, "Telemetry pass failed"),
        }
    }

    fn report(&self, phase: PipelinePhase) -> Result<()> {
        let buffered = self.coordinator.buffer().occupancy().context("reading buffer")?;
        self.status
            .report(phase, buffered, self.coordinator.buffer().length())
            .context("writing status")?;
        Ok(())
    }

    fn log_final_stats(&self) {
        let s = &self.stats;
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("   Iterations:           {}", s.iterations);
        info!("   Frames Drained:       {}", s.frames_drained);
        info!("   Conversion Failures:  {}", s.conversion_failures);
        info!("   Cycles Completed:     {}", s.cycles_completed);
        info!("   Forecasts Written:    {}", s.forecasts_written);
        info!("   Alerts Sent:          {}", s.alerts_sent);
        info!("   Telemetry Passes:     {}", s.telemetry_passes);
        info!("   Errors:               {}", s.errors);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}
