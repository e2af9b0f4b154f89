//! Cycle Coordinator - the steps of one nowcasting cycle
//!
//! ```text
//! DRAIN:  oldest raw frame -> claim -> forward conversion -> buffer
//! CYCLE:  snapshot window
//!         -> preprocess (normalized tensor)
//!         -> predict (checked)
//!         -> postprocess (K forecast grids on disk)
//!         -> reverse conversion (best effort)
//!         -> detect cells (observed + each forecast) -> sidecars
//!         -> proximity alerts (best effort)
//!         -> evict (window advances by one)
//! ```
//!
//! Anything that fails before the forecast set is on disk aborts the cycle
//! and leaves the buffer untouched, except for a window with no readable
//! frame at all, which is evicted like a completed one. After that point,
//! reverse conversion, sidecars and alerts only log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::alerts::{Notifier, ProximityAlerter};
use crate::config::PipelineConfig;
use crate::converter::{ConverterGateway, Direction};
use crate::detection::CellDetector;
use crate::grid::{GridCodec, JsonGridCodec};
use crate::inference::{run_checked, Predictor};
use crate::render::SidecarRenderer;
use crate::storage::{FrameStore, SubscriberRegistry};
use crate::types::{ForecastSet, StormCell};

use super::postprocess::{Forecast, Postprocessor};
use super::preprocess::{PreprocessError, Preprocessed, Preprocessor};
use super::window::WindowBuffer;

/// Subdirectory of a cycle directory receiving reverse-converted outputs.
pub const REVERSE_SUBDIR: &str = "raw";

/// Outcome of one drain step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Inbox was empty
    Empty,
    /// Frame converted into the buffer
    Buffered(PathBuf),
    /// Conversion failed; the raw frame was archived anyway
    Failed,
}

/// What one completed cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub forecast: ForecastSet,
    pub reverse_converted: usize,
    pub cells: usize,
    pub alerts_sent: usize,
    pub malformed_frames: usize,
    pub evicted: usize,
    pub elapsed: Duration,
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cycle {}: {} forecasts, {} cells, {} alerts, {} evicted in {:.1}s",
            self.forecast.base_time.format("%Y-%m-%d %H:%M:%S"),
            self.forecast.len(),
            self.cells,
            self.alerts_sent,
            self.evicted,
            self.elapsed.as_secs_f64()
        )
    }
}

pub struct CycleCoordinator {
    buffer: WindowBuffer,
    converter: ConverterGateway,
    preprocessor: Preprocessor,
    predictor: Arc<dyn Predictor>,
    postprocessor: Postprocessor,
    detector: CellDetector,
    renderer: SidecarRenderer,
    alerter: Option<ProximityAlerter>,
    registry: Arc<dyn SubscriberRegistry>,
    /// Cells of the most recent observed frame
    latest_cells: Vec<StormCell>,
}

impl CycleCoordinator {
    pub fn new(
        config: &PipelineConfig,
        store: FrameStore,
        converter: ConverterGateway,
        predictor: Arc<dyn Predictor>,
        registry: Arc<dyn SubscriberRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let codec: Arc<dyn GridCodec> = Arc::new(JsonGridCodec::new(config.forecast.compress_output));
        let alerter = config
            .alerts
            .enabled
            .then(|| ProximityAlerter::new(&config.alerts, notifier));

        Self {
            buffer: WindowBuffer::new(store, config.window.length),
            converter,
            preprocessor: Preprocessor::new(codec.clone(), &config.radar, &config.model),
            predictor,
            postprocessor: Postprocessor::new(
                codec,
                &config.paths.output_dir,
                &config.window.converted_extension,
                &config.radar,
                &config.forecast,
            ),
            detector: CellDetector::new(&config.cells),
            renderer: SidecarRenderer::new(config.forecast.write_sidecars),
            alerter,
            registry,
            latest_cells: Vec::new(),
        }
    }

    pub fn buffer(&self) -> &WindowBuffer {
        &self.buffer
    }

    pub fn latest_cells(&self) -> &[StormCell] {
        &self.latest_cells
    }

    /// Whether the raw inbox holds at least one frame.
    pub fn inbox_pending(&self) -> Result<bool> {
        Ok(self
            .buffer
            .store()
            .oldest_raw()
            .context("listing raw inbox")?
            .is_some())
    }

    // ========================================================================
    // Drain
    // ========================================================================

    /// Convert the oldest raw frame into the buffer.
    ///
    /// A failed conversion is not an error for the loop: the raw frame is
    /// archived by the gateway and the outcome is `Failed`.
    pub async fn drain_one(&self) -> Result<DrainOutcome> {
        let store = self.buffer.store();
        let Some(frame) = store.oldest_raw().context("listing raw inbox")? else {
            return Ok(DrainOutcome::Empty);
        };
        let claimed = store.claim(&frame).context("claiming raw frame")?;

        match self
            .converter
            .convert(&claimed.path, Direction::Forward, store.converted_buffer_dir())
            .await
        {
            Ok(path) => {
                info!(frame = %frame.file_name(), converted = %path.display(), "📥 Frame buffered");
                Ok(DrainOutcome::Buffered(path))
            }
            Err(e) => {
                warn!(frame = %frame.file_name(), error = %e, "Raw frame could not be converted, archived");
                Ok(DrainOutcome::Failed)
            }
        }
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    /// Run one cycle if the window is full. `Ok(None)` when it is not.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<Option<CycleReport>> {
        let started = Instant::now();
        let Some(window) = self.buffer.snapshot().context("reading window")? else {
            return Ok(None);
        };
        info!(
            frames = window.len(),
            first = %window.first().map(|f| f.file_name()).unwrap_or_default(),
            last = %window.last().map(|f| f.file_name()).unwrap_or_default(),
            "🌀 Running forecast cycle"
        );

        let pre = match self.preprocessor.build(&window) {
            Ok(pre) => pre,
            Err(e @ PreprocessError::NoReadableFrames { .. }) => {
                self.buffer.evict_after_cycle().context("advancing past unreadable window")?;
                return Err(e).context("preprocessing window");
            }
        };
        let output = run_checked(self.predictor.as_ref(), &pre.tensor).context("inference")?;
        let forecast = self
            .postprocessor
            .build(&output, &window, &pre.geometry)
            .context("writing forecast set")?;

        let reverse_converted = self.reverse_convert(&forecast.set).await;
        let cells = self.detect_and_render(&pre, &forecast)?;

        let alerts_sent = match &self.alerter {
            Some(alerter) => match alerter.check(&cells, self.registry.as_ref(), now).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(registry = self.registry.backend_name(), error = %e, "Proximity alerting failed");
                    0
                }
            },
            None => 0,
        };

        let evicted = self.buffer.evict_after_cycle().context("evicting after cycle")?;
        let report = CycleReport {
            forecast: forecast.set,
            reverse_converted,
            cells: cells.len(),
            alerts_sent,
            malformed_frames: pre.malformed,
            evicted,
            elapsed: started.elapsed(),
        };
        self.latest_cells = cells;

        info!("✅ {report}");
        Ok(Some(report))
    }

    /// Reverse-convert every forecast grid into `<cycle>/raw/`.
    async fn reverse_convert(&self, set: &ForecastSet) -> usize {
        if !self.converter.reverse_available() {
            return 0;
        }
        let dest = set.output_dir.join(REVERSE_SUBDIR);
        let mut converted = 0;
        for output in &set.outputs {
            match self.converter.convert(&output.path, Direction::Reverse, &dest).await {
                Ok(_) => converted += 1,
                Err(e) => warn!(grid = %output.path.display(), error = %e, "Reverse conversion failed"),
            }
        }
        converted
    }

    /// Cells of the latest observed frame, plus sidecars for it and for
    /// every forecast grid.
    fn detect_and_render(&self, pre: &Preprocessed, forecast: &Forecast) -> Result<Vec<StormCell>> {
        let cells = self
            .detector
            .detect(&pre.latest_composite, &pre.geometry)
            .context("detecting cells on latest frame")?;

        let observed = forecast.set.output_dir.join(pre.latest_frame.file_name());
        if let Err(e) = self
            .renderer
            .write(&observed, &pre.geometry, pre.latest_frame.timestamp, None, &cells)
        {
            warn!(error = %e, "Failed to write observed-frame sidecar");
        }

        for (output, grid) in forecast.set.outputs.iter().zip(&forecast.grids) {
            let forecast_cells = match self.detector.detect(grid, &forecast.geometry) {
                Ok(c) => c,
                Err(e) => {
                    warn!(grid = %output.path.display(), error = %e, "Cell detection failed on forecast");
                    continue;
                }
            };
            if let Err(e) = self.renderer.write(
                &output.path,
                &forecast.geometry,
                output.valid_time,
                Some(output.lead_minutes),
                &forecast_cells,
            ) {
                warn!(grid = %output.path.display(), error = %e, "Failed to write forecast sidecar");
            }
        }

        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogNotifier;
    use crate::config::PathsConfig;
    use crate::converter::{ConverterError, ToolInvoker, ToolOutput, ToolRequest, ToolSpec};
    use crate::grid::{Grid2D, GridDocument, GridGeometry, ProjectionInfo};
    use crate::inference::PersistencePredictor;
    use crate::storage::InMemoryRegistry;
    use crate::types::Subscriber;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    /// Copies the `-f` input into `-out_dir`, named the way the real tools name their output
/// (`mdv` -> `nc`, anything else -> `mdv`).
    struct CopyInvoker;

    #[async_trait]
    impl ToolInvoker for CopyInvoker {
        async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput, ConverterError> {
            let input = request
                .args
                .iter()
                .position(|a| a == "-f")
                .map(|i| PathBuf::from(&request.args[i + 1]))
                .ok_or_else(|| ConverterError::Io(std::io::Error::other("no -f argument")))?;
            let ext = if input.extension().is_some_and(|e| e == "mdv") { "nc" } else { "mdv" };
            let stem = input.file_stem().unwrap_or_default().to_string_lossy().into_owned();
            std::fs::copy(&input, request.out_dir.join(format!("{stem}.{ext}")))?;
            Ok(ToolOutput {
                exit_code: Some(0),
                success: true,
                ..Default::default()
            })
        }
    }

    fn config(root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths = PathsConfig::rooted_at(root);
        config.window.length = 3;
        config.model.input_height = 8;
        config.model.input_width = 8;
        config.model.forecast_steps = 2;
        config
    }

    fn coordinator(root: &Path, registry: Arc<dyn SubscriberRegistry>) -> CycleCoordinator {
        let config = config(root);
        let store = FrameStore::open(&config.paths, &config.window).unwrap();
        let forward = ToolSpec::unresolved(PathBuf::from("copy-tool"), &config.converter.forward);
        let reverse = ToolSpec::unresolved(PathBuf::from("copy-tool"), &config.converter.reverse);
        let converter = ConverterGateway::new(
            Arc::new(CopyInvoker),
            forward,
            Some(reverse),
            "mdv",
            "json",
            &config.paths.raw_archive,
        );
        let predictor = Arc::new(PersistencePredictor::new(3, 8, 8, 2));
        CycleCoordinator::new(&config, store, converter, predictor, registry, Arc::new(LogNotifier))
    }

    /// A 16x16 frame with a 62 dBZ block at the radar site.
    fn write_raw(dir: &Path, minute: u32) -> PathBuf {
        let at = Utc.with_ymd_and_hms(2026, 1, 25, 12, minute, 0).unwrap();
        let mut grid = Grid2D::filled(16, 16, 10.0);
        for r in 6..10 {
            for c in 6..10 {
                grid.set(r, c, 62.0);
            }
        }
        let geometry = GridGeometry::native(16, 16, ProjectionInfo::new(-34.6, -68.0, 6_378_137.0));
        let doc = GridDocument::from_grid(at, "DBZ", "dBZ", &grid, &geometry);
        let path = dir.join(format!("2026012512{minute:02}00.mdv"));
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        path
    }

    fn setup() -> (TempDir, PathsConfig) {
        let dir = tempdir().unwrap();
        let paths = PathsConfig::rooted_at(dir.path());
        (dir, paths)
    }

    #[tokio::test]
    async fn test_drain_converts_oldest_and_archives() {
        let (dir, paths) = setup();
        let c = coordinator(dir.path(), Arc::new(InMemoryRegistry::new()));
        write_raw(&paths.raw_inbox, 3);
        write_raw(&paths.raw_inbox, 0);

        let outcome = c.drain_one().await.unwrap();
        assert_eq!(outcome, DrainOutcome::Buffered(paths.converted_buffer.join("20260125120000.json")));
        assert!(paths.raw_archive.join("20260125120000.mdv").exists());
        assert!(c.inbox_pending().unwrap());

        c.drain_one().await.unwrap();
        assert_eq!(c.drain_one().await.unwrap(), DrainOutcome::Empty);
        assert_eq!(c.buffer().occupancy().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cycle_writes_forecasts_sidecars_and_alerts() {
        let (dir, paths) = setup();
        let registry = Arc::new(InMemoryRegistry::with_subscribers([Subscriber::new("near")
            .with_location(-34.6, -68.0)
            .with_device("https://push.example/near")]));
        let mut c = coordinator(dir.path(), registry.clone());
        for minute in [0, 3, 6] {
            write_raw(&paths.raw_inbox, minute);
            c.drain_one().await.unwrap();
        }

        let now = Utc.with_ymd_and_hms(2026, 1, 25, 12, 7, 0).unwrap();
        let report = c.run_cycle(now).await.unwrap().unwrap();

        assert_eq!(report.forecast.lead_minutes(), vec![3.0, 6.0]);
        assert_eq!(report.forecast.output_dir, paths.output_dir.join("20260125-120600"));
        assert_eq!(report.reverse_converted, 2);
        assert!(report.forecast.output_dir.join("raw/20260125120900.mdv").exists());
        assert!(report.forecast.output_dir.join("20260125_120900.meta.json").exists());
        assert!(report.forecast.output_dir.join("20260125120600.meta.json").exists());
        assert_eq!(report.cells, 1);
        assert_eq!(c.latest_cells().len(), 1);
        assert_eq!(report.alerts_sent, 1);
        assert!(registry.get("near").unwrap().unwrap().last_alert.is_some());

        // Window of 3 leaves 2 after the cycle; not ready again.
        assert_eq!(c.buffer().occupancy().unwrap(), 2);
        assert!(c.run_cycle(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_window_advances_and_errors() {
        let (dir, paths) = setup();
        let mut c = coordinator(dir.path(), Arc::new(InMemoryRegistry::new()));
        for minute in [0, 3, 6] {
            std::fs::write(paths.converted_buffer.join(format!("2026012512{minute:02}00.json")), b"garbage").unwrap();
        }
        assert!(c.run_cycle(Utc::now()).await.is_err());
        assert_eq!(c.buffer().occupancy().unwrap(), 2);
    }
}
