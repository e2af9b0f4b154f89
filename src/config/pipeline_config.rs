//! Pipeline Configuration - every operator-tunable value as TOML
//!
//! Each struct implements `Default` with the values in `config::defaults`,
//! so an empty file (or no file at all) yields a runnable deployment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable holding an explicit config path.
pub const CONFIG_ENV_VAR: &str = "HAILCAST_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "hailcast.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one radar deployment.
///
/// Load with `PipelineConfig::load()` which searches:
/// 1. `$HAILCAST_CONFIG` env var
/// 2. `./hailcast.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Sliding window and polling
    #[serde(default)]
    pub window: WindowConfig,

    /// Radar site and reflectivity domain
    #[serde(default)]
    pub radar: RadarConfig,

    /// Predictor input/output geometry
    #[serde(default)]
    pub model: ModelConfig,

    /// Forecast lead spacing and output encoding
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// External format-conversion tools
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Storm cell detection thresholds
    #[serde(default)]
    pub cells: CellConfig,

    /// Subscriber proximity alerts
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Aircraft telemetry proximity task
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl PipelineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$HAILCAST_CONFIG` environment variable
    /// 2. `./hailcast.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), radar = %config.radar.radar_name, "Loaded pipeline config from HAILCAST_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from HAILCAST_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "HAILCAST_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./hailcast.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(radar = %config.radar.radar_name, "Loaded pipeline config from ./hailcast.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./hailcast.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No hailcast.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are reported as warnings and never fail the load.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all sections for internal consistency.
    ///
    /// Every problem is collected so the operator sees them all at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // Window
        if self.window.length < 2 {
            errors.push(format!(
                "window.length ({}) must be at least 2",
                self.window.length
            ));
        }
        if self.window.poll_interval_secs == 0 {
            errors.push("window.poll_interval_secs must be > 0".to_string());
        }
        if self.window.raw_extension == self.window.converted_extension {
            errors.push(format!(
                "window.raw_extension and window.converted_extension must differ (both '{}')",
                self.window.raw_extension
            ));
        }

        // Radar domain
        let r = &self.radar;
        Self::check_increasing(
            f64::from(r.min_dbz),
            f64::from(r.max_dbz),
            "radar.min_dbz/max_dbz",
            &mut errors,
        );
        if !r.physical_threshold_dbz.is_finite()
            || r.physical_threshold_dbz < r.min_dbz
            || r.physical_threshold_dbz > r.max_dbz
        {
            errors.push(format!(
                "radar.physical_threshold_dbz ({}) must lie within [{}, {}]",
                r.physical_threshold_dbz, r.min_dbz, r.max_dbz
            ));
        }
        if !(-90.0..=90.0).contains(&r.sensor_latitude) {
            errors.push(format!(
                "radar.sensor_latitude ({}) must be within [-90, 90]",
                r.sensor_latitude
            ));
        }
        if !(-180.0..=180.0).contains(&r.sensor_longitude) {
            errors.push(format!(
                "radar.sensor_longitude ({}) must be within [-180, 180]",
                r.sensor_longitude
            ));
        }
        if !r.earth_radius_m.is_finite() || r.earth_radius_m <= 0.0 {
            errors.push(format!(
                "radar.earth_radius_m ({}) must be positive",
                r.earth_radius_m
            ));
        }

        // Model
        if self.model.input_height == 0 || self.model.input_width == 0 {
            errors.push("model.input_height and model.input_width must be > 0".to_string());
        }
        if self.model.forecast_steps == 0 {
            errors.push("model.forecast_steps must be > 0".to_string());
        }

        // Forecast cadence
        let f = &self.forecast;
        Self::check_increasing(
            f.min_cadence_minutes,
            f.max_cadence_minutes,
            "forecast.min_cadence_minutes/max_cadence_minutes",
            &mut errors,
        );
        if !f.default_interval_minutes.is_finite() || f.default_interval_minutes <= 0.0 {
            errors.push(format!(
                "forecast.default_interval_minutes ({}) must be positive",
                f.default_interval_minutes
            ));
        }

        // Converter
        if self.converter.forward.timeout_secs == 0 || self.converter.reverse.timeout_secs == 0 {
            errors.push("converter timeouts must be > 0".to_string());
        }
        if self.converter.forward.binary.trim().is_empty() {
            errors.push("converter.forward.binary must not be empty".to_string());
        }
        for (name, tool) in [("forward", &self.converter.forward), ("reverse", &self.converter.reverse)] {
            if let Some(ext) = &tool.output_extension {
                if ext.is_empty() || ext.contains('.') {
                    errors.push(format!(
                        "converter.{name}.output_extension ('{ext}') must be a bare extension such as 'nc'"
                    ));
                }
            }
        }

        // Cells: threshold < severe < hail
        let c = &self.cells;
        Self::check_increasing(
            f64::from(c.threshold_dbz),
            f64::from(c.severe_dbz),
            "cells.threshold_dbz/severe_dbz",
            &mut errors,
        );
        Self::check_increasing(
            f64::from(c.severe_dbz),
            f64::from(c.hail_dbz),
            "cells.severe_dbz/hail_dbz",
            &mut errors,
        );

        // Alerts
        if !self.alerts.radius_km.is_finite() || self.alerts.radius_km <= 0.0 {
            errors.push(format!(
                "alerts.radius_km ({}) must be positive",
                self.alerts.radius_km
            ));
        }
        if self.alerts.cooldown_minutes < 0 {
            errors.push(format!(
                "alerts.cooldown_minutes ({}) must not be negative",
                self.alerts.cooldown_minutes
            ));
        }

        // Telemetry
        let t = &self.telemetry;
        if t.interval_secs == 0 {
            errors.push("telemetry.interval_secs must be > 0".to_string());
        }
        if t.ttl_secs <= 0 {
            errors.push("telemetry.ttl_secs must be > 0".to_string());
        }
        if t.max_trail_points == 0 {
            errors.push("telemetry.max_trail_points must be > 0".to_string());
        }
        let o = &t.opensky;
        if o.enabled {
            Self::check_increasing(o.min_lat, o.max_lat, "telemetry.opensky.min_lat/max_lat", &mut errors);
            Self::check_increasing(o.min_lon, o.max_lon, "telemetry.opensky.min_lon/max_lon", &mut errors);
            if o.refresh_secs == 0 || o.timeout_secs == 0 {
                errors.push("telemetry.opensky.refresh_secs and timeout_secs must be > 0".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_increasing(lower: f64, upper: f64, name: &str, errors: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass
        if !lower.is_finite() || !upper.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got {lower}, {upper})"
            ));
            return;
        }
        if upper <= lower {
            errors.push(format!(
                "{name}: upper ({upper:.3}) must be greater than lower ({lower:.3})"
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Paths
// ============================================================================

/// Filesystem layout. The directories are the durable queues of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw volumes waiting for conversion
    #[serde(default = "default_raw_inbox")]
    pub raw_inbox: PathBuf,
    /// Raw volume currently being converted (claim directory)
    #[serde(default = "default_raw_processing")]
    pub raw_processing: PathBuf,
    /// Raw volumes already handed to the converter
    #[serde(default = "default_raw_archive")]
    pub raw_archive: PathBuf,
    /// Converted frames forming the sliding window
    #[serde(default = "default_converted_buffer")]
    pub converted_buffer: PathBuf,
    /// Converted frames evicted from the window
    #[serde(default = "default_converted_archive")]
    pub converted_archive: PathBuf,
    /// One subdirectory per forecast cycle
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Status surface for external health checks
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    /// Lock file and subscriber database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_raw_inbox() -> PathBuf { PathBuf::from("data/raw/inbox") }
fn default_raw_processing() -> PathBuf { PathBuf::from("data/raw/processing") }
fn default_raw_archive() -> PathBuf { PathBuf::from("data/raw/archive") }
fn default_converted_buffer() -> PathBuf { PathBuf::from("data/converted/buffer") }
fn default_converted_archive() -> PathBuf { PathBuf::from("data/converted/archive") }
fn default_output_dir() -> PathBuf { PathBuf::from("data/output") }
fn default_status_file() -> PathBuf { PathBuf::from("data/status.json") }
fn default_data_dir() -> PathBuf { PathBuf::from("data/state") }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_inbox: default_raw_inbox(),
            raw_processing: default_raw_processing(),
            raw_archive: default_raw_archive(),
            converted_buffer: default_converted_buffer(),
            converted_archive: default_converted_archive(),
            output_dir: default_output_dir(),
            status_file: default_status_file(),
            data_dir: default_data_dir(),
        }
    }
}

impl PathsConfig {
    /// Lay every directory out under a single root (tests, demos).
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            raw_inbox: root.join("raw/inbox"),
            raw_processing: root.join("raw/processing"),
            raw_archive: root.join("raw/archive"),
            converted_buffer: root.join("converted/buffer"),
            converted_archive: root.join("converted/archive"),
            output_dir: root.join("output"),
            status_file: root.join("status.json"),
            data_dir: root.join("state"),
        }
    }
}

// ============================================================================
// Window
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Frames per predictor input (N)
    #[serde(default = "default_window_length")]
    pub length: usize,
    /// Idle sleep between iterations (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Extension of raw volumes in the inbox
    #[serde(default = "default_raw_extension")]
    pub raw_extension: String,
    /// Extension of converted grid documents
    #[serde(default = "default_converted_extension")]
    pub converted_extension: String,
}

fn default_window_length() -> usize { defaults::WINDOW_LENGTH }
fn default_poll_interval_secs() -> u64 { defaults::POLL_INTERVAL_SECS }
fn default_raw_extension() -> String { defaults::RAW_EXTENSION.to_string() }
fn default_converted_extension() -> String { defaults::CONVERTED_EXTENSION.to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            length: default_window_length(),
            poll_interval_secs: default_poll_interval_secs(),
            raw_extension: default_raw_extension(),
            converted_extension: default_converted_extension(),
        }
    }
}

// ============================================================================
// Radar
// ============================================================================

/// Radar site identity, reflectivity domain and projection origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarConfig {
    #[serde(default = "default_radar_name")]
    pub radar_name: String,
    #[serde(default = "default_institution")]
    pub institution: String,
    /// Preferred reflectivity variable inside grid documents
    #[serde(default = "default_variable_name")]
    pub variable_name: String,
    #[serde(default = "default_min_dbz")]
    pub min_dbz: f32,
    #[serde(default = "default_max_dbz")]
    pub max_dbz: f32,
    /// Forecast values below this become missing
    #[serde(default = "default_physical_threshold_dbz")]
    pub physical_threshold_dbz: f32,
    #[serde(default = "default_sensor_latitude")]
    pub sensor_latitude: f64,
    #[serde(default = "default_sensor_longitude")]
    pub sensor_longitude: f64,
    #[serde(default = "default_earth_radius_m")]
    pub earth_radius_m: f64,
}

fn default_radar_name() -> String { "RMA".to_string() }
fn default_institution() -> String { "UM".to_string() }
fn default_variable_name() -> String { defaults::VARIABLE_NAME.to_string() }
fn default_min_dbz() -> f32 { defaults::MIN_DBZ }
fn default_max_dbz() -> f32 { defaults::MAX_DBZ }
fn default_physical_threshold_dbz() -> f32 { defaults::PHYSICAL_THRESHOLD_DBZ }
fn default_sensor_latitude() -> f64 { defaults::SENSOR_LATITUDE }
fn default_sensor_longitude() -> f64 { defaults::SENSOR_LONGITUDE }
fn default_earth_radius_m() -> f64 { defaults::EARTH_RADIUS_M }

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            radar_name: default_radar_name(),
            institution: default_institution(),
            variable_name: default_variable_name(),
            min_dbz: default_min_dbz(),
            max_dbz: default_max_dbz(),
            physical_threshold_dbz: default_physical_threshold_dbz(),
            sensor_latitude: default_sensor_latitude(),
            sensor_longitude: default_sensor_longitude(),
            earth_radius_m: default_earth_radius_m(),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_height")]
    pub input_height: usize,
    #[serde(default = "default_model_width")]
    pub input_width: usize,
    /// Lead times produced per cycle (K)
    #[serde(default = "default_forecast_steps")]
    pub forecast_steps: usize,
}

fn default_model_height() -> usize { defaults::MODEL_HEIGHT }
fn default_model_width() -> usize { defaults::MODEL_WIDTH }
fn default_forecast_steps() -> usize { defaults::FORECAST_STEPS }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_height: default_model_height(),
            input_width: default_model_width(),
            forecast_steps: default_forecast_steps(),
        }
    }
}

// ============================================================================
// Forecast
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Lead spacing when the observed cadence is out of range (minutes)
    #[serde(default = "default_interval_minutes")]
    pub default_interval_minutes: f64,
    #[serde(default = "default_min_cadence_minutes")]
    pub min_cadence_minutes: f64,
    #[serde(default = "default_max_cadence_minutes")]
    pub max_cadence_minutes: f64,
    /// zstd-compress written grid documents
    #[serde(default)]
    pub compress_output: bool,
    /// Write `.meta.json` renderer sidecars next to each grid
    #[serde(default = "default_true")]
    pub write_sidecars: bool,
}

fn default_interval_minutes() -> f64 { defaults::DEFAULT_INTERVAL_MINUTES }
fn default_min_cadence_minutes() -> f64 { defaults::MIN_CADENCE_MINUTES }
fn default_max_cadence_minutes() -> f64 { defaults::MAX_CADENCE_MINUTES }
fn default_true() -> bool { true }

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_interval_minutes: default_interval_minutes(),
            min_cadence_minutes: default_min_cadence_minutes(),
            max_cadence_minutes: default_max_cadence_minutes(),
            compress_output: false,
            write_sidecars: true,
        }
    }
}

// ============================================================================
// Converter
// ============================================================================

/// One external conversion tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Binary name (resolved through PATH) or absolute path
    pub binary: String,
    /// Parameter file handed to the tool with `-params`
    #[serde(default)]
    pub params_file: Option<PathBuf>,
    /// Extra arguments appended after the standard ones
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_converter_timeout_secs")]
    pub timeout_secs: u64,
    /// Extension the tool writes into its output directory. The produced
    /// file is renamed to the pipeline's extension. Unset: same as the
    /// pipeline's extension.
    #[serde(default)]
    pub output_extension: Option<String>,
}

fn default_converter_timeout_secs() -> u64 { defaults::CONVERTER_TIMEOUT_SECS }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Raw volume -> grid document
    #[serde(default = "default_forward_tool")]
    pub forward: ToolConfig,
    /// Forecast grid -> raw volume
    #[serde(default = "default_reverse_tool")]
    pub reverse: ToolConfig,
    /// Convert forecast grids back to the raw format after each cycle
    #[serde(default = "default_true")]
    pub reverse_enabled: bool,
}

fn default_forward_tool() -> ToolConfig {
    ToolConfig {
        binary: defaults::FORWARD_TOOL.to_string(),
        params_file: Some(PathBuf::from("params/Mdv2NetCDF.params")),
        extra_args: Vec::new(),
        timeout_secs: default_converter_timeout_secs(),
        output_extension: Some(defaults::FORWARD_TOOL_EXTENSION.to_string()),
    }
}

fn default_reverse_tool() -> ToolConfig {
    ToolConfig {
        binary: defaults::REVERSE_TOOL.to_string(),
        params_file: Some(PathBuf::from("params/NcGeneric2Mdv.params")),
        extra_args: Vec::new(),
        timeout_secs: default_converter_timeout_secs(),
        output_extension: Some(defaults::REVERSE_TOOL_EXTENSION.to_string()),
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            forward: default_forward_tool(),
            reverse: default_reverse_tool(),
            reverse_enabled: true,
        }
    }
}

// ============================================================================
// Cells
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellConfig {
    /// Mask threshold (strictly greater)
    #[serde(default = "default_cell_threshold_dbz")]
    pub threshold_dbz: f32,
    /// Tier 2 above this peak
    #[serde(default = "default_severe_dbz")]
    pub severe_dbz: f32,
    /// Tier 3 above this peak
    #[serde(default = "default_hail_dbz")]
    pub hail_dbz: f32,
}

fn default_cell_threshold_dbz() -> f32 { defaults::CELL_THRESHOLD_DBZ }
fn default_severe_dbz() -> f32 { defaults::SEVERE_THRESHOLD_DBZ }
fn default_hail_dbz() -> f32 { defaults::HAIL_THRESHOLD_DBZ }

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            threshold_dbz: default_cell_threshold_dbz(),
            severe_dbz: default_severe_dbz(),
            hail_dbz: default_hail_dbz(),
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Where subscriber records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryBackend {
    /// sled database under `paths.data_dir`
    Sled,
    /// Process memory only; lost on restart
    Memory,
}

/// How alerts leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    /// Log the alert, deliver nothing
    Log,
    /// POST JSON to each device endpoint
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_alert_radius_km")]
    pub radius_km: f64,
    #[serde(default = "default_alert_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default = "default_registry_backend")]
    pub registry: RegistryBackend,
    #[serde(default = "default_notifier_kind")]
    pub notifier: NotifierKind,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

fn default_alert_radius_km() -> f64 { defaults::ALERT_RADIUS_KM }
fn default_alert_cooldown_minutes() -> i64 { defaults::ALERT_COOLDOWN_MINUTES }
fn default_registry_backend() -> RegistryBackend { RegistryBackend::Sled }
fn default_notifier_kind() -> NotifierKind { NotifierKind::Log }
fn default_webhook_timeout_secs() -> u64 { defaults::WEBHOOK_TIMEOUT_SECS }

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_km: default_alert_radius_km(),
            cooldown_minutes: default_alert_cooldown_minutes(),
            registry: default_registry_backend(),
            notifier: default_notifier_kind(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Directory holding daily `YYYYMMDD.data` files
    #[serde(default = "default_telemetry_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_telemetry_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_telemetry_ttl_secs")]
    pub ttl_secs: i64,
    #[serde(default = "default_max_trail_points")]
    pub max_trail_points: usize,
    /// Clock whose calendar day names the current feed file
    #[serde(default)]
    pub file_date: FeedDateZone,
    /// Callsign -> registration
    #[serde(default)]
    pub callsigns: BTreeMap<String, String>,
    /// OpenSky Network positions merged into the local feed
    #[serde(default)]
    pub opensky: OpenSkyConfig,
}

/// The feed writer names its daily files after the host's local date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedDateZone {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSkyConfig {
    /// Requires the `opensky` feature
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_opensky_url")]
    pub url: String,
    #[serde(default = "default_opensky_min_lat")]
    pub min_lat: f64,
    #[serde(default = "default_opensky_max_lat")]
    pub max_lat: f64,
    #[serde(default = "default_opensky_min_lon")]
    pub min_lon: f64,
    #[serde(default = "default_opensky_max_lon")]
    pub max_lon: f64,
    /// Responses are reused for this long
    #[serde(default = "default_opensky_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default = "default_opensky_timeout_secs")]
    pub timeout_secs: u64,
    /// ICAO24 address or callsign fragment -> registration
    #[serde(default)]
    pub aircraft: BTreeMap<String, String>,
}

fn default_opensky_url() -> String { defaults::OPENSKY_URL.to_string() }
fn default_opensky_min_lat() -> f64 { defaults::OPENSKY_BBOX[0] }
fn default_opensky_min_lon() -> f64 { defaults::OPENSKY_BBOX[1] }
fn default_opensky_max_lat() -> f64 { defaults::OPENSKY_BBOX[2] }
fn default_opensky_max_lon() -> f64 { defaults::OPENSKY_BBOX[3] }
fn default_opensky_refresh_secs() -> u64 { defaults::OPENSKY_REFRESH_SECS }
fn default_opensky_timeout_secs() -> u64 { defaults::OPENSKY_TIMEOUT_SECS }

impl Default for OpenSkyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_opensky_url(),
            min_lat: default_opensky_min_lat(),
            max_lat: default_opensky_max_lat(),
            min_lon: default_opensky_min_lon(),
            max_lon: default_opensky_max_lon(),
            refresh_secs: default_opensky_refresh_secs(),
            timeout_secs: default_opensky_timeout_secs(),
            aircraft: BTreeMap::new(),
        }
    }
}

fn default_telemetry_dir() -> PathBuf { PathBuf::from("data/telemetry") }
fn default_telemetry_interval_secs() -> u64 { defaults::TELEMETRY_INTERVAL_SECS }
fn default_telemetry_ttl_secs() -> i64 { defaults::TELEMETRY_TTL_SECS }
fn default_max_trail_points() -> usize { defaults::MAX_TRAIL_POINTS }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_telemetry_dir(),
            interval_secs: default_telemetry_interval_secs(),
            ttl_secs: default_telemetry_ttl_secs(),
            max_trail_points: default_max_trail_points(),
            callsigns: BTreeMap::new(),
            file_date: FeedDateZone::default(),
            opensky: OpenSkyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.window.length, defaults::WINDOW_LENGTH);
        assert_eq!(config.radar.variable_name, "DBZ");
        assert!((config.radar.min_dbz - defaults::MIN_DBZ).abs() < f32::EPSILON);
        assert_eq!(config.alerts.registry, RegistryBackend::Sled);
    }

    #[test]
    fn test_partial_override() {
        let toml_str = r#"
[window]
length = 4

[alerts]
radius_km = 35.0
notifier = "webhook"
"#;
        let config = PipelineConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.window.length, 4);
        assert_eq!(config.window.poll_interval_secs, defaults::POLL_INTERVAL_SECS);
        assert!((config.alerts.radius_km - 35.0).abs() < f64::EPSILON);
        assert_eq!(config.alerts.notifier, NotifierKind::Webhook);
    }

    #[test]
    fn test_validation_catches_inverted_tiers() {
        let mut config = PipelineConfig::default();
        config.cells.severe_dbz = 60.0;
        config.cells.hail_dbz = 58.0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("cells.severe_dbz/hail_dbz")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_nan_domain() {
        let mut config = PipelineConfig::default();
        config.radar.max_dbz = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_of_one_rejected() {
        let mut config = PipelineConfig::default();
        config.window.length = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_toml() {
        let mut config = PipelineConfig::default();
        config.telemetry.callsigns.insert("ARG123".into(), "LV-ABC".into());
        let text = config.to_toml().unwrap();
        let back = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.telemetry.callsigns.get("ARG123").map(String::as_str), Some("LV-ABC"));
        assert_eq!(back.converter.forward.binary, defaults::FORWARD_TOOL);
    }
}
