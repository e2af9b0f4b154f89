//! System-wide default constants.
//!
//! Every tunable in `PipelineConfig` falls back to one of these values when
//! the config file is silent. Grouped by subsystem for easy discovery.

// ============================================================================
// Window / Main Loop
// ============================================================================

/// Number of consecutive frames fed to the predictor.
pub const WINDOW_LENGTH: usize = 8;

/// Idle poll interval of the main loop (seconds).
///
/// The error path sleeps twice this long.
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Extension of raw (pre-conversion) radar volumes.
pub const RAW_EXTENSION: &str = "mdv";

/// Extension of converted grid documents.
pub const CONVERTED_EXTENSION: &str = "json";

// ============================================================================
// Radar / Data
// ============================================================================

/// Reflectivity variable name inside converted grids.
pub const VARIABLE_NAME: &str = "DBZ";

/// Domain minimum of reflectivity (dBZ). Missing values are replaced by this.
pub const MIN_DBZ: f32 = -29.0;

/// Domain maximum of reflectivity (dBZ).
pub const MAX_DBZ: f32 = 65.0;

/// Forecast values below this are written as missing (dBZ).
pub const PHYSICAL_THRESHOLD_DBZ: f32 = 30.0;

/// Radar site latitude (degrees).
pub const SENSOR_LATITUDE: f64 = -34.647_998_809_814_45;

/// Radar site longitude (degrees).
pub const SENSOR_LONGITUDE: f64 = -68.016_998_291_015_62;

/// Earth radius used by the grid projection (metres).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Fill value written for missing samples in grid documents.
pub const FILL_VALUE: f32 = -999.0;

/// Native grid edge length when a document carries no coordinates (cells).
pub const NATIVE_GRID_SIZE: usize = 500;

/// Native grid spacing (km).
pub const NATIVE_GRID_SPACING_KM: f32 = 1.0;

// ============================================================================
// Model / Forecast
// ============================================================================

/// Model input height (cells).
pub const MODEL_HEIGHT: usize = 250;

/// Model input width (cells).
pub const MODEL_WIDTH: usize = 250;

/// Number of forecast lead times produced per cycle.
pub const FORECAST_STEPS: usize = 7;

/// Lead spacing used when the observed cadence is implausible (minutes).
pub const DEFAULT_INTERVAL_MINUTES: f64 = 3.0;

/// Shortest observed frame cadence accepted as lead spacing (minutes).
pub const MIN_CADENCE_MINUTES: f64 = 2.0;

/// Longest observed frame cadence accepted as lead spacing (minutes).
pub const MAX_CADENCE_MINUTES: f64 = 15.0;

// ============================================================================
// Converter
// ============================================================================

/// Forward (raw -> grid) tool binary.
pub const FORWARD_TOOL: &str = "Mdv2NetCDF";

/// Extension of the files the forward tool writes.
pub const FORWARD_TOOL_EXTENSION: &str = "nc";

/// Reverse (grid -> raw) tool binary.
pub const REVERSE_TOOL: &str = "NcGeneric2Mdv";

/// Extension of the files the reverse tool writes.
pub const REVERSE_TOOL_EXTENSION: &str = "mdv";

/// Subprocess timeout for a single conversion (seconds).
pub const CONVERTER_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Storm Cells
// ============================================================================

/// Composite reflectivity above which a pixel belongs to a storm cell (dBZ).
pub const CELL_THRESHOLD_DBZ: f32 = 50.0;

/// Peak reflectivity above which a cell is tier 2 (dBZ).
pub const SEVERE_THRESHOLD_DBZ: f32 = 55.0;

/// Peak reflectivity above which a cell is tier 3, probable hail (dBZ).
pub const HAIL_THRESHOLD_DBZ: f32 = 58.0;

// ============================================================================
// Alerts
// ============================================================================

/// Alert radius around a subscriber (km).
pub const ALERT_RADIUS_KM: f64 = 20.0;

/// Minimum time between two alerts to the same subscriber (minutes).
pub const ALERT_COOLDOWN_MINUTES: i64 = 10;

/// Mean Earth radius for great-circle distances (km).
pub const HAVERSINE_EARTH_RADIUS_KM: f64 = 6371.0;

/// HTTP timeout for webhook deliveries (seconds).
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Aircraft Telemetry
// ============================================================================

/// Minimum spacing between two telemetry proximity checks (seconds).
pub const TELEMETRY_INTERVAL_SECS: u64 = 60;

/// Aircraft without an update for this long are dropped (seconds).
pub const TELEMETRY_TTL_SECS: i64 = 30;

/// Maximum number of points kept per aircraft trail.
pub const MAX_TRAIL_POINTS: usize = 70;

/// OpenSky Network state vector endpoint.
pub const OPENSKY_URL: &str = "https://opensky-network.org/api/states/all";

/// OpenSky query box `[min_lat, min_lon, max_lat, max_lon]`, Mendoza operations area.
pub const OPENSKY_BBOX: [f64; 4] = [-36.0, -70.5, -31.5, -66.0];

/// OpenSky responses are reused for this long (anonymous rate limit).
pub const OPENSKY_REFRESH_SECS: u64 = 15;

/// HTTP timeout for one OpenSky request (seconds).
pub const OPENSKY_TIMEOUT_SECS: u64 = 5;
