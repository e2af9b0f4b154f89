//! Pipeline Configuration Module
//!
//! Provides per-deployment configuration loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line (fatal if invalid)
//! 2. `HAILCAST_CONFIG` environment variable (path to TOML file)
//! 3. `hailcast.toml` in the current working directory
//! 4. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(PipelineConfig::load());
//!
//! // Anywhere in the codebase:
//! let radius = config::get().alerts.radius_km;
//! ```

mod pipeline_config;
pub mod defaults;
pub mod validation;

pub use pipeline_config::*;

use std::sync::OnceLock;

/// Global pipeline configuration, initialized once at startup.
static PIPELINE_CONFIG: OnceLock<PipelineConfig> = OnceLock::new();

/// Initialize the global pipeline configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: PipelineConfig) {
    if PIPELINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global pipeline configuration.
///
/// Returns the built-in defaults if `init()` was never called.
pub fn get() -> &'static PipelineConfig {
    PIPELINE_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init() — using defaults");
        PipelineConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    PIPELINE_CONFIG.get().is_some()
}
