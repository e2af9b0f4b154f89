//! HailCast: radar nowcasting pipeline
//!
//! Converts incoming radar volumes, keeps a sliding window of recent frames,
//! runs a predictor over it, writes georeferenced forecast grids, finds
//! storm cells and alerts nearby subscribers.
//!
//! ## Architecture
//!
//! - **Converter Gateway**: external format tools under a timeout
//! - **Window Buffer**: the N most recent converted frames, on disk
//! - **Preprocessor / Postprocessor**: grids to model tensor and back
//! - **Cell Detector**: 8-connected regions above threshold, tiered by peak
//! - **Proximity Alerter**: great-circle distance to subscribers, with cooldown
//! - **Processing Loop**: the state machine tying it together

pub mod alerts;
pub mod config;
pub mod converter;
pub mod detection;
pub mod grid;
pub mod inference;
pub mod pipeline;
pub mod render;
pub mod storage;
pub mod telemetry;
pub mod types;

// Re-export configuration
pub use config::PipelineConfig;

// Re-export commonly used types
pub use types::{
    Frame, FrameFormat, ForecastOutput, ForecastSet, GeoPoint, PipelinePhase, PipelineStatus,
    SeverityTier, StormCell, Subscriber, Window,
};

// Re-export pipeline components
pub use pipeline::{CycleCoordinator, ProcessingLoop, WindowBuffer};

// Re-export collaborator seams
pub use alerts::Notifier;
pub use converter::ToolInvoker;
pub use inference::Predictor;
pub use storage::SubscriberRegistry;
