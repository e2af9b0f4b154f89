//! Nowcasting pipeline
//!
//! ```text
//! raw inbox ──drain──▶ converted buffer ──window──▶ preprocess ──▶ predictor
//!                                                                     │
//!   alerts ◀── cells ◀── sidecars ◀── reverse conversion ◀── postprocess
//! ```
//!
//! - [`WindowBuffer`]: the N most recent converted frames
//! - [`Preprocessor`] / [`Postprocessor`]: grids to tensor and back
//! - [`CycleCoordinator`]: one drain step or one full cycle
//! - [`ProcessingLoop`]: the state machine around the coordinator

mod coordinator;
pub mod postprocess;
pub mod preprocess;
pub mod processing_loop;
mod state;
pub mod window;

pub use coordinator::{CycleCoordinator, CycleReport, DrainOutcome, REVERSE_SUBDIR};
pub use postprocess::{Forecast, PostprocessError, Postprocessor};
pub use preprocess::{PreprocessError, Preprocessed, Preprocessor};
pub use processing_loop::{ProcessingLoop, Step};
pub use state::{IntervalGate, LoopStats};
pub use window::WindowBuffer;
