//! Shared data structures for the nowcasting pipeline
//!
//! - Frame / Window: radar volumes moving through the queues
//! - ForecastSet: the outputs of one inference cycle
//! - StormCell: detected hazardous regions
//! - Subscriber: alert recipients owned by the registry
//! - PipelineStatus: the externally visible loop state

mod cell;
mod forecast;
mod frame;
mod status;
mod subscriber;

pub use cell::*;
pub use forecast::*;
pub use frame::*;
pub use status::*;
pub use subscriber::*;
