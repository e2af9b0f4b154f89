//! Durable state on disk
//!
//! - frame queues (inbox, processing, archives, converted buffer)
//! - file-name timestamp strategies
//! - the status surface
//! - the single-writer process lock
//! - the subscriber registry

pub mod frame_store;
pub mod lockfile;
pub mod status;
pub mod subscribers;
pub mod timestamp;

pub use frame_store::{move_file, FrameStore, StoreError};
pub use lockfile::{LockError, ProcessLock};
pub use status::StatusReporter;
pub use subscribers::{InMemoryRegistry, RegistryError, SledRegistry, SubscriberRegistry};
pub use timestamp::{canonical_name, parse_frame_timestamp, ParsedTimestamp, TimestampStrategy};
