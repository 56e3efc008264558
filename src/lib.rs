//! Debounced seat occupancy monitoring.
//!
//! A camera watches a set of configured seat regions; a per-frame detector
//! says "someone there / not there" per region, and the [`tracker`] turns
//! that noisy signal into stable entry/exit events with durations. Records
//! go to CSV, snapshots to JSON, and each day gets a text report.

pub mod config;
pub mod detect;
pub mod error;
pub mod event_bus;
pub mod metrics;
pub mod monitor;
pub mod persist;
pub mod report;
pub mod source;
pub mod tracker;
pub mod types;

pub use config::Config;
pub use error::{ReportError, TrackerError};
pub use monitor::Monitor;
pub use tracker::OccupancyTracker;
pub use types::{Frame, OccupancyRecord, Region, StateSnapshot, TransitionEvent};
