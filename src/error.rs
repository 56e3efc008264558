// src/error.rs

use chrono::NaiveDate;
use thiserror::Error;

/// Errors from the occupancy tracker. Fatal to the call, never to the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("unknown region id {0}")]
    UnknownRegion(u32),
}

/// Errors from reporting. `NoData` is an expected outcome, not a failure:
/// callers decide whether to surface it or silently skip the day.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no occupancy records for {0}")]
    NoData(NaiveDate),
    #[error("failed to read records: {0}")]
    Io(#[from] std::io::Error),
}
