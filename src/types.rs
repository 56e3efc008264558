// src/types.rs

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A named polygonal area of the camera frame monitored for occupancy.
/// Immutable after configuration load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: u32,
    pub name: String,
    /// Ordered polygon vertices in frame coordinates. Always >= 3 points
    /// (enforced at config load).
    pub polygon: Vec<(u32, u32)>,
}

impl Region {
    /// Axis-aligned bounding box of the polygon, clamped to the frame,
    /// as (x0, y0, x1, y1) with exclusive upper bounds.
    pub fn bounding_box(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let x0 = self.polygon.iter().map(|p| p.0).min().unwrap_or(0);
        let y0 = self.polygon.iter().map(|p| p.1).min().unwrap_or(0);
        let x1 = self.polygon.iter().map(|p| p.0).max().unwrap_or(0);
        let y1 = self.polygon.iter().map(|p| p.1).max().unwrap_or(0);
        (
            x0.min(frame_width),
            y0.min(frame_height),
            x1.min(frame_width),
            y1.min(frame_height),
        )
    }
}

/// A single captured camera frame, 8-bit grayscale.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Local>,
}

/// One completed occupancy interval. Created exactly once per confirmed
/// qualifying exit and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyRecord {
    pub seat_id: u32,
    pub seat_name: String,
    pub entry_time: DateTime<Local>,
    pub exit_time: DateTime<Local>,
    pub duration_seconds: f64,
    pub person_id: Option<String>,
}

/// Debounced state transition emitted by the tracker.
#[derive(Debug, Clone)]
pub enum TransitionEvent {
    /// A seat just crossed the enter threshold.
    Entered {
        region_id: u32,
        region_name: String,
        at: DateTime<Local>,
        person_id: String,
    },
    /// A seat just crossed the exit threshold. `record` is `None` when the
    /// interval was shorter than the minimum valid duration and was
    /// discarded as a detector blip (nothing is persisted for it).
    Left {
        region_id: u32,
        region_name: String,
        at: DateTime<Local>,
        record: Option<OccupancyRecord>,
    },
}

impl TransitionEvent {
    pub fn region_id(&self) -> u32 {
        match self {
            Self::Entered { region_id, .. } | Self::Left { region_id, .. } => *region_id,
        }
    }
}

/// Point-in-time serialization of every region's current state, used for
/// periodic durability and crash diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub taken_at: DateTime<Local>,
    pub regions: Vec<RegionStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionStatus {
    pub region_id: u32,
    pub region_name: String,
    pub occupied: bool,
    pub entry_time: Option<DateTime<Local>>,
    pub person_id: Option<String>,
}
