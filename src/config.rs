// src/config.rs

use crate::types::Region;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub seats: Vec<SeatConfig>,
    pub tracking: TrackingConfig,
    pub detection: DetectionConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub rotation: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatConfig {
    pub id: u32,
    pub name: String,
    pub region: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Consecutive positive frames before a seat counts as taken.
    pub enter_threshold: u32,
    /// Consecutive negative frames before it counts as vacated.
    /// Slower than entry on purpose: a dropped detection mid-occupancy is
    /// more disruptive than a slightly late exit.
    pub exit_threshold: u32,
    /// Intervals shorter than this are discarded as detector blips.
    pub min_valid_duration_secs: f64,
    pub snapshot_interval_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub detection_interval_secs: f64,
    /// Mean absolute luminance difference (0-255) over a region's bounding
    /// box that counts as "someone is there".
    pub motion_threshold: f64,
    pub background_alpha: f32,
    /// Temporarily raised learning rate right after an entry, so the person
    /// folds into the background model quickly.
    pub entry_boost_alpha: f32,
    pub entry_boost_frames: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub reports_dir: String,
    pub frames_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            framerate: 10,
            rotation: 0,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enter_threshold: 3,
            exit_threshold: 5,
            min_valid_duration_secs: 10.0,
            snapshot_interval_secs: 60,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detection_interval_secs: 0.1,
            motion_threshold: 12.0,
            background_alpha: 0.05,
            entry_boost_alpha: 0.3,
            entry_boost_frames: 30,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            reports_dir: "reports".to_string(),
            frames_dir: "frames".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "seat_monitor=info".to_string(),
        }
    }
}

/// The three-seat layout the original deployment shipped with. Used whenever
/// the config file is missing or defines no usable seats.
fn default_seats() -> Vec<SeatConfig> {
    vec![
        SeatConfig {
            id: 1,
            name: "Seat 1".to_string(),
            region: vec![(100, 150), (300, 150), (300, 350), (100, 350)],
        },
        SeatConfig {
            id: 2,
            name: "Seat 2".to_string(),
            region: vec![(350, 150), (550, 150), (550, 350), (350, 350)],
        },
        SeatConfig {
            id: 3,
            name: "Seat 3".to_string(),
            region: vec![(600, 150), (800, 150), (800, 350), (600, 350)],
        },
    ]
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validated region list. Seats with fewer than 3 polygon points or a
    /// duplicate id are dropped with a warning; if nothing survives, the
    /// default layout is used so the monitor always has something to watch.
    pub fn regions(&self) -> Vec<Region> {
        let mut regions = validate_seats(&self.seats);
        if regions.is_empty() {
            warn!("no usable seat regions in config, falling back to default layout");
            regions = validate_seats(&default_seats());
        }
        regions
    }

    /// Tracking parameters with out-of-range values clamped rather than
    /// rejected (thresholds >= 1, duration >= 0).
    pub fn tracking_params(&self) -> TrackingConfig {
        let mut t = self.tracking.clone();
        if t.enter_threshold < 1 {
            warn!("enter_threshold must be >= 1, clamping");
            t.enter_threshold = 1;
        }
        if t.exit_threshold < 1 {
            warn!("exit_threshold must be >= 1, clamping");
            t.exit_threshold = 1;
        }
        if t.min_valid_duration_secs < 0.0 {
            warn!("min_valid_duration_secs must be >= 0, clamping");
            t.min_valid_duration_secs = 0.0;
        }
        if t.snapshot_interval_secs < 1 {
            warn!("snapshot_interval_secs must be >= 1, clamping");
            t.snapshot_interval_secs = 1;
        }
        t
    }
}

fn validate_seats(seats: &[SeatConfig]) -> Vec<Region> {
    let mut regions: Vec<Region> = Vec::new();
    for seat in seats {
        if seat.region.len() < 3 {
            warn!(
                "seat {} ({}) has a degenerate region ({} points), skipping",
                seat.id,
                seat.name,
                seat.region.len()
            );
            continue;
        }
        if regions.iter().any(|r| r.id == seat.id) {
            warn!("duplicate seat id {}, keeping the first definition", seat.id);
            continue;
        }
        regions.push(Region {
            id: seat.id,
            name: seat.name.clone(),
            polygon: seat.region.clone(),
        });
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.tracking.enter_threshold, 3);
        assert_eq!(config.tracking.exit_threshold, 5);
        assert_eq!(config.camera.width, 1280);
        // An empty seat list falls back to the default layout.
        assert_eq!(config.regions().len(), 3);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = r#"
tracking:
  enter_threshold: 2
seats:
  - id: 7
    name: "Window seat"
    region: [[0, 0], [10, 0], [10, 10]]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tracking.enter_threshold, 2);
        assert_eq!(config.tracking.exit_threshold, 5);
        let regions = config.regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].id, 7);
    }

    #[test]
    fn degenerate_and_duplicate_seats_are_dropped() {
        let yaml = r#"
seats:
  - id: 1
    name: "A"
    region: [[0, 0], [10, 10]]
  - id: 2
    name: "B"
    region: [[0, 0], [10, 0], [10, 10], [0, 10]]
  - id: 2
    name: "B again"
    region: [[20, 0], [30, 0], [30, 10], [20, 10]]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let regions = config.regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "B");
    }

    #[test]
    fn out_of_range_tracking_values_are_clamped() {
        let mut config = Config::default();
        config.tracking.enter_threshold = 0;
        config.tracking.min_valid_duration_secs = -5.0;
        let t = config.tracking_params();
        assert_eq!(t.enter_threshold, 1);
        assert_eq!(t.min_valid_duration_secs, 0.0);
    }
}
