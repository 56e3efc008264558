// src/metrics.rs
//
// Monitoring-loop observability. Cheap atomic counters that can be read
// from another thread (the counters clone, the data doesn't).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct MonitorMetrics {
    pub frames: Arc<AtomicU64>,
    pub positive_detections: Arc<AtomicU64>,
    pub entries: Arc<AtomicU64>,
    pub exits: Arc<AtomicU64>,
    pub discarded_blips: Arc<AtomicU64>,
    pub snapshots: Arc<AtomicU64>,
    pub sink_failures: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            positive_detections: Arc::new(AtomicU64::new(0)),
            entries: Arc::new(AtomicU64::new(0)),
            exits: Arc::new(AtomicU64::new(0)),
            discarded_blips: Arc::new(AtomicU64::new(0)),
            snapshots: Arc::new(AtomicU64::new(0)),
            sink_failures: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames: self.frames.load(Ordering::Relaxed),
            fps: self.fps(),
            positive_detections: self.positive_detections.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
            exits: self.exits.load(Ordering::Relaxed),
            discarded_blips: self.discarded_blips.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames: u64,
    pub fps: f64,
    pub positive_detections: u64,
    pub entries: u64,
    pub exits: u64,
    pub discarded_blips: u64,
    pub snapshots: u64,
    pub sink_failures: u64,
    pub elapsed_secs: f64,
}
