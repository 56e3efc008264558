// src/detect.rs
//
// The "is someone in this region?" collaborator. The tracker only ever sees
// the boolean, so anything frame-shaped can sit behind this trait: the
// background differencer below, a scripted sequence in tests, or a real
// model. `on_transition` is the tuning hook the original used to fold a
// newly seated person into its background model faster.

use crate::types::{Frame, Region, TransitionEvent};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub present: bool,
    /// Optional identity label for the person seen. Carries no
    /// authentication meaning; becomes `person_id` on entry.
    pub person_hint: Option<String>,
}

pub trait Detector {
    /// Called once per frame before any region queries, for detectors that
    /// keep frame-level state (background models).
    fn begin_frame(&mut self, _frame: &Frame) {}

    fn detect(&mut self, frame: &Frame, region: &Region) -> Detection;

    /// Notification of confirmed transitions, for detector-side tuning.
    fn on_transition(&mut self, _event: &TransitionEvent) {}
}

/// Background-subtraction stand-in for the original's contour heuristic:
/// keeps an exponentially weighted background frame and flags a region when
/// the mean absolute luminance difference over its bounding box exceeds the
/// motion threshold.
pub struct FrameDiffDetector {
    motion_threshold: f64,
    background_alpha: f32,
    entry_boost_alpha: f32,
    entry_boost_frames: u32,
    background: Vec<f32>,
    width: u32,
    height: u32,
    boost_remaining: u32,
}

impl FrameDiffDetector {
    pub fn new(
        motion_threshold: f64,
        background_alpha: f32,
        entry_boost_alpha: f32,
        entry_boost_frames: u32,
    ) -> Self {
        Self {
            motion_threshold,
            background_alpha,
            entry_boost_alpha,
            entry_boost_frames,
            background: Vec::new(),
            width: 0,
            height: 0,
            boost_remaining: 0,
        }
    }

    pub fn from_config(config: &crate::config::DetectionConfig) -> Self {
        Self::new(
            config.motion_threshold,
            config.background_alpha,
            config.entry_boost_alpha,
            config.entry_boost_frames,
        )
    }

    fn mean_abs_diff(&self, frame: &Frame, region: &Region) -> f64 {
        let (x0, y0, x1, y1) = region.bounding_box(frame.width, frame.height);
        if x1 <= x0 || y1 <= y0 {
            return 0.0;
        }
        let mut sum = 0.0f64;
        let mut count = 0u64;
        for y in y0..y1 {
            let row = (y * frame.width) as usize;
            for x in x0..x1 {
                let idx = row + x as usize;
                sum += (frame.data[idx] as f32 - self.background[idx]).abs() as f64;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}

impl Detector for FrameDiffDetector {
    fn begin_frame(&mut self, frame: &Frame) {
        if self.width != frame.width
            || self.height != frame.height
            || self.background.len() != frame.data.len()
        {
            // First frame (or a resolution change): adopt it wholesale.
            self.background = frame.data.iter().map(|&p| p as f32).collect();
            self.width = frame.width;
            self.height = frame.height;
            debug!("background model reset to {}x{}", frame.width, frame.height);
            return;
        }

        let alpha = if self.boost_remaining > 0 {
            self.boost_remaining -= 1;
            self.entry_boost_alpha
        } else {
            self.background_alpha
        };
        for (bg, &pixel) in self.background.iter_mut().zip(frame.data.iter()) {
            *bg += alpha * (pixel as f32 - *bg);
        }
    }

    fn detect(&mut self, frame: &Frame, region: &Region) -> Detection {
        // No usable model yet, or the frame doesn't match it.
        if self.background.len() != frame.data.len() || self.background.is_empty() {
            return Detection::default();
        }
        Detection {
            present: self.mean_abs_diff(frame, region) > self.motion_threshold,
            person_hint: None,
        }
    }

    fn on_transition(&mut self, event: &TransitionEvent) {
        if let TransitionEvent::Entered { region_id, .. } = event {
            // Learn the seated person into the background quickly so small
            // posture shifts don't read as churn.
            self.boost_remaining = self.entry_boost_frames;
            debug!(
                "boosting background learning for {} frames after entry on region {}",
                self.entry_boost_frames, region_id
            );
        }
    }
}
