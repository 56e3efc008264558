// src/source.rs
//
// Where frames come from. The camera driver itself is out of scope; on the
// Pi a companion process drops JPEGs into a spool directory and
// `DirectoryFrameSource` picks up the newest one. `Ok(None)` means "nothing
// new this tick", never "stream ended" — the monitor decides when to stop.

use crate::types::Frame;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "JPG"];

/// Polls a spool directory for the most recently modified image file and
/// decodes it to grayscale. A file is served at most once.
pub struct DirectoryFrameSource {
    dir: PathBuf,
    last_served: Option<(SystemTime, PathBuf)>,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_served: None,
        }
    }

    fn newest_image(&self) -> Option<(SystemTime, PathBuf)> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e))
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                continue;
            };
            if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                newest = Some((modified, path.to_path_buf()));
            }
        }
        newest
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some((modified, path)) = self.newest_image() else {
            return Ok(None);
        };
        if self.last_served.as_ref() == Some(&(modified, path.clone())) {
            return Ok(None);
        }
        let frame = load_frame(&path, modified)?;
        debug!(
            "frame {}x{} from {}",
            frame.width,
            frame.height,
            path.display()
        );
        self.last_served = Some((modified, path));
        Ok(Some(frame))
    }
}

fn load_frame(path: &Path, modified: SystemTime) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_luma8();
    let (width, height) = image.dimensions();
    Ok(Frame {
        data: image.into_raw(),
        width,
        height,
        captured_at: DateTime::<Local>::from(modified),
    })
}

/// Serves a fixed frame sequence, then optionally flips a stop flag —
/// lets the full monitor loop run deterministically in tests.
pub struct ScriptedFrameSource {
    frames: std::collections::VecDeque<Frame>,
    stop_when_empty: Option<Arc<AtomicBool>>,
}

impl ScriptedFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            stop_when_empty: None,
        }
    }

    pub fn stop_when_empty(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop_when_empty = Some(stop);
        self
    }
}

impl FrameSource for ScriptedFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => {
                if let Some(stop) = &self.stop_when_empty {
                    stop.store(true, Ordering::Relaxed);
                }
                Ok(None)
            }
        }
    }
}
