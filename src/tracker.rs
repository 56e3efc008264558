// src/tracker.rs
//
// The occupancy state machine. Converts a noisy per-frame "person present?"
// signal into debounced Free/Occupied transitions with entry/exit timestamps.
// Performs no I/O: records and snapshots are returned to the caller, which
// decides how to persist them. One independent instance per monitor.

use crate::config::TrackingConfig;
use crate::error::TrackerError;
use crate::types::{OccupancyRecord, Region, RegionStatus, StateSnapshot, TransitionEvent};
use chrono::{DateTime, Duration, Local};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Mutable per-region state, owned exclusively by the tracker.
#[derive(Debug, Clone, Default)]
struct RegionState {
    occupied: bool,
    entry_time: Option<DateTime<Local>>,
    person_id: Option<String>,
    consecutive_positive: u32,
    consecutive_negative: u32,
    last_at: Option<DateTime<Local>>,
}

pub struct OccupancyTracker {
    params: TrackingConfig,
    regions: BTreeMap<u32, Region>,
    states: BTreeMap<u32, RegionState>,
    last_snapshot_at: Option<DateTime<Local>>,
    guest_counter: u32,
}

impl OccupancyTracker {
    pub fn new(regions: Vec<Region>, params: TrackingConfig) -> Self {
        let states = regions
            .iter()
            .map(|r| (r.id, RegionState::default()))
            .collect();
        let regions = regions.into_iter().map(|r| (r.id, r)).collect();
        Self {
            params,
            regions,
            states,
            last_snapshot_at: None,
            guest_counter: 0,
        }
    }

    /// Feed one detection sample for one region.
    ///
    /// Returns `Ok(Some(event))` only when a debounce threshold was crossed
    /// this frame. Timestamps are expected to be non-decreasing per region;
    /// a backwards step is logged as a data-quality warning, not an error.
    pub fn observe(
        &mut self,
        region_id: u32,
        detected: bool,
        at: DateTime<Local>,
    ) -> Result<Option<TransitionEvent>, TrackerError> {
        self.observe_labeled(region_id, detected, None, at)
    }

    /// Like [`observe`](Self::observe), but lets the detector attach an
    /// identity hint that becomes the `person_id` if this sample confirms an
    /// entry. Without a hint a placeholder label is synthesized.
    pub fn observe_labeled(
        &mut self,
        region_id: u32,
        detected: bool,
        person_hint: Option<&str>,
        at: DateTime<Local>,
    ) -> Result<Option<TransitionEvent>, TrackerError> {
        let region_name = self
            .regions
            .get(&region_id)
            .ok_or(TrackerError::UnknownRegion(region_id))?
            .name
            .clone();
        let state = self
            .states
            .get_mut(&region_id)
            .ok_or(TrackerError::UnknownRegion(region_id))?;

        if let Some(last) = state.last_at {
            if at < last {
                warn!(
                    "region {} timestamp went backwards ({} -> {}), treating as in-order",
                    region_id, last, at
                );
            }
        }
        state.last_at = Some(at);

        if detected {
            state.consecutive_negative = 0;
            state.consecutive_positive = state.consecutive_positive.saturating_add(1);

            if !state.occupied && state.consecutive_positive >= self.params.enter_threshold {
                state.occupied = true;
                state.entry_time = Some(at);
                state.consecutive_positive = 0;
                let person_id = match person_hint {
                    Some(hint) => hint.to_string(),
                    None => {
                        self.guest_counter += 1;
                        format!("guest-{}", self.guest_counter)
                    }
                };
                state.person_id = Some(person_id.clone());
                return Ok(Some(TransitionEvent::Entered {
                    region_id,
                    region_name,
                    at,
                    person_id,
                }));
            }
        } else {
            state.consecutive_positive = 0;
            state.consecutive_negative = state.consecutive_negative.saturating_add(1);

            if state.occupied && state.consecutive_negative >= self.params.exit_threshold {
                state.consecutive_negative = 0;
                return Ok(Some(close_interval(
                    state,
                    region_id,
                    region_name,
                    at,
                    self.params.min_valid_duration_secs,
                )));
            }
        }

        Ok(None)
    }

    /// Serializable snapshot of every region's current state.
    pub fn snapshot(&self, now: DateTime<Local>) -> StateSnapshot {
        let regions = self
            .regions
            .values()
            .map(|region| {
                let state = &self.states[&region.id];
                RegionStatus {
                    region_id: region.id,
                    region_name: region.name.clone(),
                    occupied: state.occupied,
                    entry_time: state.entry_time,
                    person_id: state.person_id.clone(),
                }
            })
            .collect();
        StateSnapshot {
            taken_at: now,
            regions,
        }
    }

    /// Returns a snapshot once per configured interval, else `None`. The
    /// first call arms the timer. Driven by the caller's clock so the
    /// tracker stays synchronously testable.
    pub fn maybe_snapshot(&mut self, now: DateTime<Local>) -> Option<StateSnapshot> {
        match self.last_snapshot_at {
            None => {
                self.last_snapshot_at = Some(now);
                None
            }
            Some(prev) if now - prev >= Duration::seconds(self.params.snapshot_interval_secs) => {
                self.last_snapshot_at = Some(now);
                Some(self.snapshot(now))
            }
            Some(_) => None,
        }
    }

    /// Shutdown policy: force-close every in-progress interval at `at` so
    /// nothing is silently lost. The minimum-duration filter still applies,
    /// so a just-started interval is discarded like any other blip.
    pub fn close_all(&mut self, at: DateTime<Local>) -> Vec<TransitionEvent> {
        let mut events = Vec::new();
        for (&region_id, state) in self.states.iter_mut() {
            if !state.occupied {
                continue;
            }
            let region_name = self.regions[&region_id].name.clone();
            state.consecutive_positive = 0;
            state.consecutive_negative = 0;
            events.push(close_interval(
                state,
                region_id,
                region_name,
                at,
                self.params.min_valid_duration_secs,
            ));
        }
        events
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn is_occupied(&self, region_id: u32) -> Result<bool, TrackerError> {
        self.states
            .get(&region_id)
            .map(|s| s.occupied)
            .ok_or(TrackerError::UnknownRegion(region_id))
    }
}

/// Confirmed exit: flip to Free, fix the duration, and decide whether the
/// interval earns a record or gets discarded as a blip.
fn close_interval(
    state: &mut RegionState,
    region_id: u32,
    region_name: String,
    at: DateTime<Local>,
    min_valid_duration_secs: f64,
) -> TransitionEvent {
    state.occupied = false;
    let person_id = state.person_id.take();
    let record = match state.entry_time.take() {
        Some(entry_time) => {
            let duration_seconds = (at - entry_time).num_milliseconds() as f64 / 1000.0;
            if duration_seconds >= min_valid_duration_secs {
                Some(OccupancyRecord {
                    seat_id: region_id,
                    seat_name: region_name.clone(),
                    entry_time,
                    exit_time: at,
                    duration_seconds,
                    person_id,
                })
            } else {
                debug!(
                    "region {} interval of {:.1}s below minimum, discarding as blip",
                    region_id, duration_seconds
                );
                None
            }
        }
        None => {
            // Unreachable while the occupied => entry_time invariant holds.
            warn!("region {} was occupied without an entry time", region_id);
            None
        }
    };
    TransitionEvent::Left {
        region_id,
        region_name,
        at,
        record,
    }
}
