// src/event_bus.rs
//
// Decoupled event system. The monitor loop publishes what happened this
// cycle; consumers (logging, detector tuning hooks, embedders) drain
// instead of reaching into tracker state.

use crate::types::TransitionEvent;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Transition(TransitionEvent),
    SnapshotWritten {
        region_count: usize,
    },
    ReportWritten {
        date: NaiveDate,
        path: PathBuf,
    },
}

pub struct EventBus {
    events: VecDeque<MonitorEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: MonitorEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<MonitorEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}
