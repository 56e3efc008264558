// src/monitor.rs
//
// The capture/tracking loop. Single writer: this loop is the only thing
// that ever mutates tracker state. External readers (the HTTP frame
// endpoint, embedders) get the latest frame through a single-slot mutex
// cell and events through the bus; they never touch the tracker.

use crate::config::Config;
use crate::detect::Detector;
use crate::error::ReportError;
use crate::event_bus::{EventBus, MonitorEvent};
use crate::metrics::MonitorMetrics;
use crate::persist::PersistenceSink;
use crate::report::Reporter;
use crate::source::FrameSource;
use crate::tracker::OccupancyTracker;
use crate::types::{Frame, Region, StateSnapshot, TransitionEvent};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MAX_PENDING_EVENTS: usize = 64;

pub struct Monitor<S: FrameSource, D: Detector> {
    regions: Vec<Region>,
    tracker: OccupancyTracker,
    source: S,
    detector: D,
    sink: Box<dyn PersistenceSink>,
    reporter: Reporter,
    bus: EventBus,
    metrics: MonitorMetrics,
    latest_frame: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
    last_report_date: NaiveDate,
    cycle_budget: Duration,
}

impl<S: FrameSource, D: Detector> Monitor<S, D> {
    pub fn new(config: &Config, source: S, detector: D, sink: Box<dyn PersistenceSink>) -> Self {
        let regions = config.regions();
        let tracker = OccupancyTracker::new(regions.clone(), config.tracking_params());
        let reporter = Reporter::new(&config.data.data_dir, &config.data.reports_dir);
        Self {
            regions,
            tracker,
            source,
            detector,
            sink,
            reporter,
            bus: EventBus::new(MAX_PENDING_EVENTS),
            metrics: MonitorMetrics::new(),
            latest_frame: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            last_report_date: Local::now().date_naive(),
            cycle_budget: Duration::from_secs_f64(config.detection.detection_interval_secs.max(0.01)),
        }
    }

    /// Flip this to ask the loop to stop after the current cycle.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Read-only handoff of the most recent frame for external consumers.
    pub fn latest_frame(&self) -> Arc<Mutex<Option<Frame>>> {
        self.latest_frame.clone()
    }

    pub fn metrics(&self) -> MonitorMetrics {
        self.metrics.clone()
    }

    /// Events published since the last drain (embedders driving
    /// [`process_frame`](Self::process_frame) directly consume these;
    /// [`run`](Self::run) drains them into the log each cycle).
    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        self.bus.drain()
    }

    /// One full detection cycle over a single frame.
    pub fn process_frame(&mut self, frame: Frame) -> Result<()> {
        self.metrics.inc(&self.metrics.frames);
        self.detector.begin_frame(&frame);

        let mut transitions = Vec::new();
        for region in &self.regions {
            let detection = self.detector.detect(&frame, region);
            if detection.present {
                self.metrics.inc(&self.metrics.positive_detections);
            }
            if let Some(event) = self.tracker.observe_labeled(
                region.id,
                detection.present,
                detection.person_hint.as_deref(),
                frame.captured_at,
            )? {
                transitions.push(event);
            }
        }
        for event in transitions {
            self.handle_transition(event);
        }

        if let Some(snapshot) = self.tracker.maybe_snapshot(frame.captured_at) {
            self.write_snapshot(&snapshot);
        }
        self.roll_report(frame.captured_at.date_naive());

        match self.latest_frame.lock() {
            Ok(mut slot) => *slot = Some(frame),
            Err(_) => warn!("latest-frame cell poisoned, skipping handoff"),
        }
        Ok(())
    }

    /// Run until the stop flag flips, then flush. Cycles are paced to the
    /// configured detection interval; an empty tick (no new frame) just
    /// sleeps out its budget.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "seat monitor running: {} region(s), cycle budget {:?}",
            self.regions.len(),
            self.cycle_budget
        );

        while !self.stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(err) = self.process_frame(frame) {
                        warn!("frame processing failed: {err:#}");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!("frame capture failed: {err:#}"),
            }

            for event in self.bus.drain() {
                log_event(&event);
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_budget {
                std::thread::sleep(self.cycle_budget - elapsed);
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Shutdown flush: force-close in-progress intervals (so they are
    /// recorded rather than lost), write a final snapshot, and attempt
    /// today's report.
    fn shutdown(&mut self) {
        info!("stopping seat monitor");
        let now = Local::now();

        for event in self.tracker.close_all(now) {
            self.handle_transition(event);
        }

        let snapshot = self.tracker.snapshot(now);
        self.write_snapshot(&snapshot);

        match self.reporter.generate(now.date_naive()) {
            Ok(path) => info!("final report written to {}", path.display()),
            Err(ReportError::NoData(date)) => debug!("no records for {}, no final report", date),
            Err(err) => warn!("final report failed: {err}"),
        }

        for event in self.bus.drain() {
            log_event(&event);
        }

        let summary = self.metrics.summary();
        info!(
            "session totals: {} frames ({:.1} fps), {} entries, {} exits, {} blip(s) discarded, {} sink failure(s)",
            summary.frames,
            summary.fps,
            summary.entries,
            summary.exits,
            summary.discarded_blips,
            summary.sink_failures
        );
    }

    fn handle_transition(&mut self, event: TransitionEvent) {
        match &event {
            TransitionEvent::Entered { .. } => {
                self.metrics.inc(&self.metrics.entries);
            }
            TransitionEvent::Left { record, .. } => {
                self.metrics.inc(&self.metrics.exits);
                match record {
                    Some(record) => {
                        if let Err(err) = self.sink.append(record) {
                            // The sink keeps the record queued; nothing lost.
                            warn!("record append failed (queued for retry): {err:#}");
                            self.metrics.inc(&self.metrics.sink_failures);
                        }
                    }
                    None => {
                        self.metrics.inc(&self.metrics.discarded_blips);
                    }
                }
            }
        }
        self.detector.on_transition(&event);
        self.bus.publish(MonitorEvent::Transition(event));
    }

    fn write_snapshot(&mut self, snapshot: &StateSnapshot) {
        match self.sink.snapshot(snapshot) {
            Ok(()) => {
                self.metrics.inc(&self.metrics.snapshots);
                self.bus.publish(MonitorEvent::SnapshotWritten {
                    region_count: snapshot.regions.len(),
                });
            }
            Err(err) => {
                warn!("snapshot write failed: {err:#}");
                self.metrics.inc(&self.metrics.sink_failures);
            }
        }
    }

    /// Calendar-day rollover: once the first frame of a new day arrives,
    /// finalize the previous day's report.
    fn roll_report(&mut self, today: NaiveDate) {
        if today <= self.last_report_date {
            return;
        }
        match self.reporter.generate(self.last_report_date) {
            Ok(path) => self.bus.publish(MonitorEvent::ReportWritten {
                date: self.last_report_date,
                path,
            }),
            Err(ReportError::NoData(date)) => debug!("no records for {}, skipping report", date),
            Err(err) => warn!("daily report failed: {err}"),
        }
        self.last_report_date = today;
    }
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::Transition(TransitionEvent::Entered {
            region_name,
            person_id,
            at,
            ..
        }) => info!("[{}] {} taken by {}", at.format("%H:%M:%S"), region_name, person_id),
        MonitorEvent::Transition(TransitionEvent::Left {
            region_name,
            at,
            record: Some(record),
            ..
        }) => info!(
            "[{}] {} vacated after {:.1} min",
            at.format("%H:%M:%S"),
            region_name,
            record.duration_seconds / 60.0
        ),
        MonitorEvent::Transition(TransitionEvent::Left {
            region_name,
            record: None,
            ..
        }) => debug!("{} blip discarded", region_name),
        MonitorEvent::SnapshotWritten { region_count } => {
            debug!("state snapshot written ({} regions)", region_count)
        }
        MonitorEvent::ReportWritten { date, path } => {
            info!("daily report for {} written to {}", date, path.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::persist::{FileSink, MemorySink};
    use crate::source::ScriptedFrameSource;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
    use std::collections::VecDeque;
    use tempfile::tempdir;

    /// Detector that replays a fixed per-frame, per-region script.
    struct ScriptedDetector {
        rows: VecDeque<Vec<bool>>,
        current: Vec<bool>,
        region_cursor: usize,
        transitions_seen: usize,
    }

    impl ScriptedDetector {
        fn new(rows: Vec<Vec<bool>>) -> Self {
            Self {
                rows: rows.into(),
                current: Vec::new(),
                region_cursor: 0,
                transitions_seen: 0,
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn begin_frame(&mut self, _frame: &Frame) {
            self.current = self.rows.pop_front().unwrap_or_default();
            self.region_cursor = 0;
        }

        fn detect(&mut self, _frame: &Frame, _region: &Region) -> Detection {
            let present = self.current.get(self.region_cursor).copied().unwrap_or(false);
            self.region_cursor += 1;
            Detection {
                present,
                person_hint: None,
            }
        }

        fn on_transition(&mut self, _event: &TransitionEvent) {
            self.transitions_seen += 1;
        }
    }

    /// Shared handle onto a MemorySink so tests can inspect it after the
    /// monitor takes ownership of the boxed sink.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<MemorySink>>);

    impl PersistenceSink for SharedSink {
        fn append(&mut self, record: &crate::types::OccupancyRecord) -> Result<()> {
            self.0.lock().unwrap().append(record)
        }
        fn snapshot(&mut self, snapshot: &StateSnapshot) -> Result<()> {
            self.0.lock().unwrap().snapshot(snapshot)
        }
    }

    fn base_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
    }

    fn frame_at(at: DateTime<Local>) -> Frame {
        Frame {
            data: vec![0; 16],
            width: 4,
            height: 4,
            captured_at: at,
        }
    }

    fn frames(count: usize, start: DateTime<Local>) -> Vec<Frame> {
        (0..count)
            .map(|i| frame_at(start + ChronoDuration::seconds(i as i64)))
            .collect()
    }

    fn test_config(enter: u32, exit: u32) -> Config {
        let mut config = Config::default();
        config.tracking.enter_threshold = enter;
        config.tracking.exit_threshold = exit;
        config.tracking.min_valid_duration_secs = 0.0;
        config.detection.detection_interval_secs = 0.001;
        config.seats.push(crate::config::SeatConfig {
            id: 1,
            name: "Seat 1".to_string(),
            region: vec![(0, 0), (3, 0), (3, 3), (0, 3)],
        });
        config
    }

    #[test]
    fn a_full_sit_down_and_leave_produces_one_record() {
        let config = test_config(2, 2);
        let detector = ScriptedDetector::new(vec![
            vec![true],
            vec![true], // entry confirmed here
            vec![false],
            vec![false], // exit confirmed here
        ]);
        let sink = SharedSink::default();
        let source = ScriptedFrameSource::new(vec![]);
        let mut monitor = Monitor::new(&config, source, detector, Box::new(sink.clone()));

        for frame in frames(4, base_time()) {
            monitor.process_frame(frame).unwrap();
        }

        let records = sink.0.lock().unwrap().records.clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].seat_id, 1);
        assert_eq!(records[0].duration_seconds, 2.0);

        let events = monitor.drain_events();
        let transitions = events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::Transition(_)))
            .count();
        assert_eq!(transitions, 2);

        let summary = monitor.metrics().summary();
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.exits, 1);
    }

    #[test]
    fn run_flushes_an_in_progress_interval_at_shutdown() {
        let config = test_config(2, 5);
        // Entry confirmed, never enough negatives to exit.
        let detector = ScriptedDetector::new(vec![vec![true], vec![true], vec![true]]);
        let sink = SharedSink::default();
        let stop = Arc::new(AtomicBool::new(false));
        let source =
            ScriptedFrameSource::new(frames(3, base_time())).stop_when_empty(stop.clone());

        let mut monitor = Monitor::new(&config, source, detector, Box::new(sink.clone()));
        // Wire the scripted source's stop flag to the monitor's.
        let _ = std::mem::replace(&mut monitor.stop, stop);

        monitor.run().unwrap();

        let inner = sink.0.lock().unwrap();
        assert_eq!(inner.records.len(), 1, "force-closed interval is recorded");
        assert!(
            !inner.snapshots.is_empty(),
            "final snapshot flushed at shutdown"
        );
        assert!(!inner.snapshots.last().unwrap().regions[0].occupied);
    }

    #[test]
    fn day_rollover_writes_the_previous_days_report() {
        let dir = tempdir().unwrap();
        let mut config = test_config(1, 1);
        config.data.data_dir = dir.path().join("data").display().to_string();
        config.data.reports_dir = dir.path().join("reports").display().to_string();

        let detector = ScriptedDetector::new(vec![vec![true], vec![false], vec![false]]);
        let sink = FileSink::new(&config.data.data_dir).unwrap();
        let source = ScriptedFrameSource::new(vec![]);
        let mut monitor = Monitor::new(&config, source, detector, Box::new(sink));

        // Rollover compares against the construction date, so script the
        // interval for "today" and the rollover frame for tomorrow.
        let today = Local::now().date_naive();
        let start = today
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap();
        monitor.process_frame(frame_at(start)).unwrap();
        monitor
            .process_frame(frame_at(start + ChronoDuration::seconds(60)))
            .unwrap();
        monitor
            .process_frame(frame_at(start + ChronoDuration::days(1)))
            .unwrap();

        let report = std::path::Path::new(&config.data.reports_dir).join(format!(
            "daily_report_{}.txt",
            today.format("%Y%m%d")
        ));
        assert!(report.exists(), "rollover should write {}", report.display());

        let events = monitor.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, MonitorEvent::ReportWritten { date, .. } if *date == today)));
    }

    #[test]
    fn detector_hook_sees_every_transition() {
        let config = test_config(1, 1);
        let detector = ScriptedDetector::new(vec![vec![true], vec![false]]);
        let sink = SharedSink::default();
        let source = ScriptedFrameSource::new(vec![]);
        let mut monitor = Monitor::new(&config, source, detector, Box::new(sink));

        for frame in frames(2, base_time()) {
            monitor.process_frame(frame).unwrap();
        }
        assert_eq!(monitor.detector.transitions_seen, 2);
    }

    #[test]
    fn latest_frame_cell_tracks_the_newest_frame() {
        let config = test_config(1, 1);
        let detector = ScriptedDetector::new(vec![vec![false], vec![false]]);
        let sink = SharedSink::default();
        let source = ScriptedFrameSource::new(vec![]);
        let mut monitor = Monitor::new(&config, source, detector, Box::new(sink));

        let cell = monitor.latest_frame();
        assert!(cell.lock().unwrap().is_none());

        let second = base_time() + ChronoDuration::seconds(1);
        monitor.process_frame(frame_at(base_time())).unwrap();
        monitor.process_frame(frame_at(second)).unwrap();

        let held = cell.lock().unwrap();
        assert_eq!(held.as_ref().unwrap().captured_at, second);
    }
}
