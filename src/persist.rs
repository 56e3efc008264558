// src/persist.rs
//
// Durable storage for finalized occupancy records and periodic state
// snapshots. One CSV row per record, grouped into per-day files, plus one
// JSON document per snapshot. Write failures never propagate into the
// tracking loop: records are queued and retried on the next append, in
// order, so a transient disk error costs latency rather than data.

use crate::types::{OccupancyRecord, StateSnapshot};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const RECORD_HEADER: &str =
    "seat_id,seat_name,entry_time,exit_time,duration_seconds,person_id";

const TIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub trait PersistenceSink {
    /// Persist one finalized record. Implementations must not lose the
    /// record on error: [`FileSink`] queues it internally and retries on
    /// the next call, so callers log the error and move on without
    /// re-appending.
    fn append(&mut self, record: &OccupancyRecord) -> Result<()>;

    /// Persist a point-in-time state snapshot.
    fn snapshot(&mut self, snapshot: &StateSnapshot) -> Result<()>;
}

/// CSV file path for one calendar day's records.
pub fn records_path(data_dir: &Path, date: NaiveDate) -> PathBuf {
    data_dir.join(format!("occupancy_records_{}.csv", date.format("%Y%m%d")))
}

pub struct FileSink {
    data_dir: PathBuf,
    pending: VecDeque<OccupancyRecord>,
}

impl FileSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        Ok(Self {
            data_dir,
            pending: VecDeque::new(),
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn write_record(&self, record: &OccupancyRecord) -> Result<()> {
        let path = records_path(&self.data_dir, record.exit_time.date_naive());
        let new_file = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        if new_file {
            writeln!(file, "{}", RECORD_HEADER)?;
        }
        writeln!(file, "{}", record_to_line(record))?;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        while let Some(record) = self.pending.front() {
            self.write_record(record)?;
            self.pending.pop_front();
        }
        Ok(())
    }
}

impl PersistenceSink for FileSink {
    fn append(&mut self, record: &OccupancyRecord) -> Result<()> {
        self.pending.push_back(record.clone());
        if self.pending.len() > 1 {
            debug!("retrying {} queued record(s)", self.pending.len() - 1);
        }
        self.flush_pending()
            .with_context(|| format!("{} record(s) queued for retry", self.pending.len()))
    }

    fn snapshot(&mut self, snapshot: &StateSnapshot) -> Result<()> {
        let path = self.data_dir.join(format!(
            "current_state_{}.json",
            snapshot.taken_at.format("%Y%m%d%H%M%S")
        ));
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        debug!("state snapshot written to {}", path.display());
        Ok(())
    }
}

/// In-memory sink for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<OccupancyRecord>,
    pub snapshots: Vec<StateSnapshot>,
}

impl PersistenceSink for MemorySink {
    fn append(&mut self, record: &OccupancyRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn snapshot(&mut self, snapshot: &StateSnapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

/// Read one day's records back from disk. Malformed rows are skipped with a
/// warning rather than failing the whole day.
pub fn read_records(data_dir: &Path, date: NaiveDate) -> std::io::Result<Vec<OccupancyRecord>> {
    let path = records_path(data_dir, date);
    let contents = fs::read_to_string(&path)?;
    let mut records = Vec::new();
    for line in contents.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match parse_record_line(line) {
            Some(record) => records.push(record),
            None => warn!("skipping malformed row in {}: {}", path.display(), line),
        }
    }
    info!("loaded {} record(s) from {}", records.len(), path.display());
    Ok(records)
}

fn record_to_line(record: &OccupancyRecord) -> String {
    format!(
        "{},{},{},{},{},{}",
        record.seat_id,
        csv_field(&record.seat_name),
        record.entry_time.format(TIME_FMT),
        record.exit_time.format(TIME_FMT),
        record.duration_seconds,
        csv_field(record.person_id.as_deref().unwrap_or("")),
    )
}

fn parse_record_line(line: &str) -> Option<OccupancyRecord> {
    let fields = split_csv_line(line);
    if fields.len() != 6 {
        return None;
    }
    let person_id = if fields[5].is_empty() {
        None
    } else {
        Some(fields[5].clone())
    };
    Some(OccupancyRecord {
        seat_id: fields[0].parse().ok()?,
        seat_name: fields[1].clone(),
        entry_time: parse_time(&fields[2])?,
        exit_time: parse_time(&fields[3])?,
        duration_seconds: fields[4].parse().ok()?,
        person_id,
    })
}

fn parse_time(s: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(s, TIME_FMT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

/// Quote a field only when it needs it (commas, quotes, newlines).
fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
