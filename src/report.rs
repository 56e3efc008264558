// src/report.rs
//
// Daily aggregation of occupancy records. `summarize_records` is a pure
// function of one day's record set; `Reporter` wraps it with the CSV
// read-back and the text report file the original tool produced.

use crate::error::ReportError;
use crate::persist;
use crate::types::OccupancyRecord;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_records: usize,
    pub distinct_persons: usize,
    pub total_duration_seconds: f64,
    /// Keyed by seat name; BTreeMap keeps the report ordering stable.
    pub per_seat: BTreeMap<String, SeatSummary>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeatSummary {
    pub count: usize,
    pub total_duration_seconds: f64,
    pub distinct_persons: usize,
}

/// Aggregate one calendar day's records. Fails with `NoData` when the set
/// is empty; anonymous records (no person id) don't count as distinct
/// persons, matching the original's non-null unique count.
pub fn summarize_records(
    date: NaiveDate,
    records: &[OccupancyRecord],
) -> Result<DailySummary, ReportError> {
    if records.is_empty() {
        return Err(ReportError::NoData(date));
    }

    let mut persons: HashSet<&str> = HashSet::new();
    let mut per_seat: BTreeMap<String, (SeatSummary, HashSet<&str>)> = BTreeMap::new();
    let mut total_duration_seconds = 0.0;

    for record in records {
        total_duration_seconds += record.duration_seconds;
        let (seat, seat_persons) = per_seat.entry(record.seat_name.clone()).or_default();
        seat.count += 1;
        seat.total_duration_seconds += record.duration_seconds;
        if let Some(person) = record.person_id.as_deref() {
            persons.insert(person);
            seat_persons.insert(person);
        }
    }

    let per_seat = per_seat
        .into_iter()
        .map(|(name, (mut seat, seat_persons))| {
            seat.distinct_persons = seat_persons.len();
            (name, seat)
        })
        .collect();

    Ok(DailySummary {
        date,
        total_records: records.len(),
        distinct_persons: persons.len(),
        total_duration_seconds,
        per_seat,
    })
}

pub struct Reporter {
    data_dir: PathBuf,
    reports_dir: PathBuf,
}

impl Reporter {
    pub fn new(data_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    /// Load and aggregate one day's persisted records. A missing day file
    /// is `NoData`, same as an empty one.
    pub fn summarize(&self, date: NaiveDate) -> Result<DailySummary, ReportError> {
        let records = match persist::read_records(&self.data_dir, date) {
            Ok(records) => records,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(ReportError::Io(err)),
        };
        summarize_records(date, &records)
    }

    /// Write the day's text report and return its path.
    pub fn generate(&self, date: NaiveDate) -> Result<PathBuf, ReportError> {
        let summary = self.summarize(date)?;
        let path = self
            .reports_dir
            .join(format!("daily_report_{}.txt", date.format("%Y%m%d")));
        write_report(&path, &summary).map_err(|err| {
            ReportError::Io(std::io::Error::other(format!("{:#}", err)))
        })?;
        info!("daily report for {} written to {}", date, path.display());
        Ok(path)
    }
}

fn write_report(path: &Path, summary: &DailySummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating reports directory {}", parent.display()))?;
    }
    fs::write(path, render_report(summary))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn render_report(summary: &DailySummary) -> String {
    let mut out = String::new();
    out.push_str("===== Seat Occupancy Daily Report =====\n");
    out.push_str(&format!("Date: {}\n", summary.date));
    out.push_str(&format!("Total records: {}\n", summary.total_records));
    out.push_str(&format!("Distinct persons: {}\n", summary.distinct_persons));
    out.push_str(&format!(
        "Total occupied time: {:.2} hours\n\n",
        summary.total_duration_seconds / 3600.0
    ));
    out.push_str("Per-seat breakdown:\n");
    for (name, seat) in &summary.per_seat {
        out.push_str(&format!(
            "  {}: {} interval(s), {} person(s), {:.2} hours\n",
            name,
            seat.count,
            seat.distinct_persons,
            seat.total_duration_seconds / 3600.0
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{FileSink, PersistenceSink};
    use chrono::{Duration, Local, TimeZone};
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn record(seat: &str, duration: f64, person: Option<&str>) -> OccupancyRecord {
        let entry = Local.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        OccupancyRecord {
            seat_id: 1,
            seat_name: seat.to_string(),
            entry_time: entry,
            exit_time: entry + Duration::milliseconds((duration * 1000.0) as i64),
            duration_seconds: duration,
            person_id: person.map(str::to_string),
        }
    }

    #[test]
    fn summarize_totals_and_per_seat_breakdown() {
        // Three intervals on seat A (60 + 120 + 30) and one on B (90).
        let records = vec![
            record("A", 60.0, Some("p1")),
            record("A", 120.0, Some("p2")),
            record("A", 30.0, Some("p1")),
            record("B", 90.0, Some("p3")),
        ];
        let summary = summarize_records(day(), &records).unwrap();

        assert_eq!(summary.total_records, 4);
        assert_eq!(summary.total_duration_seconds, 300.0);
        assert_eq!(summary.distinct_persons, 3);

        let a = &summary.per_seat["A"];
        assert_eq!(a.count, 3);
        assert_eq!(a.total_duration_seconds, 210.0);
        assert_eq!(a.distinct_persons, 2);

        let b = &summary.per_seat["B"];
        assert_eq!(b.count, 1);
        assert_eq!(b.total_duration_seconds, 90.0);
        assert_eq!(b.distinct_persons, 1);
    }

    #[test]
    fn anonymous_records_do_not_count_as_persons() {
        let records = vec![record("A", 10.0, None), record("A", 20.0, None)];
        let summary = summarize_records(day(), &records).unwrap();
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.distinct_persons, 0);
    }

    #[test]
    fn empty_day_is_no_data() {
        let err = summarize_records(day(), &[]).unwrap_err();
        assert!(matches!(err, ReportError::NoData(d) if d == day()));
    }

    #[test]
    fn missing_day_file_is_no_data() {
        let dir = tempdir().unwrap();
        let reporter = Reporter::new(dir.path().join("data"), dir.path().join("reports"));
        let err = reporter.summarize(day()).unwrap_err();
        assert!(matches!(err, ReportError::NoData(_)));
    }

    #[test]
    fn generate_reads_back_what_the_sink_wrote() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let reports_dir = dir.path().join("reports");

        let mut sink = FileSink::new(&data_dir).unwrap();
        sink.append(&record("Seat 1", 3600.0, Some("alice"))).unwrap();
        sink.append(&record("Seat 1", 1800.0, None)).unwrap();

        let reporter = Reporter::new(&data_dir, &reports_dir);
        let path = reporter.generate(day()).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Total records: 2"));
        assert!(text.contains("Distinct persons: 1"));
        assert!(text.contains("Total occupied time: 1.50 hours"));
        assert!(text.contains("Seat 1: 2 interval(s)"));
    }
}
