//! On-disk layout of the durable sample log.
//!
//! The log is a directory of segment files. Each segment is a small CSV
//! table named `system_metrics-<sequence>-<creation time>.csv`:
//!
//! ```text
//! Timestamp,CPU%,MEMORY%,DISK%
//! 2024-05-01 12:00:00,12.5,40.25,73
//! ```

use std::{
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use tracing::*;

use crate::metrics::{Sample, TIMESTAMP_FORMAT};

pub const HEADER: &str = "Timestamp,CPU%,MEMORY%,DISK%";

const FILE_PREFIX: &str = "system_metrics-";
const FILE_EXTENSION: &str = "csv";
const CREATION_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Identity of one segment file: its position in the log and when it was
/// started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentId {
    pub sequence: u64,
    pub created: NaiveDateTime,
}

impl SegmentId {
    pub fn new(sequence: u64, created: DateTime<Local>) -> Self {
        Self {
            sequence,
            created: created.naive_local(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{FILE_PREFIX}{:06}-{}.{FILE_EXTENSION}",
            self.sequence,
            self.created.format(CREATION_FORMAT)
        )
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_EXTENSION)?
            .strip_suffix('.')?;
        let (sequence, created) = stem.split_once('-')?;

        Some(Self {
            sequence: sequence.parse().ok()?,
            created: NaiveDateTime::parse_from_str(created, CREATION_FORMAT).ok()?,
        })
    }

    /// Creation time in the local zone; ambiguous or skipped local times
    /// resolve to the earliest candidate, or now.
    pub fn created_local(&self) -> DateTime<Local> {
        Local
            .from_local_datetime(&self.created)
            .earliest()
            .unwrap_or_else(Local::now)
    }
}

/// A sample decoded back from a segment row. Timestamps keep the log's
/// one second resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
}

pub fn encode_row(sample: &Sample) -> String {
    format!(
        "{},{},{},{}\n",
        sample.formatted_time(),
        sample.cpu_pct(),
        sample.mem_pct(),
        sample.disk_pct()
    )
}

pub fn decode_row(line: &str) -> Option<LogRecord> {
    let mut fields = line.trim_end_matches(['\r', '\n']).split(',');

    let timestamp = NaiveDateTime::parse_from_str(fields.next()?, TIMESTAMP_FORMAT).ok()?;
    let cpu_pct = fields.next()?.trim().parse().ok()?;
    let mem_pct = fields.next()?.trim().parse().ok()?;
    let disk_pct = fields.next()?.trim().parse().ok()?;

    if fields.next().is_some() {
        return None;
    }

    Some(LogRecord {
        timestamp,
        cpu_pct,
        mem_pct,
        disk_pct,
    })
}

/// Every segment file inside `dir`, in sequence order.
pub fn list_segments(dir: &Path) -> std::io::Result<Vec<(SegmentId, PathBuf)>> {
    let mut segments = vec![];

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let Some(id) = file_name.to_str().and_then(SegmentId::parse) else {
            continue;
        };

        segments.push((id, entry.path()));
    }

    segments.sort_by_key(|(id, _)| (id.sequence, id.created));

    Ok(segments)
}

/// Decodes a whole segment. The header and any torn or malformed row are
/// skipped.
pub fn read_segment(path: &Path) -> std::io::Result<Vec<LogRecord>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut records = vec![];

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line == HEADER {
            continue;
        }

        match decode_row(&line) {
            Some(record) => records.push(record),
            None => warn!(
                "Skipping malformed row {} in {path:?}: {line:?}",
                index + 1
            ),
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Reading;

    #[test]
    fn file_name_round_trip() {
        let created = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 15).unwrap();
        let id = SegmentId::new(42, created);

        assert_eq!(id.file_name(), "system_metrics-000042-20240501T083015.csv");
        assert_eq!(SegmentId::parse(&id.file_name()), Some(id.clone()));
        assert_eq!(id.created_local(), created);
    }

    #[test]
    fn segments_sharing_a_sequence_are_ordered_by_creation() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "system_metrics-000002-20240501T090000.csv",
            "system_metrics-000001-20240501T100000.csv",
            "system_metrics-000001-20240501T080000.csv",
        ] {
            std::fs::write(dir.path().join(name), format!("{HEADER}\n")).unwrap();
        }

        let names: Vec<String> = list_segments(dir.path())
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.file_name())
            .collect();
        assert_eq!(
            names,
            [
                "system_metrics-000001-20240501T080000.csv",
                "system_metrics-000001-20240501T100000.csv",
                "system_metrics-000002-20240501T090000.csv",
            ]
        );
    }

    #[test]
    fn ignores_foreign_file_names() {
        for name in [
            "system_metrics.csv",
            "system_metrics-abc-20240501T083015.csv",
            "system_metrics-000001-20240501T083015.log",
            "system_metrics-000001.csv",
            "other-000001-20240501T083015.csv",
        ] {
            assert_eq!(SegmentId::parse(name), None, "{name}");
        }
    }

    #[test]
    fn row_keeps_column_order_and_precision() {
        let timestamp = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();
        let sample = Sample::try_new(
            timestamp,
            Reading {
                cpu_pct: 12.345678901234,
                mem_pct: 0.0,
                disk_pct: 100.0,
            },
        )
        .unwrap();

        let row = encode_row(&sample);
        assert_eq!(row, "2024-05-01 12:00:01,12.345678901234,0,100\n");

        let record = decode_row(&row).unwrap();
        assert_eq!(record.timestamp, timestamp.naive_local());
        assert_eq!(record.cpu_pct, 12.345678901234);
        assert_eq!(record.mem_pct, 0.0);
        assert_eq!(record.disk_pct, 100.0);
    }

    #[test]
    fn rejects_malformed_rows() {
        for row in [
            HEADER,
            "",
            "2024-05-01 12:00:01,1,2",
            "2024-05-01 12:00:01,1,2,3,4",
            "2024-05-01 12:00,1,2,3",
            "2024-05-01 12:00:01,one,2,3",
        ] {
            assert_eq!(decode_row(row), None, "{row:?}");
        }
    }

    #[test]
    fn lists_segments_in_sequence_order() {
        let dir = tempfile::tempdir().unwrap();
        let created = Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        for sequence in [10, 2, 7] {
            let id = SegmentId::new(sequence, created);
            std::fs::write(dir.path().join(id.file_name()), HEADER).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "not a segment").unwrap();

        let sequences: Vec<u64> = list_segments(dir.path())
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.sequence)
            .collect();
        assert_eq!(sequences, vec![2, 7, 10]);
    }

    #[test]
    fn reading_skips_torn_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment.csv");
        std::fs::write(
            &path,
            format!(
                "{HEADER}\n2024-05-01 12:00:01,1,2,3\n2024-05-01 12:0\n2024-05-01 12:00:03,4,5,6\n"
            ),
        )
        .unwrap();

        let records = read_segment(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cpu_pct, 1.0);
        assert_eq!(records[1].disk_pct, 6.0);
    }
}
