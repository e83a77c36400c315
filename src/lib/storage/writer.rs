use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
    time::Duration,
};

use chrono::{DateTime, Local};
use tracing::*;

use super::segment::{encode_row, list_segments, SegmentId, HEADER};
use crate::metrics::Sample;

pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_SEGMENT_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Failed to prepare log directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open segment {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to segment {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Durable log unavailable: {0}")]
    Unavailable(String),
}

/// Destination for every recorded sample.
pub trait SampleLog: Send + 'static {
    /// Persists one sample. When this returns `Ok`, the record survives a
    /// crash of the process.
    fn append(&mut self, sample: &Sample) -> Result<(), WriteError>;

    fn active_segment(&self) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SegmentLogConfig {
    pub directory: PathBuf,
    pub max_segment_bytes: u64,
    pub max_segment_age: Duration,
    /// Closed segments beyond this count are deleted, oldest first.
    pub max_segments: Option<usize>,
}

impl SegmentLogConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            max_segment_age: DEFAULT_MAX_SEGMENT_AGE,
            max_segments: None,
        }
    }
}

#[derive(Debug)]
struct ActiveSegment {
    id: SegmentId,
    path: PathBuf,
    file: File,
    size: u64,
    records: u64,
    // A failed write may have left half a row behind
    torn: bool,
}

/// Append-only, size and age rotated CSV log of samples.
#[derive(Debug)]
pub struct SegmentLogWriter {
    config: SegmentLogConfig,
    active: Option<ActiveSegment>,
    next_sequence: u64,
}

impl SegmentLogWriter {
    /// Opens the log stored in `config.directory`, resuming the newest
    /// segment if there is one. Existing data is never truncated.
    #[instrument(level = "debug")]
    pub fn open(config: SegmentLogConfig) -> Result<Self, WriteError> {
        let directory_error = |source| WriteError::Directory {
            path: config.directory.clone(),
            source,
        };

        std::fs::create_dir_all(&config.directory).map_err(directory_error)?;
        let segments = list_segments(&config.directory).map_err(directory_error)?;

        let mut writer = Self {
            next_sequence: segments.last().map(|(id, _)| id.sequence + 1).unwrap_or(1),
            config,
            active: None,
        };

        match segments.into_iter().last() {
            Some((id, path)) => {
                info!("Resuming sample log segment {path:?}");
                writer.active = Some(resume_segment(id, path)?);
            }
            None => writer.rotate()?,
        }

        Ok(writer)
    }

    /// Number of rows written to the active segment by this writer.
    pub fn active_records(&self) -> u64 {
        self.active
            .as_ref()
            .map(|active| active.records)
            .unwrap_or_default()
    }

    fn is_due_for_rotation(&self, active: &ActiveSegment) -> bool {
        if active.size >= self.config.max_segment_bytes {
            return true;
        }

        segment_age(active.id.created_local()) >= self.config.max_segment_age
    }

    #[instrument(level = "debug", skip(self))]
    fn rotate(&mut self) -> Result<(), WriteError> {
        if let Some(previous) = self.active.take() {
            debug!(
                "Closing segment {:?} with {} records",
                previous.path, previous.records
            );
        }

        // Consumed even if creation fails, a leftover file must not share it
        let id = SegmentId::new(self.next_sequence, Local::now());
        self.next_sequence += 1;

        let path = self.config.directory.join(id.file_name());
        let active = create_segment(id, path)?;
        info!("Started sample log segment {:?}", active.path);

        self.active = Some(active);
        self.prune();

        Ok(())
    }

    fn prune(&self) {
        let Some(max_segments) = self.config.max_segments else {
            return;
        };

        let segments = match list_segments(&self.config.directory) {
            Ok(segments) => segments,
            Err(error) => {
                warn!("Failed to list segments for pruning: {error}");
                return;
            }
        };

        let active_path = self.active.as_ref().map(|active| &active.path);
        let closed: Vec<PathBuf> = segments
            .into_iter()
            .map(|(_, path)| path)
            .filter(|path| Some(path) != active_path)
            .collect();

        let excess = closed.len().saturating_sub(max_segments);
        for path in closed.into_iter().take(excess) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Pruned segment {path:?}"),
                Err(error) => warn!("Failed to prune segment {path:?}: {error}"),
            }
        }
    }
}

impl SampleLog for SegmentLogWriter {
    fn append(&mut self, sample: &Sample) -> Result<(), WriteError> {
        let rotate = match &self.active {
            Some(active) => self.is_due_for_rotation(active),
            None => true,
        };
        if rotate {
            self.rotate()?;
        }

        let Some(active) = self.active.as_mut() else {
            return Err(WriteError::Unavailable("No active segment".to_string()));
        };

        let mut row = encode_row(sample);
        if active.torn {
            row.insert(0, '\n');
        }

        if let Err(source) = write_durably(&mut active.file, row.as_bytes()) {
            active.torn = true;
            return Err(WriteError::Write {
                path: active.path.clone(),
                source,
            });
        }

        active.torn = false;
        active.size += row.len() as u64;
        active.records += 1;

        Ok(())
    }

    fn active_segment(&self) -> Option<PathBuf> {
        self.active.as_ref().map(|active| active.path.clone())
    }
}

/// Stands in for the durable log when it could not be opened: every append
/// fails, so the failure keeps being counted while sampling goes on.
#[derive(Debug)]
pub struct UnavailableLog {
    reason: String,
}

impl UnavailableLog {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl SampleLog for UnavailableLog {
    fn append(&mut self, _sample: &Sample) -> Result<(), WriteError> {
        Err(WriteError::Unavailable(self.reason.clone()))
    }
}

fn write_durably(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_data()
}

fn create_segment(id: SegmentId, path: PathBuf) -> Result<ActiveSegment, WriteError> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(&path)
        .map_err(|source| WriteError::Open {
            path: path.clone(),
            source,
        })?;

    let header = format!("{HEADER}\n");
    if let Err(source) = write_durably(&mut file, header.as_bytes()) {
        drop(file);
        if let Err(error) = std::fs::remove_file(&path) {
            warn!("Failed to remove incomplete segment {path:?}: {error}");
        }
        return Err(WriteError::Write { path, source });
    }

    Ok(ActiveSegment {
        id,
        path,
        file,
        size: header.len() as u64,
        records: 0,
        torn: false,
    })
}

fn resume_segment(id: SegmentId, path: PathBuf) -> Result<ActiveSegment, WriteError> {
    let open_error = |source| WriteError::Open {
        path: path.clone(),
        source,
    };

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .open(&path)
        .map_err(open_error)?;
    let size = file.metadata().map_err(open_error)?.len();

    let mut active = ActiveSegment {
        id,
        path: path.clone(),
        file,
        size,
        records: 0,
        torn: false,
    };

    if size == 0 {
        let header = format!("{HEADER}\n");
        write_durably(&mut active.file, header.as_bytes()).map_err(|source| {
            WriteError::Write {
                path: path.clone(),
                source,
            }
        })?;
        active.size = header.len() as u64;
    } else if !ends_with_newline(&mut active.file).map_err(open_error)? {
        warn!("Segment {path:?} ends with a partial row, it will be left behind");
        active.torn = true;
    }

    Ok(active)
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn segment_age(created: DateTime<Local>) -> Duration {
    Local::now()
        .signed_duration_since(created)
        .to_std()
        .unwrap_or_default()
}
