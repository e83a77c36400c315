use chrono::{DateTime, Local};
use ringbuffer::{AllocRingBuffer, RingBuffer};

use crate::metrics::Sample;

/// Matches the number of points the dashboard chart keeps on screen.
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded in-memory history of the most recent samples.
///
/// Samples are kept in arrival order, which is also chronological order;
/// once full, every append evicts the oldest sample.
#[derive(Debug)]
pub struct RetentionRing {
    samples: AllocRingBuffer<Sample>,
}

impl RetentionRing {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: AllocRingBuffer::new(capacity.max(1)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn append(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    /// Copy of every retained sample, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.to_vec()
    }

    /// The newest `limit` samples, oldest first.
    pub fn snapshot_last(&self, limit: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(limit);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Samples taken strictly after `since`, oldest first.
    pub fn snapshot_since(&self, since: DateTime<Local>) -> Vec<Sample> {
        self.samples
            .iter()
            .skip_while(|sample| sample.timestamp() <= since)
            .copied()
            .collect()
    }

    /// Samples taken at or after `start`, oldest first.
    pub fn snapshot_from(&self, start: DateTime<Local>) -> Vec<Sample> {
        self.samples
            .iter()
            .skip_while(|sample| sample.timestamp() < start)
            .copied()
            .collect()
    }
}
