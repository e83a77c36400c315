pub mod segment;
pub mod writer;

pub use segment::{list_segments, read_segment, LogRecord, SegmentId};
pub use writer::{SampleLog, SegmentLogConfig, SegmentLogWriter, UnavailableLog, WriteError};
