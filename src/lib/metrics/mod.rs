pub mod sample;
pub mod sampler;
pub mod source;

pub use sample::{Reading, Sample, TIMESTAMP_FORMAT};
pub use sampler::{SampleError, Sampler};
pub use source::{MetricsSource, SourceError, SysinfoSource};
