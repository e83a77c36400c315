pub mod ring;

pub use ring::{RetentionRing, DEFAULT_CAPACITY};
