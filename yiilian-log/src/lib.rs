pub mod commit_log;
pub mod config;
pub mod record;
pub mod segment;
pub mod stream;

pub use commit_log::{CommitLog, Log, LogReader};
pub use config::{Config, ConfigBuilder};
pub use record::{BinaryCodec, BincodeCodec, Record, RecordCodec};
