pub mod config;
pub mod protocol;
pub mod store;

pub use config::Config;
pub use protocol::{decode_line, Event, LogLevel, LogRecord, ResultUpdate, SpecStatus};
pub use store::{LogEntry, Store, SummaryStats, WorkerState};
