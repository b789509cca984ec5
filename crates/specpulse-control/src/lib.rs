pub mod client;
pub mod supervisor;

pub use client::ReportClient;
pub use supervisor::{start_monitor, stop_monitor, with_monitor, MonitorHandle, SupervisorError};
