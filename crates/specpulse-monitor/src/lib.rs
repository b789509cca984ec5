pub mod server;
pub mod ui;

pub use server::{EventServer, EventSink, ServerError};
