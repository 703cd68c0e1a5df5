//! The in-VDC job runner binary's library surface: job execution and its
//! `/status` HTTP server.

pub mod http;
pub mod job;

pub use http::run_status_server;
pub use job::{JobSpec, JobState, Runner};
