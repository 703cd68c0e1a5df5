//! The runner-status watcher: one background poll loop per live
//! `VirtualDC`, started and stopped by the VDC reconciler.

pub mod manager;
pub mod process;

pub use manager::{JobProcessManager, RealJobProcessManager};
pub use process::{JobStatusEntry, JobWatchProcess};
