//! Reconciliation engine and in-VDC job runner for ephemeral `VirtualDC`
//! test environments: the AVDC scheduler, the VDC reconciler,
//! the `JobProcessManager`/`JobWatchProcess` pair, the in-VDC runner, and
//! the validating admission hooks.

pub mod admission;
pub mod avdc;
pub mod config;
pub mod context;
pub mod crds;
pub mod domain;
pub mod error;
pub mod leader;
pub mod runner;
pub mod vdc;
pub mod watch;

pub use context::Context;
pub use error::{Error, Result};
