//! The `AutoVirtualDC` reconciler: cron/duration parsing and the Case
//! A/B state machine.

pub mod controller;
pub mod schedule;

pub use controller::{error_policy, reconcile_avdc};
