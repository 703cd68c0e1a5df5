//! Custom resource definitions for this operator.

pub mod autovirtualdc;
pub mod virtualdc;

pub use autovirtualdc::{AutoVirtualDC, AutoVirtualDcSpec, AutoVirtualDcStatus};
pub use virtualdc::{VirtualDC, VirtualDcSpec, VirtualDcStatus};
