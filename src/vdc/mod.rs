//! The `VirtualDC` reconciler: runner pod template, service, and the
//! reconcile loop itself.

pub mod controller;
pub mod service;
pub mod template;

pub use controller::{error_policy, owner_object_ref, reconcile_vdc};
