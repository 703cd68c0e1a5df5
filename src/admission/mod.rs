//! Validating admission webhooks for `VirtualDC`/`AutoVirtualDC`, fronted by an `axum` server mirroring
//! `bin/agent_controller.rs`'s router/layer stack.

pub mod avdc;
pub mod server;
pub mod types;
pub mod vdc;

pub use server::run_admission_server;
