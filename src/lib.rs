//! UserIP Server - per-user client IP tracking with crash-safe persistence.
//!
//! The core (tracking store, snapshot codec, persistence, lifecycle) lives
//! in `userip-service`; the HTTP transport in `userip-http`. This crate
//! adds CLI configuration and the process entry point.

pub mod config;

pub use userip_http::{AppState, router, router_with_protected};
pub use userip_service::{ServiceConfig, ServiceState};
