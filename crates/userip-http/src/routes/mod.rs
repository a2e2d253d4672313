//! HTTP API route handlers.

pub mod admin;
pub mod lookup;
pub mod system;
