//! HTTP middleware: user-IP tracking, known-IP gate, request ID tracking.

pub mod known_ip;
pub mod request_id;
pub mod track;
