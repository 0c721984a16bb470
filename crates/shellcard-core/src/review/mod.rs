//! Review session coordination.
//!
//! Builds the due-card queue, drives the per-card loop (present -> execute ->
//! rate -> schedule -> persist), and produces session statistics.

mod service;
mod session;

pub use service::ReviewService;
pub use session::{ReviewCard, SandboxDefaults, Session, SessionOptions, SessionStats};
