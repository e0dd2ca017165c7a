//! Session validity tracking
//!
//! The harvester never logs in by itself: it is handed an authenticated cookie
//! jar and only ever asks whether that session is still usable. The belief is
//! kept in memory and re-derived by probing; it is never persisted.

mod detector;
mod tracker;

pub use detector::LoginDetector;
pub use tracker::{ProbeResult, SessionStatus, SessionTracker};
