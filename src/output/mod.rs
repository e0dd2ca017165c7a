//! Output module for run reports and harvest statistics
//!
//! This module handles:
//! - The report filled during a run and printed after it
//! - Statistics read back from the state file and the record table

mod report;
pub mod stats;

pub use report::{print_report, HarvestOutcome, HarvestReport, RecordFailure, StopReason};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
