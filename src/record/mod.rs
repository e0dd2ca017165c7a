//! Record data model
//!
//! This module defines the values that flow through a harvest:
//! - `RecordSummary`: one listing row, keyed by its record identifier
//! - `RecordDetail`: the optional fields of a detail page
//! - `MergedRecord`: both halves combined under the merge policy
//! - `Field`: the closed set of columns a record can carry

mod detail;
mod field;
mod merge;
mod summary;

pub use detail::{FeeStatus, PetitionEvent, PublicationEvent, RecordDetail};
pub use field::{Field, FieldOrigin};
pub use merge::MergedRecord;
pub use summary::RecordSummary;
