//! Merge policy: detail values fill empty cells and never overwrite existing ones

use crate::record::{Field, FieldOrigin, RecordDetail, RecordSummary};
use std::collections::BTreeMap;

/// Summary and detail data combined for one record identifier
///
/// Cells are only ever added, never replaced: once a field holds a non-empty
/// value, later merges leave it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedRecord {
    cells: BTreeMap<Field, String>,
}

impl MergedRecord {
    /// Starts a merged record from its listing row
    pub fn from_summary(summary: &RecordSummary) -> Self {
        let mut record = Self::default();
        for (field, value) in summary.cells() {
            record.merge_cell(field, value);
        }
        record
    }

    /// Builds a record from cells read back from the record table
    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (Field, String)>,
    {
        let mut record = Self::default();
        for (field, value) in cells {
            record.merge_cell(field, value);
        }
        record
    }

    pub fn record_id(&self) -> &str {
        self.get(Field::RecordId).unwrap_or_default()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.cells.get(&field).map(String::as_str)
    }

    /// Present cells in column order
    pub fn cells(&self) -> impl Iterator<Item = (Field, &str)> {
        self.cells.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Applies the merge rule to a single cell
    ///
    /// Returns true if the value was taken. Empty values are never taken and a
    /// present value is never overwritten.
    pub fn merge_cell(&mut self, field: Field, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.trim().is_empty() {
            return false;
        }
        match self.cells.get(&field) {
            Some(existing) if !existing.is_empty() => false,
            _ => {
                self.cells.insert(field, value);
                true
            }
        }
    }

    /// Merges detail page fields into this record
    ///
    /// Summary-provided fields stay authoritative; detail-only fields fill in.
    /// Returns the number of cells added.
    pub fn merge_detail(&mut self, detail: &RecordDetail) -> usize {
        let mut added = 0;
        for (field, value) in detail.cells() {
            if self.merge_cell(field, value) {
                added += 1;
            }
        }
        added
    }

    /// Returns true if any detail-only field is present
    pub fn has_detail_fields(&self) -> bool {
        self.cells
            .keys()
            .any(|field| field.origin() == FieldOrigin::Detail)
    }
}
