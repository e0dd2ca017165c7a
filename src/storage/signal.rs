use crate::record::{Field, MergedRecord};

/// The "has details" predicate
///
/// A record counts as enriched when one designated column, which only the
/// detail phase ever fills, is non-empty. This is a proxy, not a completeness
/// flag: a record whose detail page never carries that field is refetched on
/// every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentSignal {
    column: String,
}

impl EnrichmentSignal {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Applies the predicate to a cell read from the table
    pub fn is_enriched_cell(&self, value: Option<&str>) -> bool {
        value.is_some_and(|v| !v.trim().is_empty())
    }

    /// Applies the predicate to a record before it is written
    pub fn is_enriched(&self, record: &MergedRecord) -> bool {
        let value = Field::from_column(&self.column).and_then(|field| record.get(field));
        self.is_enriched_cell(value)
    }
}

impl Default for EnrichmentSignal {
    fn default() -> Self {
        Self::new(Field::Agent.column())
    }
}
