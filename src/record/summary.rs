use crate::record::Field;
use serde::{Deserialize, Serialize};

/// One row of a listing page
///
/// The serialized names match the crawl state file (`found_patents` entries),
/// so a state file written by an earlier run loads unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    /// Human-readable catalog number
    #[serde(rename = "patent_number")]
    pub display_number: String,

    /// Filing date as printed by the site (not parsed, formats vary)
    pub filing_date: String,

    /// Stable record identifier, the sole deduplication key
    #[serde(rename = "patent_id")]
    pub record_id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(rename = "ipc", default)]
    pub classification_code: Option<String>,

    /// Digits-only form of the display number
    #[serde(rename = "patent_number_raw", default)]
    pub raw_number: String,

    /// Opaque token the detail request must echo back
    #[serde(rename = "search_param", default)]
    pub detail_fetch_param: String,
}

impl RecordSummary {
    /// Strips everything but ASCII digits from a display number
    pub fn raw_number_of(display_number: &str) -> String {
        display_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect()
    }

    /// Non-empty cells contributed by the listing row
    pub fn cells(&self) -> Vec<(Field, String)> {
        let mut cells = vec![
            (Field::DisplayNumber, self.display_number.clone()),
            (Field::FilingDate, self.filing_date.clone()),
            (Field::RecordId, self.record_id.clone()),
        ];
        if let Some(title) = &self.title {
            cells.push((Field::Title, title.clone()));
        }
        if let Some(code) = &self.classification_code {
            cells.push((Field::ClassificationCode, code.clone()));
        }
        cells.push((Field::RawNumber, self.raw_number.clone()));
        cells.push((Field::DetailFetchParam, self.detail_fetch_param.clone()));

        cells.retain(|(_, value)| !value.is_empty());
        cells
    }
}
