use crate::record::Field;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One entry of the publications ("despachos") table on a detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationEvent {
    /// Bulletin (RPI) number
    #[serde(rename = "rpi")]
    pub bulletin: String,

    pub date: String,

    /// Dispatch code
    pub code: String,

    /// Whether the row links a PDF attachment
    #[serde(rename = "has_pdf")]
    pub has_attachment: bool,

    #[serde(rename = "complement")]
    pub remark: String,
}

/// One entry of the petitions table on a detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetitionEvent {
    /// Section heading the petition was listed under
    pub section: String,
    pub service_code: String,
    pub has_payment: bool,
    pub protocol: String,
    pub date: String,
    pub client: String,
}

/// Payment status of one fee period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStatus {
    #[serde(rename = "Paga")]
    Paid,

    #[serde(rename = "Não Paga")]
    Unpaid,
}

/// Fields extracted from a detail page
///
/// Every field is optional: `None` or an empty collection means the page did not
/// carry that section, never that extraction failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDetail {
    pub full_number: Option<String>,
    pub filing_date: Option<String>,
    pub publication_date: Option<String>,
    pub grant_date: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub classification_codes: Vec<String>,
    pub applicants: Vec<String>,
    pub applicants_raw: Option<String>,
    pub inventors: Vec<String>,
    pub inventors_raw: Option<String>,
    pub agent: Option<String>,
    pub publications: Vec<PublicationEvent>,
    pub petitions: Vec<PetitionEvent>,

    /// Fee period key (e.g. `anuidade_3`) to payment status, in page order
    pub fees: IndexMap<String, FeeStatus>,

    /// "Data updated until" date printed at the bottom of the page
    pub last_updated: Option<String>,
}

impl RecordDetail {
    /// Returns true if the page yielded no field at all
    pub fn is_empty(&self) -> bool {
        self.cells().is_empty()
    }

    /// Renders every present field as a table cell
    ///
    /// Lists and event tables are stored as JSON text in a single cell.
    pub fn cells(&self) -> Vec<(Field, String)> {
        let mut cells = Vec::new();

        let scalars = [
            (Field::FullNumber, &self.full_number),
            (Field::DetailFilingDate, &self.filing_date),
            (Field::PublicationDate, &self.publication_date),
            (Field::GrantDate, &self.grant_date),
            (Field::Title, &self.title),
            (Field::Abstract, &self.abstract_text),
            (Field::ApplicantsRaw, &self.applicants_raw),
            (Field::InventorsRaw, &self.inventors_raw),
            (Field::Agent, &self.agent),
            (Field::LastUpdated, &self.last_updated),
        ];
        for (field, value) in scalars {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                cells.push((field, value.to_string()));
            }
        }

        push_json(&mut cells, Field::ClassificationCodes, &self.classification_codes);
        push_json(&mut cells, Field::Applicants, &self.applicants);
        push_json(&mut cells, Field::Inventors, &self.inventors);
        push_json(&mut cells, Field::Publications, &self.publications);
        push_json(&mut cells, Field::Petitions, &self.petitions);
        if !self.fees.is_empty() {
            if let Ok(json) = serde_json::to_string(&self.fees) {
                cells.push((Field::FeeStatuses, json));
            }
        }

        cells.sort_by_key(|(field, _)| *field);
        cells
    }
}

fn push_json<T: Serialize>(cells: &mut Vec<(Field, String)>, field: Field, items: &[T]) {
    if items.is_empty() {
        return;
    }
    if let Ok(json) = serde_json::to_string(items) {
        cells.push((field, json));
    }
}
