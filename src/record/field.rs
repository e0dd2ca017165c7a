//! Column key set for harvested records
//!
//! Every value the harvester ever writes to the record table is addressed by one
//! of these keys. Keeping the set closed lets the merge policy and the table
//! writer enumerate all known columns instead of working with an open map.

/// Where a field is first populated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrigin {
    /// Populated from the listing row (authoritative)
    Summary,

    /// Only ever populated by the detail page
    Detail,
}

/// A known record column
///
/// Declaration order is the column order used when the table is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    // ===== Listing columns =====
    DisplayNumber,
    FilingDate,
    RecordId,
    Title,
    ClassificationCode,
    RawNumber,
    DetailFetchParam,

    // ===== Detail columns (always present in the header) =====
    FullNumber,
    DetailFilingDate,
    PublicationDate,
    GrantDate,
    Applicants,
    ApplicantsRaw,
    Agent,
    ClassificationCodes,
    Abstract,
    InventorsRaw,
    Inventors,

    // ===== Detail columns (added the first time a record carries them) =====
    Publications,
    Petitions,
    FeeStatuses,
    LastUpdated,
}

impl Field {
    /// All known fields in column order
    pub const ALL: [Field; 22] = [
        Field::DisplayNumber,
        Field::FilingDate,
        Field::RecordId,
        Field::Title,
        Field::ClassificationCode,
        Field::RawNumber,
        Field::DetailFetchParam,
        Field::FullNumber,
        Field::DetailFilingDate,
        Field::PublicationDate,
        Field::GrantDate,
        Field::Applicants,
        Field::ApplicantsRaw,
        Field::Agent,
        Field::ClassificationCodes,
        Field::Abstract,
        Field::InventorsRaw,
        Field::Inventors,
        Field::Publications,
        Field::Petitions,
        Field::FeeStatuses,
        Field::LastUpdated,
    ];

    /// Columns every record table carries, even when all cells are empty
    pub const REQUIRED: [Field; 18] = [
        Field::DisplayNumber,
        Field::FilingDate,
        Field::RecordId,
        Field::Title,
        Field::ClassificationCode,
        Field::RawNumber,
        Field::DetailFetchParam,
        Field::FullNumber,
        Field::DetailFilingDate,
        Field::PublicationDate,
        Field::GrantDate,
        Field::Applicants,
        Field::ApplicantsRaw,
        Field::Agent,
        Field::ClassificationCodes,
        Field::Abstract,
        Field::InventorsRaw,
        Field::Inventors,
    ];

    /// Column name used in the record table header
    pub fn column(&self) -> &'static str {
        match self {
            Self::DisplayNumber => "patent_number",
            Self::FilingDate => "filing_date",
            Self::RecordId => "patent_id",
            Self::Title => "title",
            Self::ClassificationCode => "ipc",
            Self::RawNumber => "patent_number_raw",
            Self::DetailFetchParam => "search_param",
            Self::FullNumber => "patent_number_full",
            Self::DetailFilingDate => "filing_date_detail",
            Self::PublicationDate => "publication_date",
            Self::GrantDate => "grant_date",
            Self::Applicants => "applicants",
            Self::ApplicantsRaw => "applicants_raw",
            Self::Agent => "patent_agent",
            Self::ClassificationCodes => "ipc_codes",
            Self::Abstract => "abstract",
            Self::InventorsRaw => "inventors_raw",
            Self::Inventors => "inventors",
            Self::Publications => "publications_json",
            Self::Petitions => "petitions_json",
            Self::FeeStatuses => "anuidades_json",
            Self::LastUpdated => "last_update_date",
        }
    }

    /// Looks up a field by its column name
    pub fn from_column(column: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.column() == column)
    }

    pub fn origin(&self) -> FieldOrigin {
        match self {
            Self::DisplayNumber
            | Self::FilingDate
            | Self::RecordId
            | Self::Title
            | Self::ClassificationCode
            | Self::RawNumber
            | Self::DetailFetchParam => FieldOrigin::Summary,
            _ => FieldOrigin::Detail,
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}
