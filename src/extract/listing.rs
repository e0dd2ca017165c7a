use crate::extract::{element_text, normalize_text, select_all, select_first, select_text};
use crate::record::RecordSummary;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;

/// Result of extracting one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Rows that carried a record identifier, in page order
    pub records: Vec<RecordSummary>,

    /// Result rows that could not be turned into a summary
    pub skipped_rows: usize,

    /// Total page count from the pagination text, if present
    pub total_pages: Option<u32>,
}

impl ListingPage {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn record_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"CodPedido=(\d+)").expect("valid record id pattern"))
}

fn search_param_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"SearchParameter=([^&]+)").expect("valid search parameter pattern"))
}

fn pagination_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Mostrando p[áa]gina\s+(\d+)\s+de\s+(\d+)").expect("valid pagination pattern")
    })
}

/// Extracts the result rows of a listing page
///
/// Rows live under `tbody#tituloContext`. A row without a record identifier in
/// its link is discarded and counted in `skipped_rows`.
///
/// # Example
///
/// ```
/// use catalog_harvest::extract::extract_listing;
///
/// let html = r#"<table><tbody id="tituloContext"><tr>
///     <td></td>
///     <td><a href="/x?Action=detail&CodPedido=42&SearchParameter=TOKEN">PI 0401234-5</a></td>
///     <td><font>10/03/2004</font></td>
/// </tr></tbody></table>"#;
/// let page = extract_listing(html);
/// assert_eq!(page.records[0].record_id, "42");
/// assert_eq!(page.records[0].detail_fetch_param, "TOKEN");
/// ```
pub fn extract_listing(html: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut page = ListingPage {
        total_pages: parse_total_pages_in(root),
        ..Default::default()
    };

    for row in select_all(root, "tbody#tituloContext tr") {
        match parse_row(row) {
            Some(summary) => page.records.push(summary),
            None => {
                tracing::debug!("Skipping listing row without record identifier");
                page.skipped_rows += 1;
            }
        }
    }

    page
}

/// Reads the total page count from the pagination text of a listing page
///
/// Returns None if the text is absent or unparseable; callers treat that as a
/// single-page result set.
pub fn parse_total_pages(html: &str) -> Option<u32> {
    let document = Html::parse_document(html);
    parse_total_pages_in(document.root_element())
}

fn parse_total_pages_in(root: ElementRef<'_>) -> Option<u32> {
    select_all(root, "font.normal").into_iter().find_map(|font| {
        let text = normalize_text(&element_text(font))?;
        let captures = pagination_pattern().captures(&text)?;
        captures.get(2)?.as_str().parse().ok()
    })
}

fn parse_row(row: ElementRef<'_>) -> Option<RecordSummary> {
    let link = select_first(row, "td:nth-of-type(2) a")?;
    let href = link.value().attr("href")?;

    let record_id = record_id_pattern()
        .captures(href)?
        .get(1)?
        .as_str()
        .to_string();
    if record_id.is_empty() {
        return None;
    }

    let display_number = normalize_text(&element_text(link)).unwrap_or_default();
    let filing_date = select_text(row, "td:nth-of-type(3) font")?;

    let detail_fetch_param = search_param_pattern()
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let title = select_text(row, "td:nth-of-type(4) font b");
    let classification_code =
        select_text(row, "td:nth-of-type(5) font").filter(|code| code != "-");

    Some(RecordSummary {
        raw_number: RecordSummary::raw_number_of(&display_number),
        display_number,
        filing_date,
        record_id,
        title,
        classification_code,
        detail_fetch_param,
    })
}
