//! Page extraction for listing and detail pages
//!
//! Extraction is a pure function of the page content:
//! - listing pages yield zero or more `RecordSummary` rows plus the pagination total
//! - detail pages yield a `RecordDetail`
//!
//! An empty result is a valid answer (no matching rows, no populated sections).
//! Every text value passes through `normalize_text` before it reaches the
//! record model, and absent source text yields an absent field.

mod detail;
mod listing;

pub use detail::extract_detail;
pub use listing::{extract_listing, parse_total_pages, ListingPage};

use scraper::{ElementRef, Selector};

/// Collapses runs of whitespace to single spaces and trims the ends
///
/// Returns None when nothing but whitespace remains.
pub fn normalize_text(text: &str) -> Option<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Full text content of an element, including descendants
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Text nodes that are direct children of an element
pub(crate) fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|child| child.value().as_text().map(|t| String::from(&**t)))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

pub(crate) fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    let found = scope.select(&selector).next();
    found
}

pub(crate) fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Normalized text of the first match, if any
pub(crate) fn select_text(scope: ElementRef<'_>, css: &str) -> Option<String> {
    select_first(scope, css).and_then(|e| normalize_text(&element_text(e)))
}
