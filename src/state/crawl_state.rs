//! Crawl state machine
//!
//! Tracks listing pagination for one (query, search column) pair and the
//! running index of every record observed across all queries. The transition
//! functions are pure: persisting the state is the caller's decision, guided by
//! `should_checkpoint`.

use crate::record::RecordSummary;
use crate::state::StateError;
use chrono::{Local, NaiveDateTime, SubsecRound};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where a run starts, decided from the loaded state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    /// No usable prior state for this query; pagination starts at page 1
    Fresh,

    /// Prior state matches; pagination continues at `next_page`
    Resuming { next_page: u32 },

    /// Prior state matches and every page has been processed
    Exhausted,
}

impl CrawlPhase {
    /// First listing page to fetch, if any
    pub fn next_page(&self) -> Option<u32> {
        match self {
            Self::Fresh => Some(1),
            Self::Resuming { next_page } => Some(*next_page),
            Self::Exhausted => None,
        }
    }
}

/// Persisted crawl progress
///
/// Serialized field names are those of the state file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlState {
    #[serde(rename = "last_query")]
    pub query: String,

    #[serde(rename = "last_search_column")]
    pub search_column: String,

    pub last_page_processed: u32,

    /// 0 while unknown
    pub total_pages: u32,

    pub has_more_pages: bool,

    /// Every record seen in any listing, keyed by record id
    #[serde(rename = "found_patents", default)]
    pub observed_records: IndexMap<String, RecordSummary>,

    #[serde(rename = "last_update_time", with = "timestamp")]
    pub updated_at: NaiveDateTime,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self {
            query: String::new(),
            search_column: String::new(),
            last_page_processed: 0,
            total_pages: 0,
            has_more_pages: true,
            observed_records: IndexMap::new(),
            updated_at: now(),
        }
    }
}

impl CrawlState {
    /// Decides where this run starts and resets pagination when needed
    ///
    /// A different (query, column) pair, or `continue_from_last == false`,
    /// discards pagination progress but keeps `observed_records`: record
    /// identity is global, not per query.
    pub fn resolve(&mut self, query: &str, search_column: &str, continue_from_last: bool) -> CrawlPhase {
        let same_search = self.query == query && self.search_column == search_column;

        if !continue_from_last || !same_search {
            self.query = query.to_string();
            self.search_column = search_column.to_string();
            self.last_page_processed = 0;
            self.total_pages = 0;
            self.has_more_pages = true;
            self.touch();
            return CrawlPhase::Fresh;
        }

        if self.is_exhausted() {
            CrawlPhase::Exhausted
        } else {
            CrawlPhase::Resuming {
                next_page: self.last_page_processed + 1,
            }
        }
    }

    /// Returns true when the matching search has no page left to fetch
    pub fn is_exhausted(&self) -> bool {
        !self.has_more_pages && self.total_pages > 0 && self.last_page_processed >= self.total_pages
    }

    /// The page a `begin_page`/`commit_page` pair must use next
    pub fn expected_page(&self) -> u32 {
        self.last_page_processed + 1
    }

    /// Validates that `page` is the next page to fetch
    pub fn begin_page(&self, page: u32) -> Result<(), StateError> {
        let expected = self.expected_page();
        if page == expected {
            Ok(())
        } else {
            Err(StateError::InvalidTransition {
                expected,
                requested: page,
            })
        }
    }

    /// Merges a page's records and advances the pagination pointer
    ///
    /// A later sighting of an id replaces its summary. Committing the same
    /// page again is accepted and leaves the state unchanged.
    ///
    /// Returns the number of ids not observed before.
    pub fn commit_page(&mut self, page: u32, records: &[RecordSummary]) -> Result<usize, StateError> {
        if page == 0 || page != self.last_page_processed {
            self.begin_page(page)?;
        }

        let mut new_ids = 0;
        for record in records {
            if self
                .observed_records
                .insert(record.record_id.clone(), record.clone())
                .is_none()
            {
                new_ids += 1;
            }
        }

        self.last_page_processed = page;
        self.touch();
        Ok(new_ids)
    }

    /// Records that `page` could not be fetched
    ///
    /// The caller must checkpoint and stop the listing phase.
    pub fn record_failure(&mut self, page: u32) {
        self.last_page_processed = page.saturating_sub(1);
        self.has_more_pages = true;
        self.touch();
    }

    /// Sets the total page count discovered on page 1
    pub fn set_total_pages(&mut self, total_pages: u32) {
        self.total_pages = total_pages;
        self.touch();
    }

    /// Closes the listing phase
    pub fn finalize(&mut self, total_pages_seen: u32) {
        self.total_pages = total_pages_seen;
        self.has_more_pages = self.last_page_processed < total_pages_seen;
        self.touch();
    }

    /// Checkpoint cadence: page 1, every `every` pages, and the last page of
    /// the run
    pub fn should_checkpoint(page: u32, last_page_of_run: u32, every: u32) -> bool {
        page == 1 || (every > 0 && page % every == 0) || page == last_page_of_run
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> RecordSummary {
        RecordSummary {
            display_number: format!("PI {}", id),
            filing_date: "01/01/2001".to_string(),
            record_id: id.to_string(),
            title: None,
            classification_code: None,
            raw_number: id.to_string(),
            detail_fetch_param: String::new(),
        }
    }

    fn page_of(ids: &[&str]) -> Vec<RecordSummary> {
        ids.iter().map(|id| summary(id)).collect()
    }

    #[test]
    fn test_resolve_fresh_state() {
        let mut state = CrawlState::default();
        assert_eq!(state.resolve("ABC", "X", true), CrawlPhase::Fresh);
        assert_eq!(state.query, "ABC");
        assert_eq!(state.search_column, "X");
        assert_eq!(CrawlPhase::Fresh.next_page(), Some(1));
    }

    #[test]
    fn test_resolve_other_query_keeps_observed_records() {
        let mut state = CrawlState::default();
        state.resolve("ABC", "X", true);
        state.commit_page(1, &page_of(&["1", "2"])).unwrap();
        state.finalize(4);

        assert_eq!(state.resolve("DEF", "X", true), CrawlPhase::Fresh);
        assert_eq!(state.last_page_processed, 0);
        assert_eq!(state.total_pages, 0);
        assert!(state.has_more_pages);
        assert_eq!(state.observed_records.len(), 2);
    }

    #[test]
    fn test_resolve_without_continue_restarts() {
        let mut state = CrawlState::default();
        state.resolve("ABC", "X", true);
        state.commit_page(1, &page_of(&["1"])).unwrap();

        assert_eq!(state.resolve("ABC", "X", false), CrawlPhase::Fresh);
        assert_eq!(state.last_page_processed, 0);
    }

    #[test]
    fn test_resolve_resuming_and_exhausted() {
        let mut state = CrawlState::default();
        state.resolve("ABC", "X", true);
        state.commit_page(1, &page_of(&["1"])).unwrap();
        state.record_failure(2);
        state.finalize(3);

        assert_eq!(
            state.resolve("ABC", "X", true),
            CrawlPhase::Resuming { next_page: 2 }
        );

        state.commit_page(2, &page_of(&["2"])).unwrap();
        state.commit_page(3, &page_of(&["3"])).unwrap();
        state.finalize(3);
        assert!(!state.has_more_pages);
        assert_eq!(state.resolve("ABC", "X", true), CrawlPhase::Exhausted);
        assert_eq!(CrawlPhase::Exhausted.next_page(), None);
    }

    #[test]
    fn test_failed_search_is_not_exhausted() {
        let mut state = CrawlState::default();
        state.resolve("ABC", "X", true);
        state.record_failure(1);

        assert_eq!(
            state.resolve("ABC", "X", true),
            CrawlPhase::Resuming { next_page: 1 }
        );
    }

    #[test]
    fn test_begin_page_validates_order() {
        let mut state = CrawlState::default();
        assert!(state.begin_page(1).is_ok());
        assert!(matches!(
            state.begin_page(3),
            Err(StateError::InvalidTransition {
                expected: 1,
                requested: 3
            })
        ));

        state.commit_page(1, &[]).unwrap();
        assert!(state.begin_page(2).is_ok());
        assert!(state.commit_page(5, &[]).is_err());
    }

    #[test]
    fn test_commit_page_is_idempotent() {
        let records = page_of(&["10", "11", "12"]);
        let mut state = CrawlState::default();
        state.resolve("ABC", "X", true);

        assert_eq!(state.commit_page(1, &records).unwrap(), 3);
        let once = state.observed_records.clone();
        let last_once = state.last_page_processed;

        assert_eq!(state.commit_page(1, &records).unwrap(), 0);
        assert_eq!(state.observed_records, once);
        assert_eq!(state.last_page_processed, last_once);
    }

    #[test]
    fn test_later_sighting_replaces_summary() {
        let mut state = CrawlState::default();
        state.commit_page(1, &page_of(&["7"])).unwrap();

        let mut updated = summary("7");
        updated.title = Some("NOVO TITULO".to_string());
        state.commit_page(2, &[updated]).unwrap();

        assert_eq!(state.observed_records.len(), 1);
        assert_eq!(
            state.observed_records["7"].title.as_deref(),
            Some("NOVO TITULO")
        );
    }

    #[test]
    fn test_record_failure() {
        let mut state = CrawlState::default();
        state.commit_page(1, &[]).unwrap();
        state.has_more_pages = false;

        state.record_failure(2);
        assert_eq!(state.last_page_processed, 1);
        assert!(state.has_more_pages);
    }

    #[test]
    fn test_finalize_with_page_cap() {
        let mut state = CrawlState::default();
        state.commit_page(1, &[]).unwrap();
        state.commit_page(2, &[]).unwrap();
        state.finalize(5);
        assert!(state.has_more_pages);
        assert!(!state.is_exhausted());
    }

    #[test]
    fn test_should_checkpoint() {
        let pages: Vec<u32> = (1..=12)
            .filter(|p| CrawlState::should_checkpoint(*p, 12, 5))
            .collect();
        assert_eq!(pages, vec![1, 5, 10, 12]);
        assert!(CrawlState::should_checkpoint(3, 3, 5));
    }

    #[test]
    fn test_serialized_names() {
        let mut state = CrawlState::default();
        state.resolve("petroleo", "NomeDepositante", true);
        state.commit_page(1, &page_of(&["99"])).unwrap();

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["last_query"], "petroleo");
        assert_eq!(json["last_search_column"], "NomeDepositante");
        assert_eq!(json["last_page_processed"], 1);
        assert_eq!(json["found_patents"]["99"]["patent_id"], "99");
        assert!(json["last_update_time"].as_str().unwrap().len() == 19);

        let back: CrawlState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
