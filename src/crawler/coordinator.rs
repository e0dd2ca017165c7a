//! Harvest coordinator - main orchestration logic
//!
//! This module drives a harvest from start to finish:
//! - Probing the session before any catalog request
//! - The listing phase: search submission, then page-by-page pagination
//! - The detail phase: one detail fetch per record lacking enrichment
//! - Checkpointing the crawl state and flushing records to the store
//!
//! Everything runs on one task, one request at a time.

use crate::config::Config;
use crate::crawler::cache::PageCache;
use crate::crawler::fetcher::{build_http_client, FetchOutcome, FetchRequest, HttpTransport, Transport};
use crate::crawler::scheduler::RateLimiter;
use crate::extract::{extract_detail, extract_listing};
use crate::output::{HarvestOutcome, HarvestReport, RecordFailure, StopReason};
use crate::record::{MergedRecord, RecordSummary};
use crate::session::SessionTracker;
use crate::state::{CrawlPhase, CrawlState, StateFile};
use crate::storage::{CsvRecordStore, EnrichmentSignal, RecordStore};
use crate::HarvestError;
use std::time::Duration;
use url::Url;

/// What to harvest and how to react to failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRequest {
    pub query: String,

    /// Catalog column the query is matched against (e.g. `NomeDepositante`)
    pub search_column: String,

    /// Last listing page to fetch in this run
    pub max_pages: Option<u32>,

    /// Maximum detail fetches in this run
    pub max_records: Option<usize>,

    /// Resume pagination of a matching previous search
    pub continue_from_last: bool,

    /// Keep going after a per-record detail failure
    pub continue_on_error: bool,
}

impl HarvestRequest {
    pub fn new(query: impl Into<String>, search_column: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_column: search_column.into(),
            max_pages: None,
            max_records: None,
            continue_from_last: true,
            continue_on_error: false,
        }
    }
}

/// Result of fetching one catalog page
enum PageFetch {
    Page(String),
    LoginPage,
    TimedOut,
    Failed(String),
}

/// Main harvest coordinator
pub struct Harvester<T: Transport, S: RecordStore> {
    config: Config,
    transport: T,
    store: S,
    state: CrawlState,
    state_file: StateFile,
    session: SessionTracker,
    limiter: RateLimiter,
    cache: Option<PageCache>,

    /// Merged records not yet flushed to the store
    buffer: Vec<MergedRecord>,
}

impl Harvester<HttpTransport, CsvRecordStore> {
    /// Builds a harvester with the HTTP transport and the CSV record store
    ///
    /// Loads the record table and the crawl state. Either file, if corrupt, is
    /// moved aside and replaced by an empty one without affecting the other.
    pub fn from_config(config: Config) -> Result<Self, HarvestError> {
        let cookie_url = Url::parse(&config.catalog.search_url)?;
        let client = build_http_client(&config.session, &config.crawler, &cookie_url)?;

        let store = CsvRecordStore::open(
            &config.output.records_path,
            EnrichmentSignal::new(config.output.enrichment_signal.clone()),
        )?;

        let state_file = StateFile::new(&config.output.state_path);
        let state = state_file.load_or_default()?;

        Ok(Self::new(config, HttpTransport::new(client), store, state_file, state))
    }
}

impl<T: Transport, S: RecordStore> Harvester<T, S> {
    pub fn new(config: Config, transport: T, store: S, state_file: StateFile, state: CrawlState) -> Self {
        let session = SessionTracker::new(&config);
        let limiter = RateLimiter::from_config(&config.crawler);
        let cache = config.output.cache_dir.as_ref().map(PageCache::new);

        Self {
            config,
            transport,
            store,
            state,
            state_file,
            session,
            limiter,
            cache,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    /// Runs both phases
    ///
    /// The detail phase is skipped when the search could not be submitted.
    /// Errors are returned only for local failures (state file, record table);
    /// remote failures end the run early and are described by the report.
    pub async fn run(&mut self, request: &HarvestRequest) -> Result<HarvestReport, HarvestError> {
        let mut report = HarvestReport::new(&request.query, &request.search_column);

        if !self.session.probe(&self.transport).await {
            tracing::error!("Could not establish an authenticated session");
            report.outcome = HarvestOutcome::AuthenticationFailed;
            report.finish(&self.state, self.store.index());
            return Ok(report);
        }

        match self.run_listing(request, &mut report).await? {
            Some(candidates) => self.run_details(candidates, request, &mut report).await?,
            None => tracing::warn!("Search could not be performed, skipping detail phase"),
        }

        report.finish(&self.state, self.store.index());
        tracing::info!("Harvest finished: {}", report.outcome.describe());
        Ok(report)
    }

    /// Listing phase
    ///
    /// # Returns
    ///
    /// * `Ok(Some(candidates))` - Observed records lacking enrichment, also
    ///   when pagination stopped early
    /// * `Ok(None)` - The search submission failed
    pub async fn run_listing(
        &mut self,
        request: &HarvestRequest,
        report: &mut HarvestReport,
    ) -> Result<Option<Vec<RecordSummary>>, HarvestError> {
        let result = self.listing_pages(request, report).await;
        if result.is_err() {
            self.checkpoint_best_effort();
        }
        result
    }

    async fn listing_pages(
        &mut self,
        request: &HarvestRequest,
        report: &mut HarvestReport,
    ) -> Result<Option<Vec<RecordSummary>>, HarvestError> {
        let phase = self
            .state
            .resolve(&request.query, &request.search_column, request.continue_from_last);
        report.start_phase = Some(phase);

        let start = match phase {
            CrawlPhase::Exhausted => {
                tracing::info!(
                    "All {} pages of '{}' already processed, skipping listing",
                    self.state.total_pages,
                    request.query
                );
                return Ok(Some(self.candidates()));
            }
            CrawlPhase::Fresh => {
                tracing::info!("Starting new search for '{}' in {}", request.query, request.search_column);
                1
            }
            CrawlPhase::Resuming { next_page } => {
                tracing::info!("Continuing search '{}' from page {}", request.query, next_page);
                next_page
            }
        };

        self.limiter.reset();

        if start == 1 && !self.submit_search(request, report).await? {
            return Ok(None);
        }

        let total_pages = self.state.total_pages;
        let last_page = request
            .max_pages
            .map_or(total_pages, |cap| cap.min(total_pages));
        let every = self.config.crawler.checkpoint_every_pages;

        let first = if start == 1 { 2 } else { start };
        for page in first..=last_page {
            tracing::info!("Fetching listing page {} of {}", page, last_page);

            if let Err(stop) = self.before_request().await {
                self.stop_listing(page, stop, report)?;
                break;
            }
            self.state.begin_page(page)?;

            let fetch = self
                .fetch_page(
                    FetchRequest::get(&self.config.catalog.search_url)
                        .param("Action", "nextPage")
                        .param("Page", page.to_string())
                        .param("Resumo", "")
                        .param("Titulo", ""),
                )
                .await;

            match fetch {
                PageFetch::Page(body) => {
                    self.commit_listing(page, &body, &request.query, report)?;
                    if CrawlState::should_checkpoint(page, last_page, every) {
                        self.checkpoint()?;
                    }
                }
                PageFetch::LoginPage => {
                    tracing::error!("Session expired while retrieving page {}", page);
                    self.stop_listing(page, StopReason::SessionExpired, report)?;
                    break;
                }
                PageFetch::TimedOut => {
                    tracing::error!("Listing page {} timed out", page);
                    self.stop_listing(page, StopReason::TransportFailure, report)?;
                    break;
                }
                PageFetch::Failed(error) => {
                    tracing::error!("Failed to retrieve page {}: {}", page, error);
                    self.stop_listing(page, StopReason::TransportFailure, report)?;
                    break;
                }
            }
        }

        if report.listing_stop.is_none() && last_page < total_pages {
            tracing::info!("Page cap reached at {} of {} pages", last_page, total_pages);
            report.listing_stop = Some(StopReason::PageCapReached);
        }

        self.state.finalize(total_pages);
        self.checkpoint()?;

        let candidates = self.candidates();
        tracing::info!(
            "Listing done: {} observed records, {} lacking details",
            self.state.observed_records.len(),
            candidates.len()
        );
        Ok(Some(candidates))
    }

    /// Submits the search form and commits page 1
    ///
    /// Returns false if the search failed; the failure is already recorded
    /// and checkpointed.
    async fn submit_search(
        &mut self,
        request: &HarvestRequest,
        report: &mut HarvestReport,
    ) -> Result<bool, HarvestError> {
        if let Err(stop) = self.before_request().await {
            self.stop_listing(1, stop, report)?;
            return Ok(false);
        }
        self.state.begin_page(1)?;

        let fetch = self
            .fetch_page(
                FetchRequest::post(&self.config.catalog.search_url)
                    .param("NumPedido", "")
                    .param("NumGru", "")
                    .param("NumProtocolo", "")
                    .param("FormaPesquisa", "todasPalavras")
                    .param("ExpressaoPesquisa", request.query.as_str())
                    .param("Coluna", request.search_column.as_str())
                    .param("RegisterPerPage", self.config.catalog.records_per_page.to_string())
                    .param("botao", " pesquisar » ")
                    .param("Action", "SearchBasico"),
            )
            .await;

        let body = match fetch {
            PageFetch::Page(body) => body,
            PageFetch::LoginPage => {
                tracing::error!("Login page returned for the search submission");
                report.outcome = HarvestOutcome::AuthenticationFailed;
                self.stop_listing(1, StopReason::SessionExpired, report)?;
                return Ok(false);
            }
            PageFetch::TimedOut => {
                tracing::error!("Search submission timed out");
                self.stop_listing(1, StopReason::TransportFailure, report)?;
                return Ok(false);
            }
            PageFetch::Failed(error) => {
                tracing::error!("Failed to perform search: {}", error);
                self.stop_listing(1, StopReason::TransportFailure, report)?;
                return Ok(false);
            }
        };

        let total_pages = match crate::extract::parse_total_pages(&body) {
            Some(total) if total > 0 => {
                tracing::info!("Found {} pages of results", total);
                total
            }
            _ => {
                tracing::warn!("No pagination text on the first page, assuming a single page");
                1
            }
        };
        self.state.set_total_pages(total_pages);

        self.commit_listing(1, &body, &request.query, report)?;
        self.checkpoint()?;
        Ok(true)
    }

    fn commit_listing(
        &mut self,
        page: u32,
        body: &str,
        query: &str,
        report: &mut HarvestReport,
    ) -> Result<(), HarvestError> {
        if let Some(cache) = &self.cache {
            cache.store_listing(query, page, body);
        }

        let listing = extract_listing(body);
        if listing.is_empty() {
            tracing::warn!(
                "Listing page {} yielded no records ({} rows skipped)",
                page,
                listing.skipped_rows
            );
            report.parse_anomalies += 1;
        }

        let new_ids = self.state.commit_page(page, &listing.records)?;
        report.pages_processed += 1;
        report.new_records += new_ids;
        tracing::debug!(
            "Page {}: {} records, {} new",
            page,
            listing.records.len(),
            new_ids
        );
        Ok(())
    }

    fn stop_listing(
        &mut self,
        page: u32,
        stop: StopReason,
        report: &mut HarvestReport,
    ) -> Result<(), HarvestError> {
        self.state.record_failure(page);
        self.checkpoint()?;
        report.listing_stop = Some(stop);
        Ok(())
    }

    /// Observed records the store does not hold as enriched, in observation order
    pub fn candidates(&self) -> Vec<RecordSummary> {
        self.state
            .observed_records
            .values()
            .filter(|summary| !self.store.has_details(&summary.record_id))
            .cloned()
            .collect()
    }

    /// Detail phase
    ///
    /// Merged records are flushed to the store every `flush-every-records`
    /// records and at the end of the phase, including when it stops early.
    pub async fn run_details(
        &mut self,
        candidates: Vec<RecordSummary>,
        request: &HarvestRequest,
        report: &mut HarvestReport,
    ) -> Result<(), HarvestError> {
        let result = self.detail_records(candidates, request, report).await;
        if result.is_err() && !self.buffer.is_empty() {
            if let Err(e) = self.store.append(&self.buffer) {
                tracing::error!("Failed to save {} buffered records: {}", self.buffer.len(), e);
            }
        }
        result
    }

    async fn detail_records(
        &mut self,
        mut candidates: Vec<RecordSummary>,
        request: &HarvestRequest,
        report: &mut HarvestReport,
    ) -> Result<(), HarvestError> {
        let mut capped = false;
        if let Some(max) = request.max_records {
            if candidates.len() > max {
                candidates.truncate(max);
                capped = true;
            }
        }

        report.candidates = candidates.len();
        if candidates.is_empty() {
            tracing::info!("No records need details");
            return Ok(());
        }
        tracing::info!("Fetching details for {} records", candidates.len());

        self.limiter.reset();
        let flush_every = self.config.crawler.flush_every_records;
        let timeout = Duration::from_millis(self.config.crawler.detail_timeout_ms);

        for (i, summary) in candidates.iter().enumerate() {
            tracing::info!(
                "Fetching details for record {}/{}: {}",
                i + 1,
                candidates.len(),
                summary.display_number
            );

            if let Err(stop) = self.before_request().await {
                tracing::error!("Session is no longer usable, saving progress");
                report.detail_stop = Some(stop);
                break;
            }

            let fetch = self
                .fetch_page(
                    FetchRequest::get(&self.config.catalog.search_url)
                        .param("Action", "detail")
                        .param("CodPedido", summary.record_id.as_str())
                        .param("SearchParameter", summary.detail_fetch_param.as_str())
                        .param("Resumo", "")
                        .param("Titulo", "")
                        .timeout(timeout),
                )
                .await;

            match fetch {
                PageFetch::Page(body) => {
                    if let Some(cache) = &self.cache {
                        cache.store_detail(&summary.record_id, &body);
                    }
                    let detail = extract_detail(&body);
                    if detail.is_empty() {
                        tracing::warn!(
                            "Detail page for {} yielded no fields, skipping",
                            summary.record_id
                        );
                        report.parse_anomalies += 1;
                        continue;
                    }
                    let mut record = MergedRecord::from_summary(summary);
                    let added = record.merge_detail(&detail);
                    tracing::debug!("Record {}: {} detail fields", summary.record_id, added);
                    self.buffer.push(record);
                    report.enriched += 1;
                }
                PageFetch::TimedOut => {
                    tracing::warn!(
                        "Detail request for {} timed out, keeping listing data only",
                        summary.record_id
                    );
                    self.buffer.push(MergedRecord::from_summary(summary));
                    report.degraded.push(summary.record_id.clone());
                }
                PageFetch::LoginPage => {
                    tracing::error!(
                        "Session expired while retrieving details for {}",
                        summary.record_id
                    );
                    report.failures.push(failure(summary, "login page returned"));
                    report.detail_stop = Some(StopReason::SessionExpired);
                    break;
                }
                PageFetch::Failed(error) => {
                    tracing::error!("Failed to fetch details for {}: {}", summary.record_id, error);
                    report.failures.push(failure(summary, &error));
                    if !request.continue_on_error {
                        report.detail_stop = Some(StopReason::RecordFailure);
                        break;
                    }
                }
            }

            if self.buffer.len() >= flush_every {
                tracing::info!("Saving intermediate results ({} records)", self.buffer.len());
                self.flush(report)?;
            }
        }

        self.flush(report)?;

        if capped && report.detail_stop.is_none() {
            report.detail_stop = Some(StopReason::RecordCapReached);
        }
        tracing::info!(
            "Detail phase done: {} enriched, {} timed out, {} failed",
            report.enriched,
            report.degraded.len(),
            report.failures.len()
        );
        Ok(())
    }

    /// Paces the next request and checks the session
    async fn before_request(&mut self) -> Result<(), StopReason> {
        self.limiter.pace().await;
        if self.session.ensure_usable(&self.transport).await {
            Ok(())
        } else {
            Err(StopReason::SessionExpired)
        }
    }

    async fn fetch_page(&mut self, request: FetchRequest) -> PageFetch {
        let outcome = self.transport.fetch(&request).await;
        match outcome {
            FetchOutcome::TimedOut => PageFetch::TimedOut,
            FetchOutcome::Failed { error } => PageFetch::Failed(error),
            FetchOutcome::Response { status, body } if (200..300).contains(&status) => {
                if self.session.observe(&body) {
                    PageFetch::LoginPage
                } else {
                    PageFetch::Page(body)
                }
            }
            FetchOutcome::Response { status, .. } => PageFetch::Failed(format!("HTTP {}", status)),
        }
    }

    fn flush(&mut self, report: &mut HarvestReport) -> Result<(), HarvestError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let summary = self.store.append(&self.buffer)?;
        self.buffer.clear();

        report.rows_appended += summary.added;
        report.rows_skipped += summary.skipped;
        if !summary.new_columns.is_empty() {
            tracing::info!("Record table gained columns: {}", summary.new_columns.join(", "));
        }
        if summary.skipped > 0 {
            tracing::debug!("{} records were already stored and left unchanged", summary.skipped);
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), HarvestError> {
        self.state_file.save(&self.state)?;
        Ok(())
    }

    fn checkpoint_best_effort(&self) {
        if let Err(e) = self.state_file.save(&self.state) {
            tracing::error!("Failed to checkpoint crawl state: {}", e);
        }
    }
}

fn failure(summary: &RecordSummary, error: &str) -> RecordFailure {
    RecordFailure {
        record_id: summary.record_id.clone(),
        display_number: summary.display_number.clone(),
        error: error.to_string(),
    }
}
