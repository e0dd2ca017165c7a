use crate::config::Config;
use crate::crawler::{FetchOutcome, FetchRequest, Transport};
use crate::session::LoginDetector;

/// Current belief about the authenticated session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not probed yet in this process
    Unknown,

    /// The last probe saw an authenticated page
    Usable,

    /// A probe failed or a login page was observed
    Expired,
}

/// Classification of a probe response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Authenticated,

    /// Login page, or an anonymous page without the authenticated marker
    LoginRequired,

    TransportError,
}

/// Tracks whether the session is still usable
#[derive(Debug, Clone)]
pub struct SessionTracker {
    status: SessionStatus,
    probe_url: String,
    authenticated_marker: String,
    detector: LoginDetector,
    probe_before_request: bool,
}

impl SessionTracker {
    pub fn new(config: &Config) -> Self {
        Self {
            status: SessionStatus::Unknown,
            probe_url: config.catalog.probe_url.clone(),
            authenticated_marker: config.session.authenticated_marker.clone(),
            detector: LoginDetector::from_config(&config.session),
            probe_before_request: config.crawler.probe_before_request,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn detector(&self) -> &LoginDetector {
        &self.detector
    }

    /// Returns true only if the last probe succeeded and nothing has expired
    /// the session since
    pub fn is_usable(&self) -> bool {
        self.status == SessionStatus::Usable
    }

    /// Records that a consumer saw a login page in place of content
    pub fn mark_expired(&mut self) {
        if self.status != SessionStatus::Expired {
            tracing::warn!("Session marked as expired");
        }
        self.status = SessionStatus::Expired;
    }

    /// Checks a fetched page; expires the session if it is a login page
    ///
    /// Returns true if the content was a login page.
    pub fn observe(&mut self, content: &str) -> bool {
        match self.detector.matching_marker(content) {
            Some(marker) => {
                tracing::debug!("Login page marker found: {}", marker);
                self.mark_expired();
                true
            }
            None => false,
        }
    }

    /// Classifies a probe response without changing the tracked status
    pub fn classify(&self, outcome: &FetchOutcome) -> ProbeResult {
        let Some(body) = outcome.success_body() else {
            return ProbeResult::TransportError;
        };
        if self.detector.is_login_page(body) {
            ProbeResult::LoginRequired
        } else if body.contains(self.authenticated_marker.as_str()) {
            ProbeResult::Authenticated
        } else {
            ProbeResult::LoginRequired
        }
    }

    /// Issues one low-cost request and updates the status from its response
    ///
    /// Returns true only for an authenticated response.
    pub async fn probe<T: Transport + ?Sized>(&mut self, transport: &T) -> bool {
        let outcome = transport.fetch(&FetchRequest::get(&self.probe_url)).await;
        let result = self.classify(&outcome);

        match result {
            ProbeResult::Authenticated => {
                tracing::debug!("Session probe: authenticated");
                self.status = SessionStatus::Usable;
                true
            }
            ProbeResult::LoginRequired => {
                tracing::warn!("Session probe: login required");
                self.status = SessionStatus::Expired;
                false
            }
            ProbeResult::TransportError => {
                tracing::warn!("Session probe failed: {}", outcome.describe());
                self.status = SessionStatus::Expired;
                false
            }
        }
    }

    /// Pre-request check used by both harvest phases
    ///
    /// With `probe-before-request` every call probes. Otherwise the cached
    /// belief is used and only an unknown status triggers a probe.
    pub async fn ensure_usable<T: Transport + ?Sized>(&mut self, transport: &T) -> bool {
        match (self.probe_before_request, self.status) {
            (_, SessionStatus::Expired) => false,
            (true, _) | (false, SessionStatus::Unknown) => self.probe(transport).await,
            (false, SessionStatus::Usable) => true,
        }
    }
}
