//! HTTP transport
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building an HTTP client with browser-like headers and a seeded cookie jar
//! - Form POSTs (search submission) and GETs with query parameters
//! - Per-request timeout overrides
//! - Classifying outcomes into response, timeout, and transport failure

use crate::config::{CrawlerConfig, SessionConfig};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// HTTP method of a catalog request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Parameters are sent as the query string
    Get,

    /// Parameters are sent as an urlencoded form body
    Post,
}

/// A single request against the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub params: Vec<(String, String)>,

    /// Overrides the transport's default timeout
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            params: Vec::new(),
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Looks up the first parameter with the given name
    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server answered, whatever the status
    Response {
        /// HTTP status code
        status: u16,
        /// Page body content
        body: String,
    },

    /// The request did not complete within its timeout
    TimedOut,

    /// Connection or protocol error
    Failed {
        /// Error description
        error: String,
    },
}

impl FetchOutcome {
    /// Body of a 2xx response
    pub fn success_body(&self) -> Option<&str> {
        match self {
            Self::Response { status, body } if (200..300).contains(status) => Some(body),
            _ => None,
        }
    }

    /// Short description used in logs and failure reports
    pub fn describe(&self) -> String {
        match self {
            Self::Response { status, .. } => format!("HTTP {}", status),
            Self::TimedOut => "request timed out".to_string(),
            Self::Failed { error } => error.clone(),
        }
    }
}

/// The collaborator that performs catalog requests
///
/// Implementations must be able to honor `FetchRequest::timeout` independently
/// of their default timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `session` - User agent and bootstrap cookies
/// * `crawler` - Default request timeout
/// * `cookie_url` - URL the bootstrap cookies are scoped to
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    session: &SessionConfig,
    crawler: &CrawlerConfig,
    cookie_url: &Url,
) -> Result<Client, reqwest::Error> {
    let jar = Jar::default();
    if let Some(cookies) = &session.cookies {
        for pair in cookies.split(';').map(str::trim).filter(|p| p.contains('=')) {
            jar.add_cookie_str(pair, cookie_url);
        }
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("pt-BR,en-US;q=0.8,en;q=0.6"),
    );
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

    Client::builder()
        .user_agent(session.user_agent.clone())
        .default_headers(headers)
        .cookie_provider(Arc::new(jar))
        .timeout(Duration::from_millis(crawler.request_timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `Transport` backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url).query(&request.params),
            Method::Post => self.client.post(&request.url).form(&request.params),
        };
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        tracing::debug!("{:?} {}", request.method, request.url);

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return classify_error(e),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => FetchOutcome::Response { status, body },
            Err(e) => classify_error(e),
        }
    }
}

fn classify_error(error: reqwest::Error) -> FetchOutcome {
    if error.is_timeout() {
        FetchOutcome::TimedOut
    } else if error.is_connect() {
        FetchOutcome::Failed {
            error: format!("Connection failed: {}", error),
        }
    } else {
        FetchOutcome::Failed {
            error: error.to_string(),
        }
    }
}
