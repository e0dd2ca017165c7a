use serde::Deserialize;

/// Main configuration structure for a catalog harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub output: OutputConfig,
}

/// Catalog endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Servlet that serves search, next-page and detail requests
    #[serde(rename = "search-url")]
    pub search_url: String,

    /// Low-cost page used to probe the session
    #[serde(rename = "probe-url")]
    pub probe_url: String,

    /// Rows requested per listing page
    #[serde(rename = "records-per-page", default = "default_records_per_page")]
    pub records_per_page: u32,
}

/// Pacing, timeouts and checkpoint cadence
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum time between consecutive requests (milliseconds)
    #[serde(rename = "request-interval-ms", default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Default per-request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for detail fetches; expiry is a degraded success
    #[serde(rename = "detail-timeout-ms", default = "default_detail_timeout_ms")]
    pub detail_timeout_ms: u64,

    /// Persist crawl state after every N listing pages
    #[serde(rename = "checkpoint-every-pages", default = "default_checkpoint_every_pages")]
    pub checkpoint_every_pages: u32,

    /// Flush enriched records to the table after every N records
    #[serde(rename = "flush-every-records", default = "default_flush_every_records")]
    pub flush_every_records: usize,

    /// Probe the session before each listing or detail fetch
    #[serde(rename = "probe-before-request", default = "default_true")]
    pub probe_before_request: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            request_interval_ms: default_request_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            detail_timeout_ms: default_detail_timeout_ms(),
            checkpoint_every_pages: default_checkpoint_every_pages(),
            flush_every_records: default_flush_every_records(),
            probe_before_request: true,
        }
    }
}

/// Authentication bootstrap and page classification
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Cookie header value (`name=value; name2=value2`) of an authenticated session
    #[serde(default)]
    pub cookies: Option<String>,

    /// Literal strings that identify a login page; any one match is conclusive
    #[serde(rename = "login-markers", default = "default_login_markers")]
    pub login_markers: Vec<String>,

    /// Literal string only an authenticated page carries
    #[serde(rename = "authenticated-marker", default = "default_authenticated_marker")]
    pub authenticated_marker: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            cookies: None,
            login_markers: default_login_markers(),
            authenticated_marker: default_authenticated_marker(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the CSV record table
    #[serde(rename = "records-path")]
    pub records_path: String,

    /// Path to the JSON crawl state file
    #[serde(rename = "state-path")]
    pub state_path: String,

    /// Directory for raw page copies; caching is off when absent
    #[serde(rename = "cache-dir", default)]
    pub cache_dir: Option<String>,

    /// Column whose presence marks a record as enriched
    #[serde(rename = "enrichment-signal", default = "default_enrichment_signal")]
    pub enrichment_signal: String,
}

fn default_records_per_page() -> u32 {
    100
}

fn default_request_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_detail_timeout_ms() -> u64 {
    10_000
}

fn default_checkpoint_every_pages() -> u32 {
    5
}

fn default_flush_every_records() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_login_markers() -> Vec<String> {
    [
        "pePI - Pesquisa em Propriedade Industrial",
        "Entrar com GOV.BR",
        "Para realizar a Pesquisa anonimamente",
        "name=\"T_Login\"",
        "name=\"T_Senha\"",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_authenticated_marker() -> String {
    "Finalizar Sessão".to_string()
}

fn default_enrichment_signal() -> String {
    "patent_agent".to_string()
}
