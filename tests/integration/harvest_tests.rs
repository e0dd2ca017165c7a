use catalog_harvest::config::{parse_config, Config};
use catalog_harvest::crawler::{query_hash, HarvestRequest, Harvester};
use catalog_harvest::output::{HarvestOutcome, StopReason};
use catalog_harvest::state::{CrawlPhase, StateFile};
use catalog_harvest::storage::RecordStore;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUERY: &str = "acme industrial";
const COLUMN: &str = "NomeDepositante";

/// Creates a test configuration pointing at the mock catalog
fn create_test_config(server: &MockServer, dir: &TempDir) -> Config {
    let toml = format!(
        r#"
[catalog]
search-url = "{base}/servlet"
probe-url = "{base}/probe"
records-per-page = 10

[crawler]
request-interval-ms = 0
request-timeout-ms = 5000
detail-timeout-ms = 300

[session]
cookies = "JSESSIONID=test-session"

[output]
records-path = "{records}"
state-path = "{state}"
cache-dir = "{cache}"
"#,
        base = server.uri(),
        records = dir.path().join("records.csv").display(),
        state = dir.path().join("search_state.json").display(),
        cache = dir.path().join("cache").display(),
    );
    parse_config(&toml).expect("valid test config")
}

/// A result page holding records `ids`, page `page` of `total`
fn listing_page(page: u32, total: u32, ids: impl IntoIterator<Item = u32>) -> String {
    let rows: String = ids
        .into_iter()
        .map(|id| {
            format!(
                r#"<tr>
                <td><input type="checkbox"></td>
                <td><a href="/servlet?Action=detail&CodPedido={id}&SearchParameter=TOKEN{id}">BR 10 2020 {id:06}-0</a></td>
                <td><font class="normal">01/02/2020</font></td>
                <td><font class="normal"><b>Record {id}</b></font></td>
                <td><font class="normal">A61K</font></td>
                </tr>"#
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <font class="normal">Mostrando página {page} de {total}</font>
        <table><tbody id="tituloContext">{rows}</tbody></table>
        <a href="logout">Finalizar Sessão</a>
        </body></html>"#
    )
}

fn detail_page() -> String {
    r#"<html><body>
    <font class="marcador">BR 10 2020 000001-0</font>
    <table>
      <tr><td><font class="alerta">Data do Depósito:</font></td><td><font class="normal">01/02/2020</font></td></tr>
      <tr><td><font class="alerta">Nome do Depositante:</font></td><td><font class="normal">ACME S.A. (BR/SP) / OTHER LTDA (BR/RJ)</font></td></tr>
      <tr><td><font class="alerta">Nome do Procurador:</font></td><td><font class="normal">Agent &amp; Partners</font></td></tr>
    </table>
    <div id="resumoContext">A device.</div>
    </body></html>"#
        .to_string()
}

async fn mount_probe(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Finalizar Sessão</html>"))
        .mount(server)
        .await;
}

async fn mount_search(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/servlet"))
        .and(body_string_contains("Action=SearchBasico"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/servlet"))
        .and(query_param("Action", "nextPage"))
        .and(query_param("Page", page.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/servlet"))
        .and(query_param("Action", "detail"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page()))
        .mount(server)
        .await;
}

async fn count_requests(server: &MockServer, http_method: &str, action: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.to_string() == http_method)
        .filter(|r| {
            let body = String::from_utf8_lossy(&r.body);
            r.url.query().unwrap_or("").contains(action) || body.contains(action)
        })
        .count()
}

fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
    let mut reader = csv::Reader::from_path(path).expect("record table exists");
    reader.records().map(|r| r.expect("valid row")).collect()
}

fn column(path: &Path, name: &str) -> usize {
    let mut reader = csv::Reader::from_path(path).expect("record table exists");
    reader
        .headers()
        .expect("header row")
        .iter()
        .position(|h| h == name)
        .expect("column present")
}

#[tokio::test]
async fn test_full_harvest_three_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_probe(&server).await;
    mount_search(&server, listing_page(1, 3, 1..=10)).await;
    mount_page(&server, 2, ResponseTemplate::new(200).set_body_string(listing_page(2, 3, 11..=20))).await;
    mount_page(&server, 3, ResponseTemplate::new(200).set_body_string(listing_page(3, 3, 21..=24))).await;
    mount_details(&server).await;

    let mut harvester = Harvester::from_config(config.clone()).unwrap();
    let report = harvester.run(&HarvestRequest::new(QUERY, COLUMN)).await.unwrap();

    assert_eq!(report.outcome, HarvestOutcome::Completed);
    assert_eq!(report.pages_processed, 3);
    assert_eq!(report.new_records, 24);
    assert_eq!(report.enriched, 24);
    assert_eq!(report.rows_appended, 24);
    assert_eq!(report.pending_enrichment, 0);

    let state = StateFile::new(&config.output.state_path).load().unwrap().unwrap();
    assert_eq!(state.last_page_processed, 3);
    assert_eq!(state.total_pages, 3);
    assert!(!state.has_more_pages);
    assert_eq!(state.observed_records.len(), 24);

    let records = Path::new(&config.output.records_path);
    let rows = read_rows(records);
    assert_eq!(rows.len(), 24);
    let agent = column(records, "patent_agent");
    assert!(rows.iter().all(|row| row.get(agent) == Some("Agent & Partners")));

    let cache = dir.path().join("cache");
    assert!(cache
        .join(format!("search_{}_page_3.html", query_hash(QUERY)))
        .exists());
    assert!(cache.join("details").join("record_24.html").exists());

    // Nothing left: the next run neither searches nor fetches details
    let requests_before = server.received_requests().await.unwrap_or_default().len();
    let mut harvester = Harvester::from_config(config).unwrap();
    let report = harvester.run(&HarvestRequest::new(QUERY, COLUMN)).await.unwrap();

    assert_eq!(report.start_phase, Some(CrawlPhase::Exhausted));
    assert_eq!(report.outcome, HarvestOutcome::Completed);
    assert_eq!(report.candidates, 0);
    let requests_after = server.received_requests().await.unwrap_or_default().len();
    // Only the session probe
    assert_eq!(requests_after - requests_before, 1);
}

#[tokio::test]
async fn test_failed_page_resumes_on_next_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_probe(&server).await;
    mount_search(&server, listing_page(1, 3, 1..=10)).await;
    mount_page(&server, 2, ResponseTemplate::new(500)).await;
    mount_details(&server).await;

    let mut harvester = Harvester::from_config(config.clone()).unwrap();
    let report = harvester.run(&HarvestRequest::new(QUERY, COLUMN)).await.unwrap();

    assert_eq!(report.outcome, HarvestOutcome::Resumable);
    assert_eq!(report.outcome.exit_code(), 2);
    assert_eq!(report.listing_stop, Some(StopReason::TransportFailure));
    // Records from page 1 are still enriched
    assert_eq!(report.enriched, 10);

    let state = StateFile::new(&config.output.state_path).load().unwrap().unwrap();
    assert_eq!(state.last_page_processed, 1);
    assert!(state.has_more_pages);

    // The catalog recovers
    server.reset().await;
    mount_probe(&server).await;
    mount_search(&server, listing_page(1, 3, 1..=10)).await;
    mount_page(&server, 2, ResponseTemplate::new(200).set_body_string(listing_page(2, 3, 11..=20))).await;
    mount_page(&server, 3, ResponseTemplate::new(200).set_body_string(listing_page(3, 3, 21..=24))).await;
    mount_details(&server).await;

    let mut harvester = Harvester::from_config(config.clone()).unwrap();
    let report = harvester.run(&HarvestRequest::new(QUERY, COLUMN)).await.unwrap();

    assert_eq!(report.start_phase, Some(CrawlPhase::Resuming { next_page: 2 }));
    assert_eq!(report.outcome, HarvestOutcome::Completed);
    assert_eq!(count_requests(&server, "POST", "SearchBasico").await, 0);
    // Only the 14 records from pages 2 and 3 lack details
    assert_eq!(report.candidates, 14);

    let state = harvester.state();
    assert_eq!(state.last_page_processed, 3);
    assert!(!state.has_more_pages);
    assert_eq!(read_rows(Path::new(&config.output.records_path)).len(), 24);
}

#[tokio::test]
async fn test_detail_timeout_keeps_listing_fields() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_probe(&server).await;
    mount_search(&server, listing_page(1, 1, [553, 554, 555, 556])).await;

    // Specific mock first so it wins over the generic detail mock
    Mock::given(method("GET"))
        .and(path("/servlet"))
        .and(query_param("Action", "detail"))
        .and(query_param("CodPedido", "555"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    mount_details(&server).await;

    let mut harvester = Harvester::from_config(config.clone()).unwrap();
    let report = harvester.run(&HarvestRequest::new(QUERY, COLUMN)).await.unwrap();

    assert_eq!(report.degraded, vec!["555".to_string()]);
    assert!(report.failures.is_empty());
    assert_eq!(report.enriched, 3);
    assert_eq!(report.rows_appended, 4);
    assert_eq!(report.pending_enrichment, 1);

    let records = Path::new(&config.output.records_path);
    let id = column(records, "patent_id");
    let agent = column(records, "patent_agent");
    let title = column(records, "title");
    let rows = read_rows(records);
    let degraded = rows
        .iter()
        .find(|row| row.get(id) == Some("555"))
        .expect("timed out record is stored");
    assert_eq!(degraded.get(agent), Some(""));
    assert_eq!(degraded.get(title), Some("Record 555"));
    // The record after the timeout was still fetched
    assert!(rows
        .iter()
        .any(|row| row.get(id) == Some("556") && row.get(agent) == Some("Agent & Partners")));

    assert!(!harvester.store().has_details("555"));
    assert!(harvester.store().has_details("556"));
}

#[tokio::test]
async fn test_login_page_on_probe_fails_authentication() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><form><input name="T_Login"><input name="T_Senha"></form></html>"#,
        ))
        .mount(&server)
        .await;
    mount_search(&server, listing_page(1, 1, 1..=3)).await;

    let mut harvester = Harvester::from_config(config.clone()).unwrap();
    let report = harvester.run(&HarvestRequest::new(QUERY, COLUMN)).await.unwrap();

    assert_eq!(report.outcome, HarvestOutcome::AuthenticationFailed);
    assert_eq!(report.outcome.exit_code(), 1);
    assert_eq!(count_requests(&server, "POST", "SearchBasico").await, 0);
    assert!(!Path::new(&config.output.records_path).exists());
}

#[tokio::test]
async fn test_page_cap_leaves_harvest_resumable() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_probe(&server).await;
    mount_search(&server, listing_page(1, 3, 1..=10)).await;
    mount_page(&server, 2, ResponseTemplate::new(200).set_body_string(listing_page(2, 3, 11..=20))).await;
    mount_details(&server).await;

    let request = HarvestRequest {
        max_pages: Some(2),
        max_records: Some(5),
        ..HarvestRequest::new(QUERY, COLUMN)
    };
    let mut harvester = Harvester::from_config(config).unwrap();
    let report = harvester.run(&request).await.unwrap();

    assert_eq!(report.listing_stop, Some(StopReason::PageCapReached));
    assert_eq!(report.detail_stop, Some(StopReason::RecordCapReached));
    assert_eq!(report.outcome, HarvestOutcome::Resumable);
    assert_eq!(report.last_page_processed, 2);
    assert!(report.has_more_pages);
    assert_eq!(report.enriched, 5);
    assert_eq!(report.pending_enrichment, 15);
    assert_eq!(harvester.store().index().len(), 5);
}

#[tokio::test]
async fn test_unreadable_record_table_is_replaced_and_state_kept() {
    use catalog_harvest::record::RecordSummary;
    use catalog_harvest::state::CrawlState;

    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    // A finished listing from an earlier run
    let mut state = CrawlState::default();
    state.resolve(QUERY, COLUMN, true);
    state.set_total_pages(1);
    let summaries: Vec<RecordSummary> = (1..=3)
        .map(|id| RecordSummary {
            display_number: format!("BR 10 2020 {:06}-0", id),
            filing_date: "01/02/2020".to_string(),
            record_id: id.to_string(),
            title: Some(format!("Record {}", id)),
            classification_code: None,
            raw_number: format!("1020200000{}0", id),
            detail_fetch_param: format!("TOKEN{}", id),
        })
        .collect();
    state.commit_page(1, &summaries).unwrap();
    state.finalize(1);
    StateFile::new(&config.output.state_path).save(&state).unwrap();

    // A table exported with a non-UTF-8 encoding
    let mut table = b"patent_number,patent_id,patent_agent\nBR 1,1,".to_vec();
    table.extend_from_slice(&[0xc9, 0xff, 0xfe]);
    table.push(b'\n');
    std::fs::write(&config.output.records_path, table).unwrap();

    mount_probe(&server).await;
    mount_details(&server).await;

    let mut harvester = Harvester::from_config(config.clone()).unwrap();
    assert_eq!(harvester.state().observed_records.len(), 3);
    assert!(harvester.store().index().is_empty());

    let report = harvester.run(&HarvestRequest::new(QUERY, COLUMN)).await.unwrap();

    assert_eq!(report.start_phase, Some(CrawlPhase::Exhausted));
    assert_eq!(report.observed_records, 3);
    assert_eq!(report.enriched, 3);
    assert_eq!(report.outcome, HarvestOutcome::Completed);
    assert_eq!(read_rows(Path::new(&config.output.records_path)).len(), 3);

    let set_aside = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("records.csv.corrupt-"))
        .count();
    assert_eq!(set_aside, 1);
}
