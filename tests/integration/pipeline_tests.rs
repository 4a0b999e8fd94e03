//! Integration tests for the search pipeline
//!
//! These tests use wiremock to stand in for the DailyMed search and label
//! pages and run whole searches end-to-end.

use label_sieve::analysis::{AnalysisBackend, FakeBackend};
use label_sieve::config::Config;
use label_sieve::crawler::{run_search, Coordinator, StopReason};
use label_sieve::output::{default_output_path, write_report, RunStatus};
use label_sieve::{DisqualifyReason, FormType, SieveError};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointed at the mock server, with no pacing
fn create_test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.search.base_url = format!("{}/dailymed/search.cfm", server.uri());
    config.fetcher.pagination_delay_ms = 0;
    config.fetcher.label_delay_ms = 0;
    config.fetcher.max_attempts = 2;
    config.fetcher.backoff_base_ms = 1;
    config
}

/// A results page listing `ids`, optionally linking to `next_page`
fn results_page(ids: &[&str], next_page: Option<u32>) -> String {
    let mut html = String::from("<html><head><title>DailyMed - Search</title></head><body><ul>");
    for id in ids {
        html.push_str(&format!(
            r#"<li><a href="/dailymed/lookup.cfm?setid={id}&audience=consumer">Label {id}</a></li>"#
        ));
    }
    html.push_str("</ul>");
    if let Some(next) = next_page {
        html.push_str(&format!(
            r#"<div class="pagination"><a href="search.cfm?labeltype=all&query=x&page={next}">{next}</a></div>"#
        ));
    }
    html.push_str("</body></html>");
    html
}

/// A label page with a title, an optional warning banner, and an ingredient list
fn label_page(title: &str, ingredients: &[&str], warning: bool) -> String {
    let banner = if warning {
        r#"<div class="warning">This SPL contains an inactive NDC code.</div>"#
    } else {
        ""
    };
    let section = if ingredients.is_empty() {
        String::from("<h2>DESCRIPTION</h2><p>See package insert.</p>")
    } else {
        let items: String = ingredients
            .iter()
            .map(|i| format!("<li>{i}</li>"))
            .collect();
        format!("<h2>Inactive Ingredients</h2><ul>{items}</ul>")
    };
    format!(
        "<html><head><title>DailyMed - {title}</title></head><body><h1>{title}</h1>{banner}{section}</body></html>"
    )
}

async fn mount_results_page(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/dailymed/search.cfm"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_label(server: &MockServer, id: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/dailymed/lookup.cfm"))
        .and(query_param("setid", id))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn label_url(server: &MockServer, id: &str) -> String {
    format!("{}/dailymed/lookup.cfm?setid={}", server.uri(), id)
}

#[tokio::test]
async fn test_results_processed_in_emission_order() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["a1", "a2"], Some(2))).await;
    mount_results_page(&server, 2, results_page(&["b1", "b2"], Some(3))).await;
    mount_results_page(&server, 3, results_page(&[], None)).await;

    for (id, title) in [
        ("a1", "Hydrocortisone Tablets 5 mg"),
        ("a2", "Hydrocortisone Tablets 10 mg"),
        ("b1", "Hydrocortisone Tablets 20 mg"),
        ("b2", "Hydrocortisone Capsules 20 mg"),
    ] {
        mount_label(
            &server,
            id,
            label_page(title, &["microcrystalline cellulose", "talc"], false),
        )
        .await;
    }

    let report = run_search(create_test_config(&server), None, "hydrocortisone")
        .await
        .expect("search should succeed");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.stop_reason, StopReason::NoNewEntries);
    assert_eq!(report.candidates_found, 4);

    let urls: Vec<_> = report.qualified.iter().map(|r| r.url.clone()).collect();
    assert_eq!(
        urls,
        vec![
            label_url(&server, "a1"),
            label_url(&server, "a2"),
            label_url(&server, "b1"),
            label_url(&server, "b2"),
        ]
    );
    assert_eq!(report.qualified[3].form, FormType::Capsule);
    assert!(report.disqualified.is_empty());
}

#[tokio::test]
async fn test_cream_disqualified_before_ingredient_analysis() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["cream"], None)).await;
    mount_label(
        &server,
        "cream",
        label_page("Hydrocortisone Cream 1%", &["cetyl alcohol", "water"], false),
    )
    .await;

    let backend = Arc::new(
        FakeBackend::new()
            .with_response(
                "determine the dosage form",
                r#"{"form_type": "other", "confidence": "high"}"#,
            )
            .with_response("extract the complete list", r#"["cetyl alcohol"]"#),
    );
    let shared: Arc<dyn AnalysisBackend> = backend.clone();

    let report = run_search(create_test_config(&server), Some(shared), "hydrocortisone")
        .await
        .unwrap();

    assert!(report.qualified.is_empty());
    assert_eq!(report.disqualified.len(), 1);
    assert_eq!(report.disqualified[0].reason, DisqualifyReason::BadForm);
    assert_eq!(backend.calls_containing("determine the dosage form"), 1);
    assert_eq!(backend.calls_containing("extract the complete list"), 0);
}

#[tokio::test]
async fn test_capsule_with_lactose_disqualified() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["cap"], None)).await;
    mount_label(
        &server,
        "cap",
        label_page(
            "Hydrocortisone Capsule 20mg",
            &["gelatin", "lactose monohydrate", "magnesium stearate"],
            false,
        ),
    )
    .await;

    let report = run_search(create_test_config(&server), None, "hydrocortisone")
        .await
        .unwrap();

    assert!(report.qualified.is_empty());
    let entry = &report.disqualified[0];
    assert_eq!(entry.reason, DisqualifyReason::AllergenPresent);
    assert_eq!(entry.detail, "lactose");
    assert_eq!(entry.title.as_deref(), Some("Hydrocortisone Capsule 20mg"));
}

#[tokio::test]
async fn test_oral_suspension_qualifies() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["susp"], None)).await;
    mount_label(
        &server,
        "susp",
        label_page(
            "Hydrocortisone Oral Suspension",
            &["purified water", "sucrose", "citric acid"],
            false,
        ),
    )
    .await;

    let report = run_search(create_test_config(&server), None, "hydrocortisone")
        .await
        .unwrap();

    assert_eq!(report.qualified.len(), 1);
    let result = &report.qualified[0];
    assert_eq!(result.title, "Hydrocortisone Oral Suspension");
    assert_eq!(result.form, FormType::Liquid);
    assert_eq!(
        result.ingredients,
        vec!["purified water", "sucrose", "citric acid"]
    );
    assert_eq!(report.stop_reason, StopReason::EndOfResults);
}

#[tokio::test]
async fn test_inactive_ndc_warning_disqualifies_clean_label() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["old"], None)).await;
    mount_label(
        &server,
        "old",
        label_page("Hydrocortisone Tablets USP", &["talc", "povidone"], true),
    )
    .await;

    let report = run_search(create_test_config(&server), None, "hydrocortisone")
        .await
        .unwrap();

    assert!(report.qualified.is_empty());
    assert_eq!(
        report.disqualified[0].reason,
        DisqualifyReason::InactiveNdcWarning
    );
}

#[tokio::test]
async fn test_missing_ingredient_section_disqualifies() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["bare"], None)).await;
    mount_label(
        &server,
        "bare",
        label_page("Hydrocortisone Tablets USP", &[], false),
    )
    .await;

    let report = run_search(create_test_config(&server), None, "hydrocortisone")
        .await
        .unwrap();

    assert!(report.qualified.is_empty());
    assert_eq!(
        report.disqualified[0].reason,
        DisqualifyReason::UnknownIngredients
    );
}

#[tokio::test]
async fn test_dedup_across_parameterizations() {
    let server = MockServer::start().await;

    let page1 = r#"<html><body>
        <a href="/dailymed/lookup.cfm?setid=abc&audience=consumer">Label</a>
        <a href="/dailymed/lookup.cfm?audience=professional&setid=ABC">Label again</a>
        <a href="lookup.cfm?setid=abc#section-3">Label section</a>
        <a href="search.cfm?query=x&page=2">2</a>
        </body></html>"#;
    mount_results_page(&server, 1, page1.to_string()).await;
    mount_results_page(&server, 2, results_page(&["ABC", "abc"], Some(3))).await;
    mount_label(
        &server,
        "abc",
        label_page("Hydrocortisone Tablets", &["talc"], false),
    )
    .await;

    let report = run_search(create_test_config(&server), None, "hydrocortisone")
        .await
        .unwrap();

    assert_eq!(report.candidates_found, 1);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.stop_reason, StopReason::NoNewEntries);
    assert_eq!(report.candidates_processed(), 1);
}

#[tokio::test]
async fn test_pagination_stops_at_page_bound() {
    let server = MockServer::start().await;

    for page in 1..=10 {
        let id = format!("p{page}");
        mount_results_page(&server, page, results_page(&[id.as_str()], Some(page + 1))).await;
    }
    Mock::given(method("GET"))
        .and(path("/dailymed/lookup.cfm"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(label_page("Hydrocortisone Tablets", &["talc"], false)),
        )
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.search.max_pages = 3;

    let report = run_search(config, None, "hydrocortisone").await.unwrap();

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.stop_reason, StopReason::PageLimit);
    assert_eq!(report.candidates_found, 3);
    assert_eq!(report.qualified.len(), 3);
}

#[tokio::test]
async fn test_label_fetch_retried_then_succeeds() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["flaky"], None)).await;
    Mock::given(method("GET"))
        .and(path("/dailymed/lookup.cfm"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_label(
        &server,
        "flaky",
        label_page("Hydrocortisone Tablets", &["talc"], false),
    )
    .await;

    let report = run_search(create_test_config(&server), None, "hydrocortisone")
        .await
        .unwrap();

    assert_eq!(report.qualified.len(), 1);
    let label_requests = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/dailymed/lookup.cfm")
        .count();
    assert_eq!(label_requests, 2);
}

#[tokio::test]
async fn test_label_fetch_failure_does_not_abort_run() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["down", "up"], None)).await;
    Mock::given(method("GET"))
        .and(path("/dailymed/lookup.cfm"))
        .and(query_param("setid", "down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_label(
        &server,
        "up",
        label_page("Hydrocortisone Tablets", &["talc"], false),
    )
    .await;

    let report = run_search(create_test_config(&server), None, "hydrocortisone")
        .await
        .unwrap();

    assert_eq!(report.disqualified.len(), 1);
    assert_eq!(report.disqualified[0].reason, DisqualifyReason::FetchFailure);
    assert_eq!(report.qualified.len(), 1);
    assert_eq!(report.qualified[0].url, label_url(&server, "up"));
}

#[tokio::test]
async fn test_initial_search_failure_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dailymed/search.cfm"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = run_search(create_test_config(&server), None, "hydrocortisone").await;
    assert!(matches!(result, Err(SieveError::SearchFailed(_))));
}

#[tokio::test]
async fn test_zero_results_is_not_an_error() {
    let server = MockServer::start().await;
    mount_results_page(&server, 1, results_page(&[], None)).await;

    let report = run_search(create_test_config(&server), None, "zzzz")
        .await
        .unwrap();

    assert_eq!(report.candidates_found, 0);
    assert!(report.qualified.is_empty());
    assert!(report.disqualified.is_empty());
}

#[tokio::test]
async fn test_backend_answers_used_when_available() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["ai"], None)).await;
    mount_label(
        &server,
        "ai",
        label_page("Hydrocortisone 10 mg", &["talc"], false),
    )
    .await;

    let backend = Arc::new(
        FakeBackend::new()
            .with_response(
                "determine the dosage form",
                r#"{"form_type": "tablet", "confidence": "high"}"#,
            )
            .with_response(
                "extract the complete list",
                r#"Here you go: ["Talc", "Povidone K30"]"#,
            ),
    );
    let shared: Arc<dyn AnalysisBackend> = backend.clone();

    let report = run_search(create_test_config(&server), Some(shared), "hydrocortisone")
        .await
        .unwrap();

    assert_eq!(report.qualified.len(), 1);
    assert_eq!(report.qualified[0].form, FormType::Tablet);
    assert_eq!(report.qualified[0].ingredients, vec!["Talc", "Povidone K30"]);
    assert!(report.primary_configured);
    assert!(!report.primary_degraded);
}

#[tokio::test]
async fn test_unusable_backend_answer_falls_back() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["x1", "x2"], None)).await;
    for id in ["x1", "x2"] {
        mount_label(
            &server,
            id,
            label_page("Hydrocortisone Tablets", &["talc"], false),
        )
        .await;
    }

    let backend = Arc::new(
        FakeBackend::new()
            .with_response("determine the dosage form", "It might be a pill of some kind")
            .with_response("extract the complete list", "no idea"),
    );
    let shared: Arc<dyn AnalysisBackend> = backend.clone();

    let mut config = create_test_config(&server);
    config.analysis.max_failures = 1;

    let report = run_search(config, Some(shared), "hydrocortisone")
        .await
        .unwrap();

    assert_eq!(report.qualified.len(), 2);
    assert_eq!(report.qualified[0].form, FormType::Tablet);
    // Unparseable answers never trip the gate, so both candidates asked
    assert_eq!(backend.calls_containing("determine the dosage form"), 2);
    assert!(!report.primary_degraded);
}

#[tokio::test]
async fn test_failing_backend_degrades_to_fallback() {
    let server = MockServer::start().await;

    mount_results_page(&server, 1, results_page(&["f1", "f2", "f3"], None)).await;
    for id in ["f1", "f2", "f3"] {
        mount_label(
            &server,
            id,
            label_page("Hydrocortisone Tablets", &["talc"], false),
        )
        .await;
    }

    let backend = Arc::new(FakeBackend::failing());
    let shared: Arc<dyn AnalysisBackend> = backend.clone();

    let mut config = create_test_config(&server);
    config.analysis.max_failures = 2;

    let report = run_search(config, Some(shared), "hydrocortisone")
        .await
        .unwrap();

    assert_eq!(report.qualified.len(), 3);
    assert!(report.primary_configured);
    assert!(report.primary_degraded);
    assert_eq!(backend.calls().len(), 2);
}

#[tokio::test]
async fn test_report_written_to_default_path() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_results_page(&server, 1, results_page(&["susp", "cream"], None)).await;
    mount_label(
        &server,
        "susp",
        label_page("Hydrocortisone Oral Suspension", &["purified water"], false),
    )
    .await;
    mount_label(
        &server,
        "cream",
        label_page("Hydrocortisone Cream 1%", &["water"], false),
    )
    .await;

    let mut config = create_test_config(&server);
    config.output.directory = dir.path().display().to_string();
    let output_path = default_output_path("hydrocortisone oral", dir.path());

    let coordinator = Coordinator::new(config, None)
        .unwrap()
        .with_config_hash("deadbeef".to_string());
    let report = coordinator.run("hydrocortisone oral").await.unwrap();
    write_report(&report, &output_path).unwrap();

    assert!(output_path.ends_with("hydrocortisone_oral_results.md"));
    let markdown = std::fs::read_to_string(&output_path).unwrap();
    assert!(markdown.contains("# Search Results for: hydrocortisone oral"));
    assert!(markdown.contains("1. **Hydrocortisone Oral Suspension**"));
    assert!(markdown.contains("**Total: 1 qualified result(s)**"));
    assert!(markdown.contains("| Excluded dosage form | 1 |"));
    assert!(markdown.contains("- **Config Hash**: deadbeef"));
}
