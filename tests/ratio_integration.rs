//! Ratio page fetching with a form login, against a mock tracker site.

mod support;

use std::sync::Arc;

use seedwarden_core::daemon::{Credentials, HttpTimeouts};
use seedwarden_core::ratio::{
    HttpRatioSource, PageLogin, RatioError, RatioMonitor, RatioPageParser, RatioSource,
    SnapshotLog,
};
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_FORM: &str = r#"<html><body>
<form action="/login.php" method="post">
  <input type="text" name="username"><input type="password" name="password">
</form></body></html>"#;

const STATUS_PAGE: &str = r#"<html><body><table>
<tr><td>Uploaded:</td><td>1.50 TiB</td></tr>
<tr><td>Downloaded:</td><td>1.00 TiB</td></tr>
<tr><td>Ratio:</td><td><span class="r">1.500</span></td></tr>
</table></body></html>"#;

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/user.php"))
        .and(header("cookie", "session=tracker42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATUS_PAGE))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_FORM))
        .mount(server)
        .await;
}

fn login(server: &MockServer) -> PageLogin {
    PageLogin::new(
        Url::parse(&format!("{}/login.php", server.uri())).unwrap(),
        Credentials::new("reader", "hunter2"),
    )
}

fn page_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/user.php", server.uri())).unwrap()
}

#[tokio::test]
async fn test_fetch_logs_in_when_page_shows_login_form() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_site(&server).await;
    Mock::given(method("POST"))
        .and(path("/login.php"))
        .and(body_string_contains("username=reader"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "session=tracker42; path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source =
        HttpRatioSource::new(page_url(&server), Some(login(&server)), HttpTimeouts::default())
            .unwrap();

    let page = source.fetch_page().await.unwrap();
    assert!(page.contains("1.500"));

    // session cookie is reused; no second login
    let again = source.fetch_page().await.unwrap();
    assert!(again.contains("1.500"));
}

#[tokio::test]
async fn test_fetch_without_login_settings_reports_login_required() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_site(&server).await;

    let source = HttpRatioSource::new(page_url(&server), None, HttpTimeouts::default()).unwrap();

    let result = source.fetch_page().await;
    assert!(matches!(result, Err(RatioError::LoginRequired { .. })));
}

#[tokio::test]
async fn test_fetch_server_error_is_http_status() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/user.php"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let source = HttpRatioSource::new(page_url(&server), None, HttpTimeouts::default()).unwrap();

    let result = source.fetch_page().await;
    assert!(matches!(result, Err(RatioError::HttpStatus { status: 502, .. })));
}

#[tokio::test]
async fn test_monitor_samples_and_logs_snapshot() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_site(&server).await;
    Mock::given(method("POST"))
        .and(path("/login.php"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "session=tracker42; path=/"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("ratio.jsonl");
    let source =
        HttpRatioSource::new(page_url(&server), Some(login(&server)), HttpTimeouts::default())
            .unwrap();
    let monitor = RatioMonitor::new(Arc::new(source), RatioPageParser::standard().unwrap())
        .with_log(SnapshotLog::new(&log_path));

    let sample = monitor.sample().await;
    assert!(sample.is_fresh());
    let snapshot = sample.snapshot().unwrap();
    assert!((snapshot.ratio - 1.5).abs() < 1e-9);
    assert_eq!(snapshot.upload_bytes_total, 3 * (1_u64 << 40) / 2);

    let restarted = RatioMonitor::new(
        Arc::new(HttpRatioSource::new(page_url(&server), None, HttpTimeouts::default()).unwrap()),
        RatioPageParser::standard().unwrap(),
    )
    .with_log(SnapshotLog::new(&log_path));
    let restored = restarted.restore().await.unwrap().unwrap();
    assert!((restored.ratio - 1.5).abs() < 1e-9);
}
