//! qBittorrent client and health probing against mock Web API servers.

mod support;

use seedwarden_core::daemon::{
    AddTorrent, ClientError, DaemonApi, HttpTimeouts, Instance, InstanceDescriptor, InstanceRole,
    QbitClient, TorrentFilter,
};
use seedwarden_core::{HealthProber, HealthState};
use support::qbit::{self, LOGIN, VERSION};
use support::socket_guard::start_mock_server_or_skip;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn instance(descriptor: InstanceDescriptor) -> Instance {
    Instance::qbittorrent(descriptor, HttpTimeouts::default())
}

#[tokio::test]
async fn test_health_ok_after_handshake() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    qbit::login_ok().expect(1).mount(&server).await;
    Mock::given(method("GET"))
        .and(path(VERSION))
        .and(header("cookie", "SID=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("v4.6.2"))
        .mount(&server)
        .await;

    let target = instance(qbit::descriptor(&server, "primary", InstanceRole::Primary));
    let status = HealthProber::new().check(&target).await;

    assert_eq!(status.state, HealthState::Ok);
    assert_eq!(status.version.as_deref(), Some("v4.6.2"));
}

#[tokio::test]
async fn test_health_bad_credentials_is_auth_failed() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    qbit::login_fails().mount(&server).await;
    qbit::version_ok().expect(0).mount(&server).await;

    let target = instance(qbit::descriptor(&server, "primary", InstanceRole::Primary));
    let status = HealthProber::new().check(&target).await;

    assert_eq!(status.state, HealthState::AuthFailed);
}

#[tokio::test]
async fn test_health_banned_ip_is_auth_failed() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let target = instance(qbit::descriptor(&server, "primary", InstanceRole::Primary));
    let status = HealthProber::new().check(&target).await;

    assert_eq!(status.state, HealthState::AuthFailed);
    assert!(status.detail.unwrap().contains("banned"));
}

#[tokio::test]
async fn test_health_status_forbidden_twice_reauths_once_then_unreachable() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    // one handshake from the probe, one from the 403 retry
    qbit::login_ok().expect(2).mount(&server).await;
    Mock::given(method("GET"))
        .and(path(VERSION))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let target = instance(qbit::descriptor(&server, "primary", InstanceRole::Primary));
    let status = HealthProber::new().check(&target).await;

    assert_eq!(status.state, HealthState::Unreachable);
}

#[tokio::test]
async fn test_health_without_credentials_skips_handshake() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    qbit::login_ok().expect(0).mount(&server).await;
    qbit::version_ok().mount(&server).await;

    let descriptor = InstanceDescriptor::new(
        "local",
        Url::parse(&server.uri()).unwrap(),
        InstanceRole::Primary,
    );
    let status = HealthProber::new().check(&instance(descriptor)).await;

    assert_eq!(status.state, HealthState::Ok);
}

#[tokio::test]
async fn test_health_connection_refused_is_unreachable() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let descriptor = qbit::descriptor(&server, "primary", InstanceRole::Primary);
    drop(server);

    let status = HealthProber::new().check(&instance(descriptor)).await;

    assert!(matches!(
        status.state,
        HealthState::Unreachable | HealthState::Timeout
    ));
}

#[tokio::test]
async fn test_add_sends_form_and_rejects_fails_body() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    qbit::login_ok().mount(&server).await;
    Mock::given(method("POST"))
        .and(path(qbit::ADD))
        .and(body_string_contains("category=books"))
        .and(body_string_contains("savepath=%2Fdata%2Fbooks"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
        .mount(&server)
        .await;

    let client = QbitClient::new(
        &qbit::descriptor(&server, "primary", InstanceRole::Primary),
        HttpTimeouts::default(),
    )
    .unwrap();
    client.login().await.unwrap();
    let result = client
        .add(&AddTorrent {
            payload: "magnet:?xt=urn:btih:abc",
            category: Some("books"),
            save_path: Some("/data/books"),
        })
        .await;

    assert!(matches!(result, Err(ClientError::Rejected { .. })));
}

#[tokio::test]
async fn test_list_passes_filter_and_decodes_torrents() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    qbit::login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/torrents/info"))
        .and(query_param("filter", "downloading"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "hash": "aaa",
                "name": "Some Book",
                "progress": 0.42,
                "state": "downloading",
                "uploaded": 1024,
                "downloaded": 2048,
                "upspeed": 10,
                "dlspeed": 500,
                "category": "books"
            }
        ])))
        .mount(&server)
        .await;

    let client = QbitClient::new(
        &qbit::descriptor(&server, "primary", InstanceRole::Primary),
        HttpTimeouts::default(),
    )
    .unwrap();
    client.login().await.unwrap();
    let torrents = client.list(TorrentFilter::Downloading).await.unwrap();

    assert_eq!(torrents.len(), 1);
    assert_eq!(torrents[0].hash, "aaa");
    assert!(!torrents[0].is_complete());
}

#[tokio::test]
async fn test_pause_falls_back_to_v5_stop_endpoint() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    qbit::login_ok().mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v2/torrents/pause"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/torrents/stop"))
        .and(body_string_contains("hashes=aaa"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = QbitClient::new(
        &qbit::descriptor(&server, "primary", InstanceRole::Primary),
        HttpTimeouts::default(),
    )
    .unwrap();
    client.login().await.unwrap();

    client.pause("aaa").await.unwrap();
}

#[tokio::test]
async fn test_transfer_info_decodes_rates() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    qbit::login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/transfer/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "up_info_speed": 2048,
            "dl_info_speed": 512,
            "up_info_data": 10,
            "dl_info_data": 20,
            "connection_status": "connected"
        })))
        .mount(&server)
        .await;

    let client = QbitClient::new(
        &qbit::descriptor(&server, "primary", InstanceRole::Primary),
        HttpTimeouts::default(),
    )
    .unwrap();
    client.login().await.unwrap();
    let transfer = client.transfer_info().await.unwrap();

    assert_eq!(transfer.upload_rate, 2048);
    assert_eq!(transfer.download_rate, 512);
}
