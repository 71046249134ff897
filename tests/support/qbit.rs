//! Canned qBittorrent Web API responses for wiremock servers.

use seedwarden_core::daemon::{Credentials, InstanceDescriptor, InstanceRole};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LOGIN: &str = "/api/v2/auth/login";
pub const VERSION: &str = "/api/v2/app/version";
pub const ADD: &str = "/api/v2/torrents/add";

pub fn descriptor(server: &MockServer, name: &str, role: InstanceRole) -> InstanceDescriptor {
    let url = Url::parse(&server.uri()).unwrap();
    InstanceDescriptor::new(name, url, role).with_credentials(Credentials::new("admin", "secret"))
}

/// Successful handshake that sets the session cookie.
pub fn login_ok() -> Mock {
    Mock::given(method("POST")).and(path(LOGIN)).respond_with(
        ResponseTemplate::new(200)
            .insert_header("set-cookie", "SID=abc123; HttpOnly; path=/")
            .set_body_string("Ok."),
    )
}

/// Handshake rejected for bad credentials.
pub fn login_fails() -> Mock {
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
}

pub fn version_ok() -> Mock {
    Mock::given(method("GET"))
        .and(path(VERSION))
        .respond_with(ResponseTemplate::new(200).set_body_string("v4.6.2"))
}

pub fn add_ok() -> Mock {
    Mock::given(method("POST"))
        .and(path(ADD))
        .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
}

/// Mounts a fully healthy instance that accepts adds.
pub async fn mount_healthy(server: &MockServer) {
    login_ok().mount(server).await;
    version_ok().mount(server).await;
    add_ok().mount(server).await;
}
