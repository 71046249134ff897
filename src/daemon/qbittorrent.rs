//! qBittorrent Web API v2 client.
//!
//! Sessions are cookie based: a successful `auth/login` sets `SID` in the
//! client's private jar and every later call carries it. A 403 on an
//! authenticated call triggers one fresh handshake and one retry.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::REFERER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::http::{HttpTimeouts, build_http_client};
use super::{
    AddTorrent, ClientError, Credentials, DaemonApi, InstanceDescriptor, TorrentFilter,
    TorrentInfo, TransferInfo,
};

const LOGIN_PATH: &str = "api/v2/auth/login";
const VERSION_PATH: &str = "api/v2/app/version";
const ADD_PATH: &str = "api/v2/torrents/add";
const INFO_PATH: &str = "api/v2/torrents/info";
const TRANSFER_PATH: &str = "api/v2/transfer/info";

// v4 names first; qBittorrent 5 renamed them to stop/start and answers 404
// for the old paths.
const PAUSE_PATHS: (&str, &str) = ("api/v2/torrents/pause", "api/v2/torrents/stop");
const RESUME_PATHS: (&str, &str) = ("api/v2/torrents/resume", "api/v2/torrents/start");

const OK_BODY: &str = "Ok.";
const FAILS_BODY: &str = "Fails.";

/// HTTP client for one qBittorrent instance.
pub struct QbitClient {
    instance: String,
    base_url: Url,
    credentials: Option<Credentials>,
    http: Client,
}

impl QbitClient {
    /// Creates a client for a configured descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConfigured`] when the descriptor has no URL and
    /// [`ClientError::Build`] when the HTTP client cannot be constructed.
    pub fn new(descriptor: &InstanceDescriptor, timeouts: HttpTimeouts) -> Result<Self, ClientError> {
        let Some(base_url) = descriptor.base_url.clone() else {
            return Err(ClientError::NotConfigured {
                instance: descriptor.name.clone(),
            });
        };

        let http = build_http_client(timeouts, Arc::new(Jar::default())).map_err(|error| {
            ClientError::Build {
                instance: descriptor.name.clone(),
                detail: error.to_string(),
            }
        })?;

        Ok(Self {
            instance: descriptor.name.clone(),
            base_url: with_trailing_slash(base_url),
            credentials: descriptor.credentials.clone(),
            http,
        })
    }

    /// Returns the normalised API root.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url.join(path).map_err(|error| ClientError::Build {
            instance: self.instance.clone(),
            detail: format!("invalid endpoint {path}: {error}"),
        })
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, ClientError> {
        request
            .send()
            .await
            .map_err(|error| ClientError::from_send(&self.instance, url.as_str(), error))
    }

    fn check_status(&self, response: Response, url: &Url) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ClientError::http_status(
                &self.instance,
                url.as_str(),
                status.as_u16(),
            ))
        }
    }

    /// Sends an authenticated request, re-authenticating once on 403.
    async fn send_authed<F>(&self, url: &Url, build: F) -> Result<Response, ClientError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let response = self.send(build(), url).await?;
        if response.status() != StatusCode::FORBIDDEN {
            return self.check_status(response, url);
        }

        debug!(instance = %self.instance, url = %url, "403 on authenticated call; re-authenticating");
        self.login().await?;

        let response = self.send(build(), url).await?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(ClientError::Forbidden {
                instance: self.instance.clone(),
                url: url.to_string(),
            });
        }
        self.check_status(response, url)
    }

    async fn text_body(&self, response: Response, url: &Url) -> Result<String, ClientError> {
        response.text().await.map_err(|source| ClientError::Decode {
            instance: self.instance.clone(),
            url: url.to_string(),
            source,
        })
    }

    async fn post_hashes(&self, path: &str, hash: &str) -> Result<(), ClientError> {
        let url = self.endpoint(path)?;
        let form = [("hashes", hash)];
        self.send_authed(&url, || self.http.post(url.clone()).form(&form))
            .await
            .map(|_| ())
    }

    async fn torrent_action(&self, paths: (&str, &str), hash: &str) -> Result<(), ClientError> {
        match self.post_hashes(paths.0, hash).await {
            Err(ClientError::HttpStatus { status: 404, .. }) => {
                debug!(instance = %self.instance, path = paths.1, "Falling back to v5 endpoint");
                self.post_hashes(paths.1, hash).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl DaemonApi for QbitClient {
    #[instrument(skip(self), fields(instance = %self.instance))]
    async fn login(&self) -> Result<(), ClientError> {
        let Some(credentials) = &self.credentials else {
            debug!("No credentials configured; skipping handshake");
            return Ok(());
        };

        let url = self.endpoint(LOGIN_PATH)?;
        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password()),
        ];
        // The WebUI rejects logins whose Referer/Origin does not match its host.
        let request = self
            .http
            .post(url.clone())
            .header(REFERER, self.base_url.as_str())
            .form(&form);
        let response = self.send(request, &url).await?;

        if response.status() == StatusCode::FORBIDDEN {
            return Err(ClientError::auth_rejected(
                &self.instance,
                "client IP is banned after repeated failed logins (HTTP 403)",
            ));
        }
        let response = self.check_status(response, &url)?;
        let body = self.text_body(response, &url).await?;

        if body.trim() == OK_BODY {
            debug!("Authenticated");
            Ok(())
        } else {
            Err(ClientError::auth_rejected(&self.instance, body.trim()))
        }
    }

    #[instrument(skip(self), fields(instance = %self.instance))]
    async fn version(&self) -> Result<String, ClientError> {
        let url = self.endpoint(VERSION_PATH)?;
        let response = self
            .send_authed(&url, || self.http.get(url.clone()))
            .await?;
        let body = self.text_body(response, &url).await?;
        Ok(body.trim().to_string())
    }

    #[instrument(skip(self, torrent), fields(instance = %self.instance))]
    async fn add(&self, torrent: &AddTorrent<'_>) -> Result<(), ClientError> {
        let url = self.endpoint(ADD_PATH)?;
        let mut form = vec![("urls", torrent.payload)];
        if let Some(category) = torrent.category {
            form.push(("category", category));
        }
        if let Some(save_path) = torrent.save_path {
            form.push(("savepath", save_path));
        }

        let response = self
            .send_authed(&url, || self.http.post(url.clone()).form(&form))
            .await?;
        let body = self.text_body(response, &url).await?;

        if body.trim() == FAILS_BODY {
            return Err(ClientError::Rejected {
                instance: self.instance.clone(),
                operation: "add",
                body: body.trim().to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(instance = %self.instance, filter = filter.as_str()))]
    async fn list(&self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, ClientError> {
        let url = self.endpoint(INFO_PATH)?;
        let query = [("filter", filter.as_str())];
        let response = self
            .send_authed(&url, || self.http.get(url.clone()).query(&query))
            .await?;
        response
            .json::<Vec<TorrentInfo>>()
            .await
            .map_err(|source| ClientError::Decode {
                instance: self.instance.clone(),
                url: url.to_string(),
                source,
            })
    }

    async fn pause(&self, hash: &str) -> Result<(), ClientError> {
        self.torrent_action(PAUSE_PATHS, hash).await
    }

    async fn resume(&self, hash: &str) -> Result<(), ClientError> {
        self.torrent_action(RESUME_PATHS, hash).await
    }

    #[instrument(skip(self), fields(instance = %self.instance))]
    async fn transfer_info(&self) -> Result<TransferInfo, ClientError> {
        let url = self.endpoint(TRANSFER_PATH)?;
        let response = self
            .send_authed(&url, || self.http.get(url.clone()))
            .await?;
        response
            .json::<TransferInfo>()
            .await
            .map_err(|source| ClientError::Decode {
                instance: self.instance.clone(),
                url: url.to_string(),
                source,
            })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::daemon::InstanceRole;

    #[test]
    fn test_with_trailing_slash_keeps_subpath() {
        let url = with_trailing_slash(Url::parse("http://nas.local:8080/qbt").unwrap());
        assert_eq!(url.as_str(), "http://nas.local:8080/qbt/");
        assert_eq!(
            url.join(LOGIN_PATH).unwrap().as_str(),
            "http://nas.local:8080/qbt/api/v2/auth/login"
        );
    }

    #[test]
    fn test_new_rejects_unconfigured_descriptor() {
        let descriptor = InstanceDescriptor::unconfigured("spare", InstanceRole::Secondary);
        let result = QbitClient::new(&descriptor, HttpTimeouts::default());
        assert!(matches!(result, Err(ClientError::NotConfigured { .. })));
    }

    #[test]
    fn test_new_normalises_base_url() {
        let descriptor = InstanceDescriptor::new(
            "primary",
            Url::parse("http://10.8.0.2:8080").unwrap(),
            InstanceRole::Primary,
        );
        let client = QbitClient::new(&descriptor, HttpTimeouts::default()).unwrap();
        assert_eq!(client.base_url().as_str(), "http://10.8.0.2:8080/");
    }
}
