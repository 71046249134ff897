//! Where ratio pages come from.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::cookie::Jar;
use reqwest::header::REFERER;
use tracing::{debug, instrument};
use url::Url;

use super::RatioError;
use crate::daemon::{Credentials, HttpTimeouts, build_http_client};

/// Supplies the raw text of the account status page.
#[async_trait]
pub trait RatioSource: Send + Sync {
    /// Fetches the page, logging in first when required.
    async fn fetch_page(&self) -> Result<String, RatioError>;
}

/// Form login for the status page's site.
#[derive(Debug, Clone)]
pub struct PageLogin {
    /// Form action URL.
    pub url: Url,
    /// Name of the username form field.
    pub username_field: String,
    /// Name of the password form field.
    pub password_field: String,
    /// Account credentials.
    pub credentials: Credentials,
}

impl PageLogin {
    /// Creates a login using the usual `username`/`password` field names.
    #[must_use]
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            credentials,
        }
    }
}

/// Fetches the status page over HTTP with a private cookie session.
pub struct HttpRatioSource {
    page_url: Url,
    login: Option<PageLogin>,
    http: Client,
}

impl HttpRatioSource {
    /// Creates a source for `page_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError::Build`] when the HTTP client cannot be built.
    pub fn new(
        page_url: Url,
        login: Option<PageLogin>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, RatioError> {
        let http = build_http_client(timeouts, Arc::new(Jar::default()))
            .map_err(|error| RatioError::Build(error.to_string()))?;
        Ok(Self {
            page_url,
            login,
            http,
        })
    }

    async fn get_page(&self) -> Result<String, RatioError> {
        let url = self.page_url.as_str();
        let response = self
            .http
            .get(self.page_url.clone())
            .send()
            .await
            .map_err(|error| RatioError::from_send(url, error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RatioError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|error| RatioError::from_send(url, error))
    }

    async fn log_in(&self, login: &PageLogin) -> Result<(), RatioError> {
        let url = login.url.as_str();
        let form = [
            (login.username_field.as_str(), login.credentials.username.as_str()),
            (login.password_field.as_str(), login.credentials.password()),
        ];
        let response = self
            .http
            .post(login.url.clone())
            .header(REFERER, self.page_url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|error| RatioError::from_send(url, error))?;
        let status = response.status();
        // Sites often answer a good login with a redirect that reqwest follows;
        // a 4xx/5xx is the only signal worth surfacing here.
        if status.is_client_error() || status.is_server_error() {
            return Err(RatioError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!("Ratio site login submitted");
        Ok(())
    }
}

#[async_trait]
impl RatioSource for HttpRatioSource {
    #[instrument(skip(self), fields(url = %self.page_url))]
    async fn fetch_page(&self) -> Result<String, RatioError> {
        let page = self.get_page().await?;
        if !looks_like_login_form(&page) {
            return Ok(page);
        }

        let Some(login) = &self.login else {
            return Err(RatioError::LoginRequired {
                url: self.page_url.to_string(),
            });
        };
        debug!("Status page shows a login form; logging in");
        self.log_in(login).await?;

        let page = self.get_page().await?;
        if looks_like_login_form(&page) {
            return Err(RatioError::LoginRequired {
                url: self.page_url.to_string(),
            });
        }
        Ok(page)
    }
}

impl fmt::Debug for HttpRatioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRatioSource")
            .field("page_url", &self.page_url.as_str())
            .field("login", &self.login.as_ref().map(|login| login.url.as_str()))
            .finish_non_exhaustive()
    }
}

fn looks_like_login_form(page: &str) -> bool {
    let lower = page.to_ascii_lowercase();
    lower.contains("<form") && lower.contains("type=\"password\"")
}
