//! Authenticated Sentinel Hub session.

use tracing::debug;

use super::auth::{Credentials, TokenProvider};
use super::http::HttpClient;
use super::types::{HttpResponse, ProviderError};

/// Sentinel Hub API root.
pub const DEFAULT_BASE_URL: &str = "https://services.sentinel-hub.com";

/// HTTP client plus token cache, shared by the catalog and process clients.
pub struct SentinelHubSession<H> {
    http: H,
    base_url: String,
    tokens: TokenProvider,
}

impl<H: HttpClient> SentinelHubSession<H> {
    pub fn new(http: H, credentials: Credentials) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            tokens: TokenProvider::new(credentials),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.tokens = self.tokens.with_auth_url(auth_url);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &H {
        &self.http
    }

    /// POSTs `body` to `path` under the base URL with a bearer token.
    ///
    /// A 401 response drops the cached token and retries once.
    pub fn post_json(&self, path: &str, body: &str) -> Result<HttpResponse, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.tokens.token(&self.http)?;
        let response = self.http.post_json(&url, Some(&token), body)?;
        if response.status != 401 {
            return Ok(response);
        }

        debug!(url = %url, "Access token rejected, re-authenticating");
        self.tokens.invalidate();
        let token = self.tokens.token(&self.http)?;
        self.http.post_json(&url, Some(&token), body)
    }
}
