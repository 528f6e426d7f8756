//! OAuth2 client-credentials authentication.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use super::http::HttpClient;
use super::types::ProviderError;

/// Sentinel Hub token endpoint.
pub const DEFAULT_AUTH_URL: &str =
    "https://services.sentinel-hub.com/auth/realms/main/protocol/openid-connect/token";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// OAuth2 client credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.client_id.is_empty() || self.client_secret.is_empty()
    }
}

// Keep the secret out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Fetches and caches access tokens.
pub struct TokenProvider {
    auth_url: String,
    credentials: Credentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            credentials,
            cached: Mutex::new(None),
        }
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    /// Returns a valid access token, requesting a new one when the cached
    /// token is missing or about to expire.
    pub fn token<H: HttpClient + ?Sized>(&self, http: &H) -> Result<String, ProviderError> {
        let mut cached = self.cached.lock();
        if let Some(token) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        if self.credentials.is_empty() {
            return Err(ProviderError::AuthError(
                "client id and secret are not configured".to_string(),
            ));
        }

        debug!(url = %self.auth_url, "Requesting access token");
        let response = http.post_form(
            &self.auth_url,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ],
        )?;
        if !response.is_success() {
            return Err(ProviderError::AuthError(format!(
                "token endpoint returned HTTP {}: {}",
                response.status,
                response.body_excerpt()
            )));
        }

        let parsed: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| ProviderError::InvalidResponse(format!("token response: {}", e)))?;
        let value = parsed.access_token.clone();
        *cached = Some(CachedToken {
            value: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        });
        Ok(value)
    }

    /// Drops the cached token so the next call requests a new one.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }
}
