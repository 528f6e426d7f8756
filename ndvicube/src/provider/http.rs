//! HTTP client abstraction for testability

use std::time::Duration;

use super::types::{HttpResponse, ProviderError};

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// POSTs a JSON body, optionally with a bearer token.
    fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &str,
    ) -> Result<HttpResponse, ProviderError>;

    /// POSTs an `application/x-www-form-urlencoded` body.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, ProviderError>;
}

impl<T: HttpClient + ?Sized> HttpClient for &T {
    fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &str,
    ) -> Result<HttpResponse, ProviderError> {
        (**self).post_json(url, bearer, body)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, ProviderError> {
        (**self).post_form(url, form)
    }
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Default request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("ndvicube/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ProviderError::HttpError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    fn finish(
        response: reqwest::Result<reqwest::blocking::Response>,
        url: &str,
    ) -> Result<HttpResponse, ProviderError> {
        let response = response
            .map_err(|e| ProviderError::HttpError(format!("Request to {} failed: {}", url, e)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| ProviderError::HttpError(format!("Failed to read response: {}", e)))?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

impl HttpClient for ReqwestClient {
    fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &str,
    ) -> Result<HttpResponse, ProviderError> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        Self::finish(request.send(), url)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, ProviderError> {
        Self::finish(self.client.post(url).form(form).send(), url)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A request seen by [`MockHttpClient`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub url: String,
        pub bearer: Option<String>,
        pub body: String,
    }

    /// Mock HTTP client replaying queued responses in order.
    ///
    /// When the queue runs dry the fallback response is returned.
    pub struct MockHttpClient {
        pub responses: Mutex<VecDeque<Result<HttpResponse, ProviderError>>>,
        pub fallback: Result<HttpResponse, ProviderError>,
        pub requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockHttpClient {
        pub fn new(fallback: Result<HttpResponse, ProviderError>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                fallback,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn then(self, response: Result<HttpResponse, ProviderError>) -> Self {
            self.responses.lock().push_back(response);
            self
        }

        fn next(&self) -> Result<HttpResponse, ProviderError> {
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    impl HttpClient for MockHttpClient {
        fn post_json(
            &self,
            url: &str,
            bearer: Option<&str>,
            body: &str,
        ) -> Result<HttpResponse, ProviderError> {
            self.requests.lock().push(RecordedRequest {
                url: url.to_string(),
                bearer: bearer.map(str::to_string),
                body: body.to_string(),
            });
            self.next()
        }

        fn post_form(
            &self,
            url: &str,
            form: &[(&str, &str)],
        ) -> Result<HttpResponse, ProviderError> {
            let body = form
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            self.requests.lock().push(RecordedRequest {
                url: url.to_string(),
                bearer: None,
                body,
            });
            self.next()
        }
    }

    #[test]
    fn test_mock_client_replays_in_order() {
        let mock = MockHttpClient::new(Ok(HttpResponse::new(404, "")))
            .then(Ok(HttpResponse::new(200, "first")));

        let first = mock.post_json("http://example.com", None, "{}").unwrap();
        assert_eq!(first.body, b"first");
        let second = mock.post_json("http://example.com", None, "{}").unwrap();
        assert_eq!(second.status, 404);
        assert_eq!(mock.requests.lock().len(), 2);
    }

    #[test]
    fn test_mock_client_error() {
        let mock = MockHttpClient::new(Err(ProviderError::HttpError("Test error".to_string())));
        assert!(mock.post_form("http://example.com", &[]).is_err());
    }
}
