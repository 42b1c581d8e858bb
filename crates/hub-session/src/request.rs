//! Request descriptions and the REST transport.

use std::time::Duration;

use bytes::Bytes;
use hub_core::RefreshResponse;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::{ApiError, ApiResult, REFRESH_PATH};

/// Longest response body copied into an error message.
const MAX_ERROR_BODY: usize = 512;

/// An outbound API call, replayable after a credential refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API origin, e.g. `/notifications`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    retry: bool,
}

impl ApiRequest {
    /// Create a request.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retry: false,
        }
    }

    /// GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PATCH request.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether this request is the single replay after a refresh.
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        self.retry
    }

    pub(crate) fn into_retry(mut self) -> Self {
        self.retry = true;
        self
    }
}

/// A raw API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Whether the server rejected the credential.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED.as_u16()
    }

    /// Turn a non-success status into [`ApiError::Status`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] for any non-2xx response.
    pub fn into_result(self) -> ApiResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let text = String::from_utf8_lossy(&self.body);
        let message = if text.trim().is_empty() {
            StatusCode::from_u16(self.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("unknown status")
                .to_string()
        } else {
            text.chars().take(MAX_ERROR_BODY).collect()
        };
        Err(ApiError::Status {
            status: self.status,
            message,
        })
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// reqwest-backed transport bound to one API origin.
///
/// The client keeps a cookie store so the refresh endpoint can authenticate
/// with the session cookie.
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl RestTransport {
    /// Build a transport for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Use an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// The API origin.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send one request with an optional bearer credential.
    ///
    /// Any HTTP status is returned as a response; only transport failures
    /// are errors.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] on connection or body-read failure.
    pub async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> ApiResult<ApiResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url_for(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!(
            method = %request.method,
            path = %request.path,
            status,
            retry = request.is_retry(),
            "API response"
        );
        Ok(ApiResponse { status, body })
    }

    /// Exchange the session cookie for a new access credential.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] when the server refuses and
    /// [`ApiError::Decode`] when the body lacks `accessToken`.
    pub async fn refresh(&self) -> ApiResult<String> {
        let response = self.send(&ApiRequest::post(REFRESH_PATH), None).await?;
        let refreshed: RefreshResponse = response.into_result()?.json()?;
        if refreshed.access_token.is_empty() {
            return Err(ApiError::Decode("empty accessToken".into()));
        }
        Ok(refreshed.access_token)
    }
}
