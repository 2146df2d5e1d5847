//! Snapshot of a received HTTP response.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

/// A response received from the API.
///
/// Returned from a successful dispatch and attached to status and decode
/// errors so the caller can still inspect what the server sent. The body is
/// buffered for error responses and empty when a sink already consumed it.
///
/// # Examples
///
/// ```
/// use pacer_error::ApiResponse;
/// use reqwest::{StatusCode, Url, header::HeaderMap};
///
/// let response = ApiResponse::new(
///     StatusCode::NOT_FOUND,
///     HeaderMap::new(),
///     Url::parse("https://api.example.com/users/7").unwrap(),
///     "no such user",
/// );
/// assert_eq!(response.text(), "no such user");
/// ```
#[derive(Debug, Clone, PartialEq, derive_getters::Getters)]
pub struct ApiResponse {
    /// Status code of the final attempt
    status: StatusCode,
    /// Response headers
    headers: HeaderMap,
    /// Final URL of the exchange
    url: Url,
    /// Buffered body, empty once streamed into a sink
    body: Bytes,
}

impl ApiResponse {
    /// Create a response snapshot.
    pub fn new(status: StatusCode, headers: HeaderMap, url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            url,
            body: body.into(),
        }
    }

    /// Capture status, headers and URL of a live response without its body.
    pub fn from_head(response: &reqwest::Response) -> Self {
        Self::new(
            response.status(),
            response.headers().clone(),
            response.url().clone(),
            Bytes::new(),
        )
    }

    /// Replace the buffered body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the buffered body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Header value as a string, if present and valid ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}
