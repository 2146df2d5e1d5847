//! Request construction.

use bytes::Bytes;
use pacer_error::{PacerError, PacerErrorKind, PacerResult};
use pacer_rate_limit::CallContext;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Content type sent with JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type sent when the payload travels in the query string.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Characters escaped when a value is substituted into a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

/// A fully built request, ready for dispatch.
///
/// Requests are cheap to clone and are re-materialized for every retry
/// attempt, so the body is kept as [`Bytes`].
#[derive(Debug, Clone, derive_getters::Getters)]
pub struct ApiRequest {
    /// HTTP method
    method: Method,
    /// Absolute URL including any query string
    url: Url,
    /// Request headers
    headers: HeaderMap,
    /// Encoded body, if any
    body: Option<Bytes>,
    /// Cancellation signal for the whole call
    context: CallContext,
}

impl ApiRequest {
    /// Assemble a request from its parts.
    pub fn new(method: Method, url: Url, context: CallContext) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            context,
        }
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Materialize a `reqwest::Request` for one attempt.
    pub fn to_reqwest(&self) -> reqwest::Request {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        if let Some(body) = &self.body {
            *request.body_mut() = Some(reqwest::Body::from(body.clone()));
        }
        request
    }
}

/// Whether `method` carries its payload as a JSON body.
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Normalize a base address into an absolute URL ending in `/`.
///
/// A bare host gets the `https` scheme.
///
/// # Errors
///
/// Returns a `Configuration` error if the result is not a valid URL.
pub fn normalize_base_url(base: &str) -> PacerResult<Url> {
    let mut normalized = if base.contains("://") {
        base.to_string()
    } else {
        format!("https://{}", base)
    };
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    Url::parse(&normalized).map_err(|e| {
        PacerError::new(PacerErrorKind::Configuration(format!(
            "Invalid base URL {:?}: {}",
            base, e
        )))
    })
}

/// Build a request for `path` relative to `base`.
///
/// Escapes already present in `path` are kept as-is, so `a%2Fb` stays one
/// segment. POST, PUT and PATCH send `payload` as JSON; every other method
/// sends it as URL-encoded query parameters.
///
/// # Errors
///
/// Returns an `Encoding` error if `path` cannot be unescaped or `payload`
/// cannot be serialized.
#[instrument(
    skip(base, ctx, method, payload),
    fields(http.method = %method, http.url = tracing::field::Empty)
)]
pub fn build_request<T>(
    base: &Url,
    ctx: &CallContext,
    method: Method,
    path: &str,
    payload: Option<&T>,
) -> PacerResult<ApiRequest>
where
    T: Serialize + ?Sized,
{
    check_escapes(path)?;

    let mut url = base.clone();
    let relative = path.strip_prefix('/').unwrap_or(path);
    url.set_path(&format!("{}{}", base.path(), relative));

    let mut headers = HeaderMap::new();
    let mut body = None;

    if carries_body(&method) {
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

        if let Some(payload) = payload {
            let encoded = serde_json::to_vec(payload).map_err(|e| {
                PacerError::new(PacerErrorKind::Encoding(format!(
                    "Failed to encode JSON body: {}",
                    e
                )))
            })?;
            body = Some(Bytes::from(encoded));
        }
    } else if let Some(payload) = payload {
        let query = serde_urlencoded::to_string(payload).map_err(|e| {
            PacerError::new(PacerErrorKind::Encoding(format!(
                "Failed to encode query parameters: {}",
                e
            )))
        })?;
        if !query.is_empty() {
            url.set_query(Some(&query));
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
    }

    tracing::Span::current().record("http.url", url.as_str());
    debug!(has_body = body.is_some(), "Built request");

    Ok(ApiRequest {
        method,
        url,
        headers,
        body,
        context: ctx.clone(),
    })
}

/// Every `%` must start a two-digit hex escape. The escaped bytes need not
/// be UTF-8.
fn check_escapes(path: &str) -> PacerResult<()> {
    for (index, _) in path.match_indices('%') {
        let escape = path.as_bytes().get(index + 1..index + 3);
        if !escape.is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit)) {
            return Err(PacerError::new(PacerErrorKind::Encoding(format!(
                "Cannot unescape path {:?}: invalid escape at byte {}",
                path, index
            ))));
        }
    }
    Ok(())
}

/// A path with `{name}` placeholders, such as `users/{id}/posts`.
///
/// # Examples
///
/// ```
/// use pacer::PathTemplate;
///
/// let template = PathTemplate::new("users/{id}/files/{name}");
/// let path = template.expand(&[("id", "7"), ("name", "a b/c")]).unwrap();
/// assert_eq!(path, "users/7/files/a%20b%2Fc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    template: String,
}

impl PathTemplate {
    /// Wrap a template string.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The raw template.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Names of the placeholders, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    names.push(&after[..end]);
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
        names
    }

    /// Substitute every placeholder with its percent-escaped value.
    ///
    /// # Errors
    ///
    /// Returns an `Encoding` error if a placeholder has no value or a brace
    /// is left unclosed.
    pub fn expand(&self, params: &[(&str, &str)]) -> PacerResult<String> {
        let values: HashMap<&str, &str> = params.iter().copied().collect();
        let mut expanded = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            expanded.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                PacerError::new(PacerErrorKind::Encoding(format!(
                    "Unclosed placeholder in path template {:?}",
                    self.template
                )))
            })?;

            let name = &after[..end];
            let value = values.get(name).ok_or_else(|| {
                PacerError::new(PacerErrorKind::Encoding(format!(
                    "Missing value for path parameter {:?}",
                    name
                )))
            })?;
            expanded.extend(utf8_percent_encode(value, PATH_SEGMENT));
            rest = &after[end + 1..];
        }
        expanded.push_str(rest);

        Ok(expanded)
    }
}

impl From<&str> for PathTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}
