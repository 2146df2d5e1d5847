//! Destinations for response bodies.

use async_trait::async_trait;
use bytes::Bytes;
use pacer_error::{PacerError, PacerErrorKind, PacerResult};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Consumes the body of a successful response.
#[async_trait]
pub trait ResponseSink: Send {
    /// Read the body of `response` into this sink.
    async fn consume(&mut self, response: reqwest::Response) -> PacerResult<()>;

    /// Take a body that was already buffered, as happens when an error
    /// handler accepts an unsuccessful response.
    async fn consume_buffered(&mut self, body: Bytes) -> PacerResult<()>;
}

/// Decodes the body as JSON into `T`.
///
/// An empty body decodes as JSON `null`, so `Json<Option<T>>` and `Json<()>`
/// accept `204 No Content`.
#[derive(Debug)]
pub struct Json<T> {
    value: Option<T>,
}

impl<T> Json<T> {
    /// An empty sink.
    pub fn new() -> Self {
        Self { value: None }
    }

    /// The decoded value, once consumed.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Take the decoded value out of the sink.
    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> ResponseSink for Json<T>
where
    T: DeserializeOwned + Send,
{
    async fn consume(&mut self, response: reqwest::Response) -> PacerResult<()> {
        let body = response.bytes().await?;
        self.consume_buffered(body).await
    }

    async fn consume_buffered(&mut self, body: Bytes) -> PacerResult<()> {
        let slice: &[u8] = if body.is_empty() { b"null" } else { &body };

        let value = serde_json::from_slice(slice).map_err(|e| {
            PacerError::new(PacerErrorKind::Decode(format!(
                "Failed to decode JSON response: {}",
                e
            )))
        })?;
        self.value = Some(value);
        Ok(())
    }
}

/// Streams the raw body into an async writer.
#[derive(Debug)]
pub struct Writer<W> {
    inner: W,
    written: u64,
}

impl<W> Writer<W> {
    /// Stream into `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W> ResponseSink for Writer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn consume(&mut self, mut response: reqwest::Response) -> PacerResult<()> {
        while let Some(chunk) = response.chunk().await? {
            self.inner.write_all(&chunk).await.map_err(io_error)?;
            self.written += chunk.len() as u64;
        }
        self.inner.flush().await.map_err(io_error)?;

        debug!(bytes = self.written, "Streamed response body");
        Ok(())
    }

    async fn consume_buffered(&mut self, body: Bytes) -> PacerResult<()> {
        self.inner.write_all(&body).await.map_err(io_error)?;
        self.inner.flush().await.map_err(io_error)?;
        self.written += body.len() as u64;
        Ok(())
    }
}

/// Reads and drops the body.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

#[async_trait]
impl ResponseSink for Discard {
    async fn consume(&mut self, mut response: reqwest::Response) -> PacerResult<()> {
        while response.chunk().await?.is_some() {}
        Ok(())
    }

    async fn consume_buffered(&mut self, _body: Bytes) -> PacerResult<()> {
        Ok(())
    }
}

#[track_caller]
fn io_error(err: std::io::Error) -> PacerError {
    PacerError::new(PacerErrorKind::Decode(format!(
        "Failed to write response body: {}",
        err
    )))
}
