//! HTTP transport used by the connection manager
//!
//! The manager only needs a long-lived GET that reports response text as it
//! arrives and can be cancelled. [`Transport`] captures that contract so the
//! reader can run over any HTTP client; [`ReqwestTransport`] is the default.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;

/// Progress callback receiving response text
pub type ProgressFn<'a> = dyn FnMut(&str) + Send + 'a;

/// How a transport hands response text to the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Every notification carries the whole body received so far.
    ///
    /// The reader subtracts the length it has already parsed to find the new
    /// text. This is what XHR-style clients report.
    #[default]
    Cumulative,
    /// Every notification carries only text that arrived since the last one.
    Incremental,
}

/// A single streaming request
#[derive(Debug, Clone)]
pub struct StreamRequest<'a> {
    /// Endpoint URL
    pub url: &'a str,
    /// Fires when the request must stop
    pub cancel: CancellationToken,
    /// Total request timeout; the reader always passes `None` (unbounded)
    pub timeout: Option<Duration>,
}

/// Long-lived text request with progress notifications
///
/// # Contract
///
/// - `fetch` resolves `Ok(())` once the response completes normally.
/// - Network, status and timeout failures resolve to an error.
/// - When `request.cancel` fires, `fetch` resolves to
///   [`TransportError::Canceled`] and must not call `on_progress` again.
/// - `on_progress` is called serially, zero or more times, in the form
///   announced by [`delivery`](Transport::delivery).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request and report text until it completes
    async fn fetch(
        &self,
        request: StreamRequest<'_>,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), TransportError>;

    /// Form of the text passed to the progress callback
    fn delivery(&self) -> Delivery {
        Delivery::Cumulative
    }
}

/// [`Transport`] backed by a `reqwest::Client`
///
/// Default headers configured on the client (e.g. `Authorization`) are sent
/// with every attempt.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wrap an existing client
    ///
    /// The client must not carry a total request timeout, or long-lived
    /// streams will be cut off.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying HTTP client
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    async fn stream_body(
        &self,
        request: &StreamRequest<'_>,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), TransportError> {
        let mut builder = self
            .client
            .get(request.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::server_error(status, message));
        }

        debug!(url = request.url, "Event stream opened");

        let mut body = response.bytes_stream();
        let mut decoder = Utf8Decoder::default();
        while let Some(chunk) = body.next().await {
            let text = decoder.push(&chunk?)?;
            if !text.is_empty() {
                on_progress(&text);
            }
        }
        decoder.finish()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(
        &self,
        request: StreamRequest<'_>,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), TransportError> {
        let cancel = request.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Canceled),
            result = self.stream_body(&request, on_progress) => result,
        }
    }

    fn delivery(&self) -> Delivery {
        Delivery::Incremental
    }
}

/// UTF-8 decoding across chunk boundaries
#[derive(Debug, Default)]
struct Utf8Decoder {
    /// Leading bytes of a character split across chunks
    carry: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, chunk: &[u8]) -> Result<String, TransportError> {
        self.carry.extend_from_slice(chunk);

        match std::str::from_utf8(&self.carry) {
            Ok(text) => {
                let text = text.to_string();
                self.carry.clear();
                Ok(text)
            }
            // Truncated character at the end: keep it for the next chunk
            Err(e) if e.error_len().is_none() => {
                let tail = self.carry.split_off(e.valid_up_to());
                let text = String::from_utf8(std::mem::replace(&mut self.carry, tail))
                    .map_err(|e| TransportError::Decode(e.to_string()))?;
                Ok(text)
            }
            Err(e) => Err(TransportError::Decode(e.to_string())),
        }
    }

    fn finish(&self) -> Result<(), TransportError> {
        if self.carry.is_empty() {
            Ok(())
        } else {
            Err(TransportError::Decode(
                "response ended inside a UTF-8 sequence".to_string(),
            ))
        }
    }
}
