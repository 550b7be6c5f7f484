//! Test utilities for sse-reader
//!
//! Provides an axum-backed [`TestServer`] for end-to-end tests and a
//! [`ScriptedTransport`] for driving the connection manager without a network.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::error::{ReaderError, TransportError};
use crate::transport::{Delivery, ProgressFn, StreamRequest, Transport};

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve an axum Router on an ephemeral local port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{routing::get, Router};
    /// use sse_reader::testing::TestServer;
    ///
    /// let server = TestServer::start(Router::new().route("/events", get(events))).await?;
    /// let reader = SseReader::new(server.url("/events"))?;
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self, ReaderError>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the full URL of a path on the test server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// What a [`ScriptedTransport`] does for one request
#[derive(Debug, Clone)]
pub enum Script {
    /// Deliver the chunks, then complete successfully
    Respond(Vec<String>),
    /// Deliver the chunks, then stay open until cancelled
    Hold(Vec<String>),
    /// Fail immediately with the given message
    Fail(String),
    /// Stay open without data until cancelled
    Hang,
}

impl Script {
    /// Respond with the given chunks
    pub fn respond<I: IntoIterator<Item = S>, S: Into<String>>(chunks: I) -> Self {
        Self::Respond(chunks.into_iter().map(Into::into).collect())
    }

    /// Hold open after the given chunks
    pub fn hold<I: IntoIterator<Item = S>, S: Into<String>>(chunks: I) -> Self {
        Self::Hold(chunks.into_iter().map(Into::into).collect())
    }

    /// Fail with a message
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// In-memory [`Transport`] that plays back one [`Script`] per request
///
/// When the queue runs out, the fallback script is used for every further
/// request. Text is reported in the configured [`Delivery`] form.
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    delivery: Delivery,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Create a transport playing `scripts` in order, then hanging
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            fallback: Script::Hang,
            delivery: Delivery::Cumulative,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Use `script` once the queue is exhausted
    #[must_use]
    pub fn with_fallback(mut self, script: Script) -> Self {
        self.fallback = script;
        self
    }

    /// Report text in the given form
    #[must_use]
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Number of requests issued so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs of every request issued so far
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    fn report(&self, chunks: &[String], on_progress: &mut ProgressFn<'_>) {
        let mut body = String::new();
        for chunk in chunks {
            match self.delivery {
                Delivery::Cumulative => {
                    body.push_str(chunk);
                    on_progress(&body);
                }
                Delivery::Incremental => on_progress(chunk),
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(
        &self,
        request: StreamRequest<'_>,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(request.url.to_string());

        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match script {
            Script::Respond(chunks) => {
                self.report(&chunks, on_progress);
                Ok(())
            }
            Script::Hold(chunks) => {
                self.report(&chunks, on_progress);
                request.cancel.cancelled().await;
                Err(TransportError::Canceled)
            }
            Script::Fail(message) => Err(TransportError::Other(message)),
            Script::Hang => {
                request.cancel.cancelled().await;
                Err(TransportError::Canceled)
            }
        }
    }

    fn delivery(&self) -> Delivery {
        self.delivery
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    condition()
}
