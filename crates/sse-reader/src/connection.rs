//! Connection manager
//!
//! [`SseReader`] owns one logical subscription: it issues the streaming
//! request, feeds arriving text through a [`StreamParser`], publishes the
//! resulting messages, and retries failed attempts after a fixed interval up
//! to a configured limit.

use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{ReaderConfig, ReaderOptions};
use crate::error::{ReaderError, Result, TransportError};
use crate::events::{EventKind, EventStream, ListenerId, Listeners, ReaderEvent};
use crate::streaming::{Message, StreamParser};
use crate::transport::{Delivery, ReqwestTransport, StreamRequest, Transport};

/// Externally observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt outstanding: never connected, stream completed, or retries
    /// exhausted
    Idle,
    /// An attempt is connecting, streaming, or waiting to be retried
    Open,
    /// `close()` was called; terminal
    Closed,
}

impl ConnectionState {
    /// Numeric ready state (`0` idle, `1` open, `2` closed)
    pub fn ready_state(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }
}

/// Mutable lifecycle state, guarded by one lock
#[derive(Debug, Default)]
struct Lifecycle {
    closed: bool,
    /// Cancellation handle of the current attempt
    cancel: Option<CancellationToken>,
    retry_count: u32,
    /// Incremented per attempt; stale attempts compare unequal
    generation: u64,
}

struct Inner {
    url: String,
    config: ReaderConfig,
    transport: Arc<dyn Transport>,
    listeners: Arc<Listeners>,
    lifecycle: Mutex<Lifecycle>,
    /// Held while listeners run so `close()` cannot interleave with an emit
    emitting: ReentrantMutex<()>,
    runtime: Handle,
}

/// Reconnecting reader for a `text/event-stream` endpoint
///
/// # Example
///
/// ```no_run
/// use sse_reader::{ReaderConfig, ReaderOptions, SseReader};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let reader = SseReader::with_options(
///     "http://localhost:8080/events",
///     ReaderOptions::new().config(ReaderConfig::new().max_retries(10)),
/// )?;
///
/// let mut events = reader.events();
/// while let Some(message) = events.next_message().await {
///     println!("{:?}: {:?}", message.event, message.data);
/// }
/// # Ok(())
/// # }
/// ```
///
/// Dropping the reader closes it.
pub struct SseReader {
    inner: Arc<Inner>,
}

impl SseReader {
    /// Create a reader with default configuration and transport
    ///
    /// Must be called within a tokio runtime.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, ReaderOptions::default())
    }

    /// Create a reader with the given configuration
    pub fn with_config(url: impl Into<String>, config: ReaderConfig) -> Result<Self> {
        Self::with_options(url, ReaderOptions::new().config(config))
    }

    /// Create a reader that issues requests through `client`
    pub fn with_client(
        url: impl Into<String>,
        client: reqwest::Client,
        config: ReaderConfig,
    ) -> Result<Self> {
        Self::with_options(url, ReaderOptions::new().config(config).with_client(client))
    }

    /// Create a reader from explicit options
    ///
    /// Fails with [`ReaderError::InvalidArgument`] if `url` is empty. When
    /// `auto_connect` is set, the first attempt starts immediately.
    pub fn with_options(url: impl Into<String>, options: ReaderOptions) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(ReaderError::invalid_argument("URL is required"));
        }
        options.config.validate()?;

        let runtime = Handle::try_current().map_err(|_| ReaderError::NoRuntime)?;

        let transport = match options.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(reqwest::Client::builder().build()?)),
        };

        let reader = Self {
            inner: Arc::new(Inner {
                url,
                config: options.config,
                transport,
                listeners: Arc::new(Listeners::new()),
                lifecycle: Mutex::new(Lifecycle::default()),
                emitting: ReentrantMutex::new(()),
                runtime,
            }),
        };

        if reader.inner.config.auto_connect {
            Inner::start_attempt(&reader.inner, None);
        }

        Ok(reader)
    }

    /// Start a new attempt with a fresh retry budget
    ///
    /// Any attempt still in flight is cancelled and any pending retry is
    /// discarded. Does nothing once the reader is closed.
    pub fn connect(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.closed {
                return;
            }
            lifecycle.retry_count = 0;
        }
        Inner::start_attempt(&self.inner, None);
    }

    /// Close the reader and cancel any outstanding request
    ///
    /// No events are emitted after this returns. Calling it again has no
    /// further effect.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        let lifecycle = self.inner.lifecycle.lock();
        if lifecycle.closed {
            ConnectionState::Closed
        } else if lifecycle.cancel.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Idle
        }
    }

    /// Numeric form of [`state`](Self::state)
    pub fn ready_state(&self) -> u8 {
        self.state().ready_state()
    }

    /// Consecutive failures counted toward `max_retries`
    pub fn retry_count(&self) -> u32 {
        self.inner.lifecycle.lock().retry_count
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Active configuration
    pub fn config(&self) -> &ReaderConfig {
        &self.inner.config
    }

    /// Call `listener` for every completed message
    pub fn on_message<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .subscribe(EventKind::Message, move |event| {
                if let ReaderEvent::Message(message) = event {
                    listener(message);
                }
            })
    }

    /// Call `listener` for every failed attempt
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(EventKind::Error, move |event| {
            if let ReaderEvent::Error(error) = event {
                listener(error);
            }
        })
    }

    /// Remove a listener added with `on_message` or `on_error`
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    /// Stream of every event emitted from now on
    pub fn events(&self) -> EventStream {
        EventStream::register(&self.inner.listeners)
    }
}

impl Drop for SseReader {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for SseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseReader")
            .field("url", &self.inner.url)
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    /// Begin a new attempt
    ///
    /// With `expected` set, the attempt only starts if that generation is
    /// still current (a scheduled retry that nothing superseded).
    fn start_attempt(inner: &Arc<Self>, expected: Option<u64>) {
        let (generation, cancel) = {
            let mut lifecycle = inner.lifecycle.lock();
            if lifecycle.closed {
                return;
            }
            if let Some(expected) = expected {
                if expected != lifecycle.generation {
                    return;
                }
            }
            if let Some(previous) = lifecycle.cancel.take() {
                previous.cancel();
            }

            lifecycle.generation += 1;
            let cancel = CancellationToken::new();
            lifecycle.cancel = Some(cancel.clone());
            (lifecycle.generation, cancel)
        };

        inner
            .runtime
            .spawn(Self::run_attempt(Arc::clone(inner), generation, cancel));
    }

    #[instrument(skip_all, fields(url = %inner.url, attempt = generation))]
    async fn run_attempt(inner: Arc<Self>, generation: u64, cancel: CancellationToken) {
        debug!("Connecting to event stream");

        let mut parser = StreamParser::new();
        let delivery = inner.transport.delivery();
        let request = StreamRequest {
            url: &inner.url,
            cancel: cancel.clone(),
            timeout: None,
        };

        let result = {
            let mut on_progress = |text: &str| {
                let messages = match delivery {
                    Delivery::Cumulative => parser.feed_cumulative(text),
                    Delivery::Incremental => parser.feed(text),
                };
                for message in messages {
                    inner.dispatch(generation, ReaderEvent::Message(message));
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Canceled),
                result = inner.transport.fetch(request, &mut on_progress) => result,
            }
        };

        match result {
            Ok(()) => inner.complete(generation),
            Err(error) if error.is_canceled() => debug!("Event stream attempt cancelled"),
            Err(error) => {
                let Some(delay) = inner.fail(generation, error) else {
                    return;
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Scheduled reconnect cancelled");
                    }
                    _ = tokio::time::sleep(delay) => {
                        Self::start_attempt(&inner, Some(generation));
                    }
                }
            }
        }
    }

    /// The stream ended normally
    fn complete(&self, generation: u64) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.closed || lifecycle.generation != generation {
            return;
        }
        lifecycle.retry_count = 0;
        lifecycle.cancel = None;
        info!("Event stream completed");
    }

    /// Surface a failed attempt and decide whether to retry
    ///
    /// Returns the delay before the next attempt, or `None` if the failure
    /// is stale or the retry budget is spent.
    fn fail(&self, generation: u64, error: TransportError) -> Option<std::time::Duration> {
        if !self.is_current(generation) {
            return None;
        }

        warn!(error = %error, "Event stream attempt failed");
        self.dispatch(generation, ReaderEvent::Error(Arc::new(error)));

        // Listeners may have closed or reconnected in the meantime.
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.closed || lifecycle.generation != generation {
            return None;
        }

        if lifecycle.retry_count < self.config.max_retries {
            lifecycle.retry_count += 1;
            let delay = self.config.reconnect_interval;
            info!(
                retry = lifecycle.retry_count,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            Some(delay)
        } else {
            lifecycle.cancel = None;
            warn!(
                max_retries = self.config.max_retries,
                "Retry limit reached; waiting for connect()"
            );
            None
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let lifecycle = self.lifecycle.lock();
        !lifecycle.closed && lifecycle.generation == generation
    }

    /// Publish an event from the given attempt, unless it is stale or closed
    fn dispatch(&self, generation: u64, event: ReaderEvent) {
        let _emitting = self.emitting.lock();
        if !self.is_current(generation) {
            return;
        }
        self.listeners.emit(&event);
    }

    fn close(&self) {
        let _emitting = self.emitting.lock();
        let cancel = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.closed {
                return;
            }
            lifecycle.closed = true;
            lifecycle.cancel.take()
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        info!(url = %self.url, "Event stream closed");
    }
}
