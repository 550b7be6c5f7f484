//! Listener registry for reader events
//!
//! Listeners are invoked synchronously, in registration order, at the moment
//! an event is emitted. The registry lock is not held while listeners run, so
//! a listener may register or remove listeners, or close the reader.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::streaming::Message;

/// Event published by a reader
#[derive(Debug, Clone)]
pub enum ReaderEvent {
    /// A completed record
    Message(Message),
    /// A connection attempt failed (never emitted for cancellation)
    Error(Arc<TransportError>),
}

impl ReaderEvent {
    /// The kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// Event kinds listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `message` events
    Message,
    /// `error` events
    Error,
}

/// Handle returned by subscribe, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ReaderEvent) + Send + Sync>;

/// Ordered set of listeners
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Option<EventKind>, Listener)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ReaderEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(listener))
    }

    /// Register a listener for every event kind
    pub fn subscribe_all<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ReaderEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(listener))
    }

    fn insert(&self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, kind, listener));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _, _)| *entry_id != id);
        entries.len() != before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener registered for the event's kind
    pub fn emit(&self, event: &ReaderEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, k, _)| k.map_or(true, |k| k == kind))
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        for listener in targets {
            listener(event);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

/// Stream of reader events
///
/// Obtained from [`SseReader::events`](crate::SseReader::events). The
/// underlying listener is removed when the stream is dropped.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ReaderEvent>,
    listeners: Weak<Listeners>,
    id: ListenerId,
}

impl EventStream {
    pub(crate) fn register(listeners: &Arc<Listeners>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = listeners.subscribe_all(move |event| {
            let _ = tx.send(event.clone());
        });
        Self {
            rx,
            listeners: Arc::downgrade(listeners),
            id,
        }
    }

    /// Receive the next event
    ///
    /// Returns `None` once the reader has been dropped.
    pub async fn next_event(&mut self) -> Option<ReaderEvent> {
        self.rx.recv().await
    }

    /// Receive the next message, skipping error events
    pub async fn next_message(&mut self) -> Option<Message> {
        while let Some(event) = self.rx.recv().await {
            if let ReaderEvent::Message(message) = event {
                return Some(message);
            }
        }
        None
    }
}

impl Stream for EventStream {
    type Item = ReaderEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.unsubscribe(self.id);
        }
    }
}
