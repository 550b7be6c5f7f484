//! Event-stream reader
//!
//! Subscribes to a long-lived HTTP endpoint that speaks `text/event-stream`,
//! parses the body incrementally into [`Message`]s, and reconnects after
//! failures with a bounded number of retries.
//!
//! Requests go through a [`Transport`], so any HTTP client (and any custom
//! headers it carries) can be used. The default is a plain `reqwest::Client`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use sse_reader::{ReaderConfig, SseReader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut headers = reqwest::header::HeaderMap::new();
//!     headers.insert("Authorization", "Bearer secret".parse()?);
//!     let client = reqwest::Client::builder().default_headers(headers).build()?;
//!
//!     let config = ReaderConfig::new()
//!         .reconnect_interval(Duration::from_secs(1))
//!         .max_retries(10);
//!     let reader = SseReader::with_client("http://localhost:8080/events", client, config)?;
//!
//!     reader.on_message(|message| println!("{:?}", message.data));
//!     reader.on_error(|error| eprintln!("stream error: {}", error));
//!
//!     tokio::signal::ctrl_c().await?;
//!     reader.close();
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides an axum [`TestServer`](testing::TestServer)
//! and a [`ScriptedTransport`](testing::ScriptedTransport) for driving the
//! reader without a network.

mod config;
mod connection;
mod error;
pub mod events;
pub mod streaming;
pub mod testing;
pub mod transport;

pub use config::{ReaderConfig, ReaderOptions};
pub use connection::{ConnectionState, SseReader};
pub use error::{ReaderError, Result, TransportError};
pub use events::{EventKind, EventStream, ListenerId, ReaderEvent};
pub use streaming::{Message, MessageData, StreamParser};
pub use transport::{Delivery, ReqwestTransport, StreamRequest, Transport};
