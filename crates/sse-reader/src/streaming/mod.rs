//! Event-stream wire format
//!
//! Parses `text/event-stream` bodies into [`Message`]s. Only the `data:`,
//! `id:` and `event:` fields are recognised; a record is emitted when a blank
//! line follows at least one `data:` line.
//!
//! # Example
//!
//! ```
//! use sse_reader::streaming::StreamParser;
//!
//! let mut parser = StreamParser::new();
//! let messages = parser.feed("id: 1\ndata: {\"message\":\"hello\"}\n\n");
//!
//! assert_eq!(messages[0].id(), Some("1"));
//! assert_eq!(messages[0].data.get("message").and_then(|v| v.as_str()), Some("hello"));
//! ```

mod parser;
mod types;

pub use parser::{StreamParser, MAX_PENDING_LINE};
pub use types::{Message, MessageData};
