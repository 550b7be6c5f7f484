//! Incremental event-stream parser
//!
//! Turns text arriving over time into completed [`Message`]s. Text may be
//! handed over either as deltas ([`StreamParser::feed`]) or as the full body
//! received so far ([`StreamParser::feed_cumulative`]), in which case the
//! parser tracks how much it has already seen and only parses the suffix.

use tracing::{trace, warn};

use super::types::{Message, MessageData};

/// Longest unterminated line kept between calls; longer lines are dropped
pub const MAX_PENDING_LINE: usize = 1024 * 1024;

/// Fields of the record currently being built
#[derive(Debug, Default)]
struct RecordAccumulator {
    id: Option<String>,
    event: Option<String>,
    data: Option<MessageData>,
}

impl RecordAccumulator {
    /// Complete the record if it has data, leaving the accumulator empty
    fn take_message(&mut self) -> Option<Message> {
        let data = self.data.take()?;
        let record = std::mem::take(self);
        Some(Message {
            id: record.id,
            event: record.event,
            data,
        })
    }
}

/// Parser state for one connection attempt
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Length of the cumulative text already consumed
    offset: usize,
    /// Text after the last newline, not yet a complete line
    pending: String,
    /// Current record being accumulated
    record: RecordAccumulator,
}

impl StreamParser {
    /// Create a new parser at offset zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of cumulative text consumed so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Feed the full response text received so far
    ///
    /// Only the part beyond the previously seen length is parsed. If the text
    /// is shorter than what was already seen, nothing new has arrived.
    pub fn feed_cumulative(&mut self, full_text: &str) -> Vec<Message> {
        let new_text = full_text.get(self.offset..).unwrap_or("");
        self.offset = self.offset.max(full_text.len());
        self.feed(new_text)
    }

    /// Feed newly arrived text and extract any completed messages
    ///
    /// Empty text is a no-op. Text after the last newline is kept until its
    /// line is complete, up to [`MAX_PENDING_LINE`] bytes.
    pub fn feed(&mut self, new_text: &str) -> Vec<Message> {
        if new_text.is_empty() {
            return Vec::new();
        }

        self.pending.push_str(new_text);

        let Some(last_newline) = self.pending.rfind('\n') else {
            self.limit_pending();
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        let mut messages = Vec::new();
        for line in complete[..last_newline].split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(message) = self.process_line(line) {
                messages.push(message);
            }
        }

        self.limit_pending();
        messages
    }

    /// Drop an unterminated line that exceeds [`MAX_PENDING_LINE`]
    fn limit_pending(&mut self) {
        if self.pending.len() > MAX_PENDING_LINE {
            warn!(
                len = self.pending.len(),
                limit = MAX_PENDING_LINE,
                "Discarding oversized unterminated event-stream line"
            );
            self.pending.clear();
        }
    }

    /// Process a single line
    fn process_line(&mut self, line: &str) -> Option<Message> {
        if let Some(value) = line.strip_prefix("data:") {
            self.record.data = Some(MessageData::decode(value.trim()));
        } else if let Some(value) = line.strip_prefix("id:") {
            self.record.id = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("event:") {
            self.record.event = Some(value.trim().to_string());
        } else if line.trim().is_empty() {
            return self.record.take_message();
        } else {
            trace!(line, "Ignoring unsupported event-stream line");
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn text(data: &str) -> MessageData {
        MessageData::Text(data.to_string())
    }

    #[test]
    fn test_parse_single_record() {
        let mut parser = StreamParser::new();

        let messages = parser.feed("id: 1\nevent: update\ndata: {\"a\":1}\n\n");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), Some("1"));
        assert_eq!(messages[0].event(), Some("update"));
        assert_eq!(messages[0].data.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_parse_multiple_records_in_order() {
        let mut parser = StreamParser::new();

        let input = "data: {\"count\":0}\n\ndata: {\"count\":1}\n\ndata: {\"count\":2}\n\n";
        let messages = parser.feed(input);

        let counts: Vec<_> = messages
            .iter()
            .map(|m| m.data.get("count").cloned())
            .collect();
        assert_eq!(counts, vec![Some(json!(0)), Some(json!(1)), Some(json!(2))]);
        assert!(messages.iter().all(|m| m.id.is_none() && m.event.is_none()));
    }

    #[test]
    fn test_non_object_data_stays_text() {
        let mut parser = StreamParser::new();

        let input = "data: 42\n\ndata: \"text\"\n\ndata: [1,2]\n\ndata: {oops\n\n";
        let messages = parser.feed(input);

        let data: Vec<_> = messages.into_iter().map(|m| m.data).collect();
        assert_eq!(
            data,
            vec![text("42"), text("\"text\""), text("[1,2]"), text("{oops")]
        );
    }

    #[test]
    fn test_partial_record_carries_over() {
        let mut parser = StreamParser::new();

        assert!(parser.feed("id: 9\nevent: tick\n").is_empty());
        assert!(parser.feed("data: hello\n").is_empty());

        let messages = parser.feed("\ndata: next\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), Some("9"));
        assert_eq!(messages[0].event(), Some("tick"));
        assert_eq!(messages[0].data, text("hello"));
    }

    #[test]
    fn test_partial_line_carries_over() {
        let mut parser = StreamParser::new();

        assert!(parser.feed("data: {\"ts\":1,\"seq\":").is_empty());
        let messages = parser.feed("1}\n\n");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data.get("seq"), Some(&json!(1)));
    }

    #[test]
    fn test_blank_line_without_data_is_noop() {
        let mut parser = StreamParser::new();

        let messages = parser.feed("\n\nid: 5\n\nevent: x\ndata: y\n\n");

        // The id-only record is dropped, but its id is kept for the next one
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), Some("5"));
        assert_eq!(messages[0].event(), Some("x"));
    }

    #[test]
    fn test_accumulator_resets_after_emit() {
        let mut parser = StreamParser::new();

        let messages = parser.feed("id: 1\nevent: a\ndata: one\n\ndata: two\n\n");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, None);
        assert_eq!(messages[1].event, None);
        assert_eq!(messages[1].data, text("two"));
    }

    #[test]
    fn test_last_data_line_wins() {
        let mut parser = StreamParser::new();

        let messages = parser.feed("data: first\ndata: second\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, text("second"));
    }

    #[test]
    fn test_ignores_unknown_fields_and_comments() {
        let mut parser = StreamParser::new();

        let messages = parser.feed(": keepalive\nretry: 100\nfoo: bar\ndata: ok\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, text("ok"));
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = StreamParser::new();

        let messages = parser.feed("id: 3\r\ndata: {\"x\":true}\r\n\r\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), Some("3"));
        assert_eq!(messages[0].data.get("x"), Some(&json!(true)));
    }

    #[test]
    fn test_lone_terminator_emits_immediately() {
        let mut parser = StreamParser::new();

        assert!(parser.feed("data: a\n").is_empty());
        let messages = parser.feed("\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, text("a"));

        // Whitespace without a pending record emits nothing
        assert!(parser.feed("   \n\n").is_empty());
        let messages = parser.feed("data: b\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, text("b"));
    }

    #[test]
    fn test_cumulative_lone_terminator() {
        let mut parser = StreamParser::new();

        assert!(parser.feed_cumulative("data: x\n").is_empty());
        let messages = parser.feed_cumulative("data: x\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, text("x"));
    }

    #[test]
    fn test_oversized_unterminated_line_dropped() {
        let mut parser = StreamParser::new();

        let huge = "x".repeat(MAX_PENDING_LINE + 1);
        assert!(parser.feed("data: ").is_empty());
        assert!(parser.feed(&huge).is_empty());
        assert!(parser.pending.is_empty());

        // Parsing resumes with the next full line
        let messages = parser.feed("\ndata: ok\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, text("ok"));
    }

    #[test]
    fn test_cumulative_feed_parses_only_suffix() {
        let mut parser = StreamParser::new();

        let first = "data: {\"count\":0}\n\n";
        let second = format!("{first}data: {{\"count\":1}}\n\n");

        let messages = parser.feed_cumulative(first);
        assert_eq!(messages.len(), 1);
        assert_eq!(parser.offset(), first.len());

        let messages = parser.feed_cumulative(&second);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data.get("count"), Some(&json!(1)));
        assert_eq!(parser.offset(), second.len());
    }

    #[test]
    fn test_cumulative_duplicate_notification_is_noop() {
        let mut parser = StreamParser::new();

        let body = "id: 1\ndata: x\n\n";
        assert_eq!(parser.feed_cumulative(body).len(), 1);
        assert!(parser.feed_cumulative(body).is_empty());
        assert!(parser.feed_cumulative("").is_empty());
        assert_eq!(parser.offset(), body.len());
    }

    #[test]
    fn test_cumulative_split_record() {
        let mut parser = StreamParser::new();

        let full = "id: 2\nevent: custom\ndata: {\"message\":\"world\"}\n\n";
        let (head, _) = full.split_at(20);

        assert!(parser.feed_cumulative(head).is_empty());
        let messages = parser.feed_cumulative(full);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), Some("2"));
        assert_eq!(messages[0].event(), Some("custom"));
        assert_eq!(messages[0].data.get("message"), Some(&json!("world")));
    }
}
