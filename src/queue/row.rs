//! # Message Rows
//!
//! The raw slot contents as claimed from a queue table, and their
//! reconstruction into transport messages. A row whose metadata cannot be
//! reconstructed is classified poison: the raw row survives for
//! dead-lettering, but no `Message` is ever handed to application code.

use serde_json;
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::error;

/// A reconstructed transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Transport-level message identifier
    pub transport_id: String,
    /// String-keyed headers, passed through unchanged
    pub headers: HashMap<String, String>,
    /// Opaque body bytes
    pub body: Vec<u8>,
}

/// Raw contents of a claimed slot.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub seq: i32,
    pub message_id: Option<String>,
    pub headers: Option<String>,
    pub body: Option<Vec<u8>>,
}

/// Outcome of a receive claim.
#[derive(Debug)]
pub enum MessageReadResult {
    /// No claimable slot past the cursor.
    NoMessage,
    /// Row claimed but its metadata could not be reconstructed; must be
    /// dead-lettered, never redelivered.
    Poison(MessageRow),
    /// Row claimed and reconstructed.
    Success(Message),
}

impl MessageRow {
    /// Build the raw row for an outgoing message.
    pub fn from_message(
        message_id: &str,
        headers_blob: String,
        body: &[u8],
    ) -> Self {
        Self {
            seq: 0,
            message_id: Some(message_id.to_string()),
            headers: Some(headers_blob),
            body: Some(body.to_vec()),
        }
    }

    /// Serialize a header map to its stored blob form.
    pub fn serialize_headers(
        headers: &HashMap<String, String>,
    ) -> Result<String, serde_json::Error> {
        serde_json::to_string(headers)
    }

    /// Reconstruct the transport message, classifying the row poison when
    /// the headers blob fails to parse or the message id is absent.
    pub fn try_parse(self, queue_name: &str) -> MessageReadResult {
        let parsed_headers = match self.headers.as_deref() {
            None | Some("") => Ok(HashMap::new()),
            Some(blob) => serde_json::from_str::<HashMap<String, String>>(blob),
        };

        match (self.message_id.clone(), parsed_headers) {
            (Some(id), Ok(headers)) => MessageReadResult::Success(Message {
                transport_id: id,
                headers,
                body: self.body.clone().unwrap_or_default(),
            }),
            (_, Err(parse_err)) => {
                error!(
                    queue = queue_name,
                    seq = self.seq,
                    error = %parse_err,
                    "Error receiving message. Probable message metadata corruption. Moving to error queue."
                );
                MessageReadResult::Poison(self)
            }
            (None, Ok(_)) => {
                error!(
                    queue = queue_name,
                    seq = self.seq,
                    "Claimed row has no message id. Moving to error queue."
                );
                MessageReadResult::Poison(self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: Option<&str>, headers: Option<&str>, body: Option<&[u8]>) -> MessageRow {
        MessageRow {
            seq: 7,
            message_id: id.map(str::to_string),
            headers: headers.map(str::to_string),
            body: body.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn valid_row_parses_to_message() {
        let result = row(
            Some("msg-1"),
            Some(r#"{"reply-to":"orders"}"#),
            Some(b"payload"),
        )
        .try_parse("input");

        match result {
            MessageReadResult::Success(message) => {
                assert_eq!(message.transport_id, "msg-1");
                assert_eq!(message.headers["reply-to"], "orders");
                assert_eq!(message.body, b"payload");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn missing_headers_become_empty_map() {
        let result = row(Some("msg-2"), None, Some(b"x")).try_parse("input");
        match result {
            MessageReadResult::Success(message) => assert!(message.headers.is_empty()),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_headers_classify_poison() {
        let result = row(Some("msg-3"), Some("{not json"), Some(b"x")).try_parse("input");
        match result {
            MessageReadResult::Poison(raw) => {
                assert_eq!(raw.seq, 7);
                assert_eq!(raw.headers.as_deref(), Some("{not json"));
                assert_eq!(raw.body.as_deref(), Some(&b"x"[..]));
            }
            other => panic!("expected poison, got {other:?}"),
        }
    }

    #[test]
    fn missing_message_id_classifies_poison() {
        let result = row(None, Some("{}"), Some(b"x")).try_parse("input");
        assert!(matches!(result, MessageReadResult::Poison(_)));
    }

    #[test]
    fn missing_body_reads_as_empty_bytes() {
        let result = row(Some("msg-4"), Some("{}"), None).try_parse("input");
        match result {
            MessageReadResult::Success(message) => assert!(message.body.is_empty()),
            other => panic!("expected success, got {other:?}"),
        }
    }
}
