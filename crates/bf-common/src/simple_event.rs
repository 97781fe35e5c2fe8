//! Normalized envelope shape handed to every plugin handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventKind;

/// The handler-facing normalization of a raw gateway envelope.
///
/// Only `MESSAGE_PRIVATE`, `MESSAGE_GROUP`, `MESSAGE_GROUP_MENTION` and
/// `MESSAGE_GROUP_BOT` produce a populated value; everything else yields
/// `None` and handlers fall back to the raw event for details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleEvent {
    pub user_id: Option<i64>,
    pub group_id: Option<i64>,
    pub text_message: String,
}

/// Build a [`SimpleEvent`] for the message-shaped event kinds, mirroring the
/// source framework's inbound message parser exactly: `text_message` is the
/// concatenation, in order, of every `text`-typed segment's text.
pub fn build_simple_event(kind: EventKind, raw: &Value) -> Option<SimpleEvent> {
    match kind {
        EventKind::MessagePrivate => Some(SimpleEvent {
            user_id: raw.get("user_id").and_then(Value::as_i64),
            group_id: None,
            text_message: concat_text_segments(raw),
        }),
        EventKind::MessageGroup | EventKind::MessageGroupMention | EventKind::MessageGroupBot => {
            Some(SimpleEvent {
                user_id: raw.get("user_id").and_then(Value::as_i64),
                group_id: raw.get("group_id").and_then(Value::as_i64),
                text_message: concat_text_segments(raw),
            })
        }
        _ => None,
    }
}

fn concat_text_segments(raw: &Value) -> String {
    raw.get("message")
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter(|seg| seg.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|seg| seg.get("data")?.get("text")?.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn private_message_has_no_group_id() {
        let raw = json!({
            "user_id": 42,
            "message": [{"type": "text", "data": {"text": "hi"}}]
        });
        let ev = build_simple_event(EventKind::MessagePrivate, &raw).unwrap();
        assert_eq!(ev.user_id, Some(42));
        assert_eq!(ev.group_id, None);
        assert_eq!(ev.text_message, "hi");
    }

    #[test]
    fn group_message_concatenates_text_segments_in_order() {
        let raw = json!({
            "user_id": 1,
            "group_id": 7,
            "message": [
                {"type": "text", "data": {"text": "hello "}},
                {"type": "at", "data": {"qq": "10"}},
                {"type": "text", "data": {"text": "world"}}
            ]
        });
        let ev = build_simple_event(EventKind::MessageGroup, &raw).unwrap();
        assert_eq!(ev.group_id, Some(7));
        assert_eq!(ev.text_message, "hello world");
    }

    #[test]
    fn non_message_kinds_have_no_simple_event() {
        let raw = json!({});
        assert!(build_simple_event(EventKind::NoticeInputStatus, &raw).is_none());
    }
}
