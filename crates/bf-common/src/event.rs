//! Event kind classification and inheritance.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// The closed set of event kinds the kernel can classify a raw envelope into.
///
/// `Unconditional` and `Initializer` are synthetic: the former is manufactured
/// by the scheduler, the latter names the one-shot plugin bootstrap slot and
/// never appears as a wire classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    MessagePrivate,
    MessageGroup,
    MessageGroupMention,
    MessageGroupBot,
    MessageSentPrivate,
    MessageSentGroup,
    NoticeFriendAdd,
    NoticeFriendRecall,
    NoticeGroupRecall,
    NoticeGroupIncrease,
    NoticeGroupDecrease,
    NoticeGroupAdmin,
    NoticeGroupBan,
    NoticeGroupUpload,
    NoticeGroupCard,
    NoticeGroupName,
    NoticeGroupTitle,
    NoticePoke,
    NoticeProfileLike,
    NoticeInputStatus,
    NoticeEssence,
    NoticeGroupMsgEmojiLike,
    NoticeBotOffline,
    RequestFriend,
    RequestGroup,
    MetaHeartbeat,
    MetaLifecycle,
    Unconditional,
    Initializer,
    Unexpected,
}

impl EventKind {
    /// Stable wire/manifest name, matching the source framework's string constants.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessagePrivate => "MESSAGE_PRIVATE",
            EventKind::MessageGroup => "MESSAGE_GROUP",
            EventKind::MessageGroupMention => "MESSAGE_GROUP_MENTION",
            EventKind::MessageGroupBot => "MESSAGE_GROUP_BOT",
            EventKind::MessageSentPrivate => "MESSAGE_SENT_PRIVATE",
            EventKind::MessageSentGroup => "MESSAGE_SENT_GROUP",
            EventKind::NoticeFriendAdd => "NOTICE_FRIEND_ADD",
            EventKind::NoticeFriendRecall => "NOTICE_FRIEND_RECALL",
            EventKind::NoticeGroupRecall => "NOTICE_GROUP_RECALL",
            EventKind::NoticeGroupIncrease => "NOTICE_GROUP_INCREASE",
            EventKind::NoticeGroupDecrease => "NOTICE_GROUP_DECREASE",
            EventKind::NoticeGroupAdmin => "NOTICE_GROUP_ADMIN",
            EventKind::NoticeGroupBan => "NOTICE_GROUP_BAN",
            EventKind::NoticeGroupUpload => "NOTICE_GROUP_UPLOAD",
            EventKind::NoticeGroupCard => "NOTICE_GROUP_CARD",
            EventKind::NoticeGroupName => "NOTICE_GROUP_NAME",
            EventKind::NoticeGroupTitle => "NOTICE_GROUP_TITLE",
            EventKind::NoticePoke => "NOTICE_POKE",
            EventKind::NoticeProfileLike => "NOTICE_PROFILE_LIKE",
            EventKind::NoticeInputStatus => "NOTICE_INPUT_STATUS",
            EventKind::NoticeEssence => "NOTICE_ESSENCE",
            EventKind::NoticeGroupMsgEmojiLike => "NOTICE_GROUP_MSG_EMOJI_LIKE",
            EventKind::NoticeBotOffline => "NOTICE_BOT_OFFLINE",
            EventKind::RequestFriend => "REQUEST_FRIEND",
            EventKind::RequestGroup => "REQUEST_GROUP",
            EventKind::MetaHeartbeat => "META_HEARTBEAT",
            EventKind::MetaLifecycle => "META_LIFECYCLE",
            EventKind::Unconditional => "UNCONDITIONAL",
            EventKind::Initializer => "INITIALIZER",
            EventKind::Unexpected => "UNEXPECTED",
        }
    }

    /// Parse a manifest-declared event kind key. `UNCONDITIONAL` and
    /// `INITIALIZER` are accepted here too since manifest validation reuses
    /// this lookup before branching on the special keys.
    pub fn from_manifest_key(key: &str) -> Option<Self> {
        Some(match key {
            "MESSAGE_PRIVATE" => EventKind::MessagePrivate,
            "MESSAGE_GROUP" => EventKind::MessageGroup,
            "MESSAGE_GROUP_MENTION" => EventKind::MessageGroupMention,
            "MESSAGE_GROUP_BOT" => EventKind::MessageGroupBot,
            "MESSAGE_SENT_PRIVATE" => EventKind::MessageSentPrivate,
            "MESSAGE_SENT_GROUP" => EventKind::MessageSentGroup,
            "NOTICE_FRIEND_ADD" => EventKind::NoticeFriendAdd,
            "NOTICE_FRIEND_RECALL" => EventKind::NoticeFriendRecall,
            "NOTICE_GROUP_RECALL" => EventKind::NoticeGroupRecall,
            "NOTICE_GROUP_INCREASE" => EventKind::NoticeGroupIncrease,
            "NOTICE_GROUP_DECREASE" => EventKind::NoticeGroupDecrease,
            "NOTICE_GROUP_ADMIN" => EventKind::NoticeGroupAdmin,
            "NOTICE_GROUP_BAN" => EventKind::NoticeGroupBan,
            "NOTICE_GROUP_UPLOAD" => EventKind::NoticeGroupUpload,
            "NOTICE_GROUP_CARD" => EventKind::NoticeGroupCard,
            "NOTICE_GROUP_NAME" => EventKind::NoticeGroupName,
            "NOTICE_GROUP_TITLE" => EventKind::NoticeGroupTitle,
            "NOTICE_POKE" => EventKind::NoticePoke,
            "NOTICE_PROFILE_LIKE" => EventKind::NoticeProfileLike,
            "NOTICE_INPUT_STATUS" => EventKind::NoticeInputStatus,
            "NOTICE_ESSENCE" => EventKind::NoticeEssence,
            "NOTICE_GROUP_MSG_EMOJI_LIKE" => EventKind::NoticeGroupMsgEmojiLike,
            "NOTICE_BOT_OFFLINE" => EventKind::NoticeBotOffline,
            "REQUEST_FRIEND" => EventKind::RequestFriend,
            "REQUEST_GROUP" => EventKind::RequestGroup,
            "META_HEARTBEAT" => EventKind::MetaHeartbeat,
            "META_LIFECYCLE" => EventKind::MetaLifecycle,
            "UNCONDITIONAL" => EventKind::Unconditional,
            "INITIALIZER" => EventKind::Initializer,
            _ => return None,
        })
    }

    /// The kinds this one inherits from, for handler-lookup expansion only.
    /// Never persisted; one level deep by design (see §3 Event Inheritance).
    pub fn inherits_from(&self) -> &'static [EventKind] {
        match self {
            EventKind::MessageGroupMention => &[EventKind::MessageGroup],
            EventKind::MessageGroupBot => &[EventKind::MessageGroup],
            _ => &[],
        }
    }
}

/// Classify one raw gateway envelope into an [`EventKind`].
///
/// Mirrors the nested post_type / *_type / sub_type discrimination of the
/// source framework, including the group-message content-sensitive rules
/// (mention beats command-prefix; only the first text segment is examined
/// for a command prefix).
pub fn classify(raw: &Value) -> EventKind {
    let post_type = raw.get("post_type").and_then(Value::as_str);

    match post_type {
        Some("message") => match raw.get("message_type").and_then(Value::as_str) {
            Some("private") => return EventKind::MessagePrivate,
            Some("group") => return classify_group_message(raw),
            _ => {}
        },
        Some("message_sent") => match raw.get("message_type").and_then(Value::as_str) {
            Some("private") => return EventKind::MessageSentPrivate,
            Some("group") => return EventKind::MessageSentGroup,
            _ => {}
        },
        Some("notice") => match raw.get("notice_type").and_then(Value::as_str) {
            Some("friend_add") => return EventKind::NoticeFriendAdd,
            Some("friend_recall") => return EventKind::NoticeFriendRecall,
            Some("group_recall") => return EventKind::NoticeGroupRecall,
            Some("group_increase") => return EventKind::NoticeGroupIncrease,
            Some("group_decrease") => return EventKind::NoticeGroupDecrease,
            Some("group_admin") => return EventKind::NoticeGroupAdmin,
            Some("group_ban") => return EventKind::NoticeGroupBan,
            Some("group_upload") => return EventKind::NoticeGroupUpload,
            Some("group_card") => return EventKind::NoticeGroupCard,
            Some("essence") => return EventKind::NoticeEssence,
            Some("group_msg_emoji_like") => return EventKind::NoticeGroupMsgEmojiLike,
            Some("bot_offline") => return EventKind::NoticeBotOffline,
            Some("notify") => match raw.get("sub_type").and_then(Value::as_str) {
                Some("group_name") => return EventKind::NoticeGroupName,
                Some("title") => return EventKind::NoticeGroupTitle,
                Some("poke") => return EventKind::NoticePoke,
                Some("profile_like") => return EventKind::NoticeProfileLike,
                Some("input_status") => return EventKind::NoticeInputStatus,
                _ => {}
            },
            _ => {}
        },
        Some("request") => match raw.get("request_type").and_then(Value::as_str) {
            Some("friend") => return EventKind::RequestFriend,
            Some("group") => return EventKind::RequestGroup,
            _ => {}
        },
        Some("meta_event") => match raw.get("meta_event_type").and_then(Value::as_str) {
            Some("heartbeat") => return EventKind::MetaHeartbeat,
            Some("lifecycle") => return EventKind::MetaLifecycle,
            _ => {}
        },
        _ => {}
    }

    warn!(
        post_type = ?post_type,
        message_type = ?raw.get("message_type"),
        notice_type = ?raw.get("notice_type"),
        request_type = ?raw.get("request_type"),
        meta_event_type = ?raw.get("meta_event_type"),
        sub_type = ?raw.get("sub_type"),
        "unrecognized event structure"
    );
    EventKind::Unexpected
}

/// Renders a JSON scalar as a bare string for cross-type identity comparison
/// (`self_id: 10` vs. `qq: "10"`), not via `Value::to_string()`'s JSON
/// serialization, which would quote strings and never match numbers.
fn bare_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn classify_group_message(raw: &Value) -> EventKind {
    let self_id = raw.get("self_id").and_then(bare_string);
    let segments = raw
        .get("message")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for segment in &segments {
        if segment.get("type").and_then(Value::as_str) == Some("at") {
            let at_qq = segment
                .get("data")
                .and_then(|d| d.get("qq"))
                .and_then(bare_string);
            if at_qq.is_some() && at_qq == self_id {
                return EventKind::MessageGroupMention;
            }
        }
    }

    for segment in &segments {
        if segment.get("type").and_then(Value::as_str) == Some("text") {
            let text = segment
                .get("data")
                .and_then(|d| d.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let trimmed = text.trim_start();
            if let Some(first) = trimmed.chars().next() {
                if matches!(first, '.' | '/' | '\\') {
                    return EventKind::MessageGroupBot;
                }
            }
            break;
        }
    }

    EventKind::MessageGroup
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_private_message() {
        let raw = json!({"post_type": "message", "message_type": "private"});
        assert_eq!(classify(&raw), EventKind::MessagePrivate);
    }

    #[test]
    fn mention_beats_command_prefix() {
        let raw = json!({
            "post_type": "message",
            "message_type": "group",
            "self_id": 10,
            "message": [
                {"type": "at", "data": {"qq": "10"}},
                {"type": "text", "data": {"text": "/ping"}}
            ]
        });
        assert_eq!(classify(&raw), EventKind::MessageGroupMention);
    }

    #[test]
    fn command_prefix_only_checks_first_text_segment() {
        let raw = json!({
            "post_type": "message",
            "message_type": "group",
            "self_id": 10,
            "message": [
                {"type": "text", "data": {"text": "hello"}},
                {"type": "text", "data": {"text": "/ping"}}
            ]
        });
        assert_eq!(classify(&raw), EventKind::MessageGroup);
    }

    #[test]
    fn plain_command_classifies_as_bot() {
        let raw = json!({
            "post_type": "message",
            "message_type": "group",
            "self_id": 10,
            "message": [{"type": "text", "data": {"text": "/ping"}}]
        });
        assert_eq!(classify(&raw), EventKind::MessageGroupBot);
    }

    #[test]
    fn unrecognized_maps_to_unexpected() {
        let raw = json!({"post_type": "something_else"});
        assert_eq!(classify(&raw), EventKind::Unexpected);
    }

    #[test]
    fn inheritance_is_one_level() {
        assert_eq!(
            EventKind::MessageGroupMention.inherits_from(),
            &[EventKind::MessageGroup]
        );
        assert!(EventKind::MessageGroup.inherits_from().is_empty());
    }
}
