//! Recognizes admin mute/unmute commands ahead of normal dispatch.

use crate::mute::MuteFlag;
use serde_json::Value;

pub struct AdminChannel {
    admin_id: i64,
}

impl AdminChannel {
    pub fn new(admin_id: i64) -> Self {
        Self { admin_id }
    }

    /// Inspect one raw event. Returns `true` if it was a recognized admin
    /// mute/unmute command and has been fully handled (the caller must short
    /// circuit dispatch for this event: no archival, no handlers). Returns
    /// `false` for every other event, including other private messages from
    /// the admin, which fall through to normal dispatch.
    pub fn try_handle(&self, raw_event: &Value, mute_flag: &MuteFlag) -> bool {
        let is_admin_private = raw_event.get("post_type").and_then(Value::as_str) == Some("message")
            && raw_event.get("message_type").and_then(Value::as_str) == Some("private")
            && raw_event.get("user_id").and_then(Value::as_i64) == Some(self.admin_id);

        if !is_admin_private {
            return false;
        }

        let text = raw_event
            .get("raw_message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();

        match text {
            "mute" => {
                mute_flag.mute();
                true
            }
            "unmute" => {
                mute_flag.unmute();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mute_command_sets_flag_and_is_handled() {
        let channel = AdminChannel::new(42);
        let flag = MuteFlag::new();
        let raw = json!({"post_type": "message", "message_type": "private", "user_id": 42, "raw_message": "mute"});
        assert!(channel.try_handle(&raw, &flag));
        assert!(flag.is_muted());
    }

    #[test]
    fn other_admin_text_falls_through() {
        let channel = AdminChannel::new(42);
        let flag = MuteFlag::new();
        let raw = json!({"post_type": "message", "message_type": "private", "user_id": 42, "raw_message": "hello"});
        assert!(!channel.try_handle(&raw, &flag));
        assert!(!flag.is_muted());
    }

    #[test]
    fn non_admin_sender_is_ignored() {
        let channel = AdminChannel::new(42);
        let flag = MuteFlag::new();
        let raw = json!({"post_type": "message", "message_type": "private", "user_id": 7, "raw_message": "mute"});
        assert!(!channel.try_handle(&raw, &flag));
    }
}
