//! Translates a handler's return value into zero or more gateway calls.

use crate::gateway::GatewayClient;
use serde_json::Value;
use tracing::warn;

/// Wraps plain text in the OneBot message-segment array shape a string reply
/// expands to on the wire.
pub fn text_segments(text: &str) -> Value {
    serde_json::json!([{"type": "text", "data": {"text": text}}])
}

pub struct OutboundParser<'a> {
    gateway: &'a GatewayClient,
}

impl<'a> OutboundParser<'a> {
    pub fn new(gateway: &'a GatewayClient) -> Self {
        Self { gateway }
    }

    /// Apply the outbound shape rules to one handler result.
    pub async fn handle(&self, result: &Value, raw_event: &Value) {
        match result {
            Value::Null => {}
            Value::String(text) => self.send_string_reply(text, raw_event).await,
            Value::Object(map) => {
                let action = map.get("action").and_then(Value::as_str);
                let data = map.get("data").and_then(Value::as_object);
                match (action, data) {
                    (Some(action), Some(data)) => {
                        self.gateway
                            .send(action, Value::Object(data.clone()))
                            .await;
                    }
                    _ => {
                        warn!(?result, "outbound object missing action/data, dropping");
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(_) | Value::Object(_) => {
                            Box::pin(self.handle(item, raw_event)).await;
                        }
                        _ => {
                            warn!(?item, "non-string non-object array element, skipping");
                        }
                    }
                }
            }
            other => {
                warn!(?other, "unsupported outbound shape, dropping");
            }
        }
    }

    async fn send_string_reply(&self, text: &str, raw_event: &Value) {
        let post_type = raw_event.get("post_type").and_then(Value::as_str);

        match post_type {
            Some("message") => {
                match raw_event.get("message_type").and_then(Value::as_str) {
                    Some("private") => {
                        if let Some(user_id) = raw_event.get("user_id") {
                            self.gateway
                                .send(
                                    "send_private_msg",
                                    serde_json::json!({"user_id": user_id, "message": text_segments(text)}),
                                )
                                .await;
                            return;
                        }
                    }
                    Some("group") => {
                        if let Some(group_id) = raw_event.get("group_id") {
                            self.gateway
                                .send(
                                    "send_group_msg",
                                    serde_json::json!({"group_id": group_id, "message": text_segments(text)}),
                                )
                                .await;
                            return;
                        }
                    }
                    _ => {}
                }
                warn!("string reply for message event with no usable scope identifier, dropping");
            }
            Some("notice") => {
                if raw_event.get("notice_type").and_then(Value::as_str) == Some("bot_offline") {
                    warn!("string reply refused for NOTICE_BOT_OFFLINE");
                    return;
                }
                if let Some(group_id) = raw_event.get("group_id") {
                    self.gateway
                        .send(
                            "send_group_msg",
                            serde_json::json!({"group_id": group_id, "message": text_segments(text)}),
                        )
                        .await;
                } else if let Some(user_id) = raw_event.get("user_id") {
                    self.gateway
                        .send(
                            "send_private_msg",
                            serde_json::json!({"user_id": user_id, "message": text_segments(text)}),
                        )
                        .await;
                } else {
                    warn!("string reply for notice event with no group_id/user_id, dropping");
                }
            }
            _ => {
                warn!(?post_type, "string replies are not defined for this post_type, dropping");
            }
        }
    }
}
