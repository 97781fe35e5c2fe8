//! Out-of-band admin notification, wired in as a `tracing` layer.
//!
//! Re-architecture of the source framework's module-level log monkeypatch:
//! instead of intercepting log calls, this filters `tracing` events by
//! severity and forwards matching ones through a reentrancy guard and a
//! content-hash rate limiter to a background sender task.

use bf_dispatch::GatewayClient;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub admin_id: i64,
    pub min_level: Level,
    pub rate_limit: Duration,
    pub message_format: String,
}

/// Maps the configuration file's Python-style level name (`WARNING`,
/// `CRITICAL`, ...) onto a `tracing::Level`. Unrecognized names fall back to
/// `WARN`, the configured default severity.
pub fn parse_level(name: &str) -> Level {
    match name.to_ascii_uppercase().as_str() {
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARNING" | "WARN" => Level::WARN,
        "ERROR" | "CRITICAL" | "FATAL" => Level::ERROR,
        "TRACE" => Level::TRACE,
        _ => Level::WARN,
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// Content-hash rate limiting plus the reentrancy guard that prevents a
/// notification send's own log output from re-triggering a notification.
pub struct NotificationLayer {
    config: NotificationConfig,
    gateway: Arc<GatewayClient>,
    seen: DashMap<String, Instant>,
    sending: Arc<AtomicBool>,
}

impl NotificationLayer {
    pub fn new(config: NotificationConfig, gateway: Arc<GatewayClient>) -> Self {
        Self {
            config,
            gateway,
            seen: DashMap::new(),
            sending: Arc::new(AtomicBool::new(false)),
        }
    }

    fn digest(message: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(message.as_bytes());
        hex::encode(hasher.finalize())[..8].to_string()
    }

    fn should_send(&self, digest: &str) -> bool {
        let now = Instant::now();
        match self.seen.get(digest) {
            Some(last) if now.duration_since(*last) < self.config.rate_limit => false,
            _ => {
                self.seen.insert(digest.to_string(), now);
                true
            }
        }
    }
}

impl<S: Subscriber> Layer<S> for NotificationLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.config.enabled {
            return;
        }
        if *event.metadata().level() > self.config.min_level {
            return;
        }
        if self.sending.load(Ordering::Relaxed) {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        if visitor.message.is_empty() {
            return;
        }

        let digest = Self::digest(&visitor.message);
        if !self.should_send(&digest) {
            return;
        }

        let formatted = self
            .config
            .message_format
            .replace("{level}", &event.metadata().level().to_string())
            .replace("{message}", &visitor.message);

        let gateway = self.gateway.clone();
        let admin_id = self.config.admin_id;
        let sending = self.sending.clone();

        tokio::spawn(async move {
            sending.store(true, Ordering::Relaxed);
            let _ = gateway
                .send(
                    "send_private_msg",
                    serde_json::json!({"user_id": admin_id, "message": bf_dispatch::text_segments(&formatted)}),
                )
                .await;
            sending.store(false, Ordering::Relaxed);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_is_rate_limited() {
        let config = NotificationConfig {
            enabled: true,
            admin_id: 1,
            min_level: Level::WARN,
            rate_limit: Duration::from_secs(300),
            message_format: "[{level}] {message}".to_string(),
        };
        let gateway = Arc::new(GatewayClient::new(bf_dispatch::GatewayConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            status_path: "get_status".to_string(),
            timeout_seconds: 1,
            max_retries: 1,
        }));
        let layer = NotificationLayer::new(config, gateway);
        let digest = NotificationLayer::digest("boom");
        assert!(layer.should_send(&digest));
        assert!(!layer.should_send(&digest));
    }

    #[test]
    fn distinct_content_is_independent() {
        let config = NotificationConfig {
            enabled: true,
            admin_id: 1,
            min_level: Level::WARN,
            rate_limit: Duration::from_secs(300),
            message_format: "[{level}] {message}".to_string(),
        };
        let gateway = Arc::new(GatewayClient::new(bf_dispatch::GatewayConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            status_path: "get_status".to_string(),
            timeout_seconds: 1,
            max_retries: 1,
        }));
        let layer = NotificationLayer::new(config, gateway);
        assert!(layer.should_send(&NotificationLayer::digest("boom")));
        assert!(layer.should_send(&NotificationLayer::digest("crash")));
    }
}
