//! Minute-boundary-aligned periodic handler dispatch.

use bf_admin::MuteFlag;
use bf_common::worker_protocol::CapabilityConnInfo;
use bf_dispatch::{OutboundParser, ParallelDispatcher};
use bf_registry::PluginRegistry;
use bf_sandbox::SandboxRunner;
use chrono::{Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A small fixed buffer added past the minute boundary to avoid boundary
/// races with the gateway's own clock.
const WAKE_BUFFER_SECONDS: u32 = 3;

pub struct Scheduler {
    registry: Arc<RwLock<PluginRegistry>>,
    sandbox: Arc<SandboxRunner>,
    gateway: Arc<bf_dispatch::GatewayClient>,
    mute_flag: Arc<MuteFlag>,
    conn_info: CapabilityConnInfo,
    wall_time_cap: Duration,
}

impl Scheduler {
    pub fn new(
        registry: Arc<RwLock<PluginRegistry>>,
        sandbox: Arc<SandboxRunner>,
        gateway: Arc<bf_dispatch::GatewayClient>,
        mute_flag: Arc<MuteFlag>,
        conn_info: CapabilityConnInfo,
        wall_time_cap: Duration,
    ) -> Self {
        Self {
            registry,
            sandbox,
            gateway,
            mute_flag,
            conn_info,
            wall_time_cap,
        }
    }

    /// Run forever: sleep to the next minute boundary plus a small buffer,
    /// then dispatch every periodic handler whose interval divides the
    /// current minute. Skips the wake entirely while muted.
    pub async fn run(&self) {
        loop {
            let seconds_to_next_minute = seconds_until_next_minute_plus_buffer();
            tokio::time::sleep(Duration::from_secs(seconds_to_next_minute)).await;

            if self.mute_flag.is_muted() {
                debug!("scheduler wake skipped, muted");
                continue;
            }

            let current_minute = Utc::now().minute();
            let registry = self.registry.read().await;
            let due: Vec<_> = registry
                .periodic_handlers()
                .iter()
                .filter(|p| current_minute % (p.interval as u32) == 0)
                .map(|p| p.handler.clone())
                .collect();
            drop(registry);

            if due.is_empty() {
                continue;
            }

            info!(count = due.len(), minute = current_minute, "dispatching periodic handlers");

            let outbound = OutboundParser::new(&self.gateway);
            let dispatcher = ParallelDispatcher::new(&self.sandbox, &outbound);
            let raw_event = serde_json::json!({
                "post_type": "unconditional",
                "time": Utc::now().timestamp(),
            });

            dispatcher
                .dispatch(&due, "UNCONDITIONAL", None, raw_event, self.conn_info.clone(), self.wall_time_cap)
                .await;
        }
    }
}

fn seconds_until_next_minute_plus_buffer() -> u64 {
    let now = Utc::now();
    (60 - now.second() + WAKE_BUFFER_SECONDS) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_added_past_the_boundary() {
        assert!(seconds_until_next_minute_plus_buffer() <= 63);
        assert!(seconds_until_next_minute_plus_buffer() >= 1);
    }
}
