//! Fans one event out to every matching handler concurrently.

use crate::outbound::OutboundParser;
use bf_common::worker_protocol::CapabilityConnInfo;
use bf_registry::HandlerRef;
use bf_sandbox::{Disposition, SandboxRunner};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub struct ParallelDispatcher<'a> {
    sandbox: &'a SandboxRunner,
    outbound: &'a OutboundParser<'a>,
}

impl<'a> ParallelDispatcher<'a> {
    pub fn new(sandbox: &'a SandboxRunner, outbound: &'a OutboundParser<'a>) -> Self {
        Self { sandbox, outbound }
    }

    /// Run every handler in `handlers` concurrently against `raw_event`.
    /// Results are routed to the outbound parser in completion order; the
    /// returned vector preserves original handler order for callers that
    /// need it. Waits at most `wall_time_cap + 5s` for the whole batch.
    pub async fn dispatch(
        &self,
        handlers: &[HandlerRef],
        event_kind: &str,
        simple_event: Option<Value>,
        raw_event: Value,
        conn_info: CapabilityConnInfo,
        wall_time_cap: Duration,
    ) -> Vec<Option<Disposition>> {
        if handlers.is_empty() {
            return Vec::new();
        }

        let mut ordered: Vec<Option<Disposition>> = vec![None; handlers.len()];

        let mut in_flight: FuturesUnordered<_> = handlers
            .iter()
            .enumerate()
            .map(|(index, handler)| {
                let simple_event = simple_event.clone();
                let raw_event = raw_event.clone();
                let conn_info = conn_info.clone();
                async move {
                    let disposition = self
                        .sandbox
                        .run(handler, event_kind, simple_event, raw_event, conn_info)
                        .await;
                    (index, disposition)
                }
            })
            .collect();

        let deadline = wall_time_cap + Duration::from_secs(5);
        let all_done = async {
            while let Some((index, disposition)) = in_flight.next().await {
                if let Disposition::Value(value) = &disposition {
                    self.outbound.handle(value, &raw_event).await;
                } else if let Disposition::Error { message, kind } = &disposition {
                    warn!(kind, message, "handler raised, treated as no outbound action");
                }
                ordered[index] = Some(disposition);
            }
        };

        if tokio::time::timeout(deadline, all_done).await.is_err() {
            warn!("parallel dispatch timed out waiting for all handlers to complete");
        }

        ordered
    }
}
