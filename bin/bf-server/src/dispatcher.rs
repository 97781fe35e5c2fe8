//! The event-driven control flow: admin short-circuit, mute check,
//! classification, archival, handler lookup, fan-out dispatch.

use crate::bootstrap::AppState;
use bf_common::event::classify;
use bf_common::simple_event::build_simple_event;
use bf_common::EventKind;
use bf_dispatch::{OutboundParser, ParallelDispatcher};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub async fn dispatch(state: Arc<AppState>, raw_event: Value) {
    if state.admin_channel.try_handle(&raw_event, &state.mute_flag) {
        return;
    }

    if state.mute_flag.is_muted() {
        debug!("dispatch skipped, muted");
        return;
    }

    let kind = classify(&raw_event);
    if kind == EventKind::Unexpected {
        return;
    }

    let simple_event = build_simple_event(kind, &raw_event);

    let user_id = raw_event.get("user_id").and_then(Value::as_i64);
    let group_id = raw_event.get("group_id").and_then(Value::as_i64);
    state.history.record(kind, user_id, group_id, &raw_event).await;

    let handlers = state.registry.read().await.handlers_for(kind);
    if handlers.is_empty() {
        return;
    }

    let gateway = state.gateway.clone();
    let outbound = OutboundParser::new(&gateway);
    let dispatcher = ParallelDispatcher::new(&state.sandbox, &outbound);

    let simple_event_json = simple_event.map(|e| serde_json::to_value(e).unwrap_or(Value::Null));
    let wall_time_cap = Duration::from_secs_f64(state.config.handler_caps.max_wall_time_seconds);

    dispatcher
        .dispatch(
            &handlers,
            kind.as_str(),
            simple_event_json,
            raw_event,
            state.conn_info.clone(),
            wall_time_cap,
        )
        .await;
}
