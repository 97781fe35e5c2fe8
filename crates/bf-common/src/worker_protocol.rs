//! Wire contract between the host process and a spawned plugin worker.
//!
//! A worker process receives exactly one [`WorkerRequest`] as a single JSON
//! line on stdin and writes exactly one [`WorkerResponse`] as a single JSON
//! line on stdout before exiting. Anything else written to stdout (plugin
//! `print` calls and the like) is the worker's own responsibility to avoid.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection parameters a worker needs to open its own short-lived
/// capability connections; never a live handle, since the worker is a
/// separate process from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConnInfo {
    pub history_db_path: String,
    pub gateway_base_url: String,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub plugin_path: String,
    pub symbol_name: String,
    pub event_kind: String,
    pub simple_event: Option<Value>,
    pub raw_event: Value,
    pub conn_info: CapabilityConnInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerResponse {
    Ok { result: Value },
    Err { error: String, error_type: String },
}
