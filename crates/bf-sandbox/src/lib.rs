//! Isolated worker-process execution with enforced resource caps.

use async_trait::async_trait;
use bf_common::worker_protocol::{CapabilityConnInfo, WorkerRequest, WorkerResponse};
use bf_registry::{HandlerRef, InitializerRunner};
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerCaps {
    pub max_cpu_time_seconds: f64,
    pub max_wall_time_seconds: f64,
    pub memory_limit_mb: u64,
    pub monitor_interval_seconds: f64,
}

impl Default for WorkerCaps {
    fn default() -> Self {
        Self {
            max_cpu_time_seconds: 3.0,
            max_wall_time_seconds: 30.0,
            memory_limit_mb: 100,
            monitor_interval_seconds: 0.1,
        }
    }
}

/// The disposition of one handler invocation, matching the source
/// framework's four outcomes exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Value(Value),
    Error { message: String, kind: String },
    CapBreach(CapBreachCause),
    NoResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapBreachCause {
    CpuTimeExceeded,
    WallTimeExceeded,
    MemoryExceeded,
}

pub struct SandboxRunner {
    worker_binary_path: PathBuf,
    caps: WorkerCaps,
}

impl SandboxRunner {
    pub fn new(worker_binary_path: PathBuf, caps: WorkerCaps) -> Self {
        Self {
            worker_binary_path,
            caps,
        }
    }

    /// Spawn a worker process for one handler invocation, monitor it at the
    /// configured poll interval, and return its disposition.
    pub async fn run(
        &self,
        handler: &HandlerRef,
        event_kind: &str,
        simple_event: Option<Value>,
        raw_event: Value,
        conn_info: CapabilityConnInfo,
    ) -> Disposition {
        let request = WorkerRequest {
            plugin_path: handler.plugin_path.to_string_lossy().to_string(),
            symbol_name: handler.symbol.clone(),
            event_kind: event_kind.to_string(),
            simple_event,
            raw_event,
            conn_info,
        };

        let request_line = match serde_json::to_string(&request) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to serialize worker request");
                return Disposition::Error {
                    message: e.to_string(),
                    kind: "SerializationError".to_string(),
                };
            }
        };

        let mut child = match Command::new(&self.worker_binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to spawn worker process");
                return Disposition::Error {
                    message: e.to_string(),
                    kind: "SpawnError".to_string(),
                };
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(request_line.as_bytes()).await {
                warn!(error = %e, "failed writing request to worker stdin");
            }
            let _ = stdin.write_all(b"\n").await;
            drop(stdin);
        }

        let stdout = child.stdout.take().expect("stdout was piped");
        let mut lines = BufReader::new(stdout).lines();

        let pid = child.id();
        let started = Instant::now();
        let poll = Duration::from_secs_f64(self.caps.monitor_interval_seconds.max(0.001));
        let wall_cap = Duration::from_secs_f64(self.caps.max_wall_time_seconds);

        let mut sys = System::new();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let status = child.wait().await;
                    return match (line, status) {
                        (Ok(Some(line)), _) => parse_worker_response(&line),
                        (Ok(None), _) | (Err(_), _) => Disposition::NoResult,
                    };
                }
                _ = tokio::time::sleep(poll) => {
                    if started.elapsed() >= wall_cap {
                        terminate(&mut child).await;
                        warn!(plugin_id = %handler.plugin_id, "wall_time_exceeded");
                        return Disposition::CapBreach(CapBreachCause::WallTimeExceeded);
                    }

                    if let Some(pid) = pid {
                        sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
                        if let Some(proc) = sys.process(Pid::from_u32(pid)) {
                            let cpu_seconds = proc.accumulated_cpu_time() as f64 / 1000.0;
                            if cpu_seconds >= self.caps.max_cpu_time_seconds {
                                terminate(&mut child).await;
                                warn!(plugin_id = %handler.plugin_id, "cpu_time_exceeded");
                                return Disposition::CapBreach(CapBreachCause::CpuTimeExceeded);
                            }

                            let rss_mb = proc.memory() / (1024 * 1024);
                            if rss_mb >= self.caps.memory_limit_mb {
                                terminate(&mut child).await;
                                warn!(plugin_id = %handler.plugin_id, "memory_exceeded");
                                return Disposition::CapBreach(CapBreachCause::MemoryExceeded);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn parse_worker_response(line: &str) -> Disposition {
    match serde_json::from_str::<WorkerResponse>(line) {
        Ok(WorkerResponse::Ok { result }) => Disposition::Value(result),
        Ok(WorkerResponse::Err { error, error_type }) => Disposition::Error {
            message: error,
            kind: error_type,
        },
        Err(e) => {
            error!(error = %e, line, "worker produced unparseable response");
            Disposition::NoResult
        }
    }
}

async fn terminate(child: &mut tokio::process::Child) {
    if let Some(id) = child.id() {
        info!(pid = id, "terminating worker on cap breach");
    }
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "failed to send kill signal to worker");
    }
    let _ = tokio::time::timeout(Duration::from_secs(1), child.wait()).await;
}

/// Bridges the registry's initializer-invocation needs onto the same
/// worker-process isolation every other handler invocation uses.
pub struct SandboxInitializerRunner {
    pub runner: SandboxRunner,
    pub conn_info: CapabilityConnInfo,
}

#[async_trait]
impl InitializerRunner for SandboxInitializerRunner {
    async fn run_initializer(&self, handler: &HandlerRef) -> bool {
        let disposition = self
            .runner
            .run(handler, "INITIALIZER", None, Value::Null, self.conn_info.clone())
            .await;
        match disposition {
            Disposition::Value(Value::Null) => true,
            Disposition::Value(_) => {
                warn!(plugin_id = %handler.plugin_id, "initializer returned non-null value, treating as failure");
                false
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_response() {
        let line = r#"{"result": {"foo": "bar"}}"#;
        match parse_worker_response(line) {
            Disposition::Value(v) => assert_eq!(v["foo"], "bar"),
            other => panic!("unexpected disposition: {other:?}"),
        }
    }

    #[test]
    fn parses_error_response() {
        let line = r#"{"error": "boom", "error_type": "ValueError"}"#;
        match parse_worker_response(line) {
            Disposition::Error { message, kind } => {
                assert_eq!(message, "boom");
                assert_eq!(kind, "ValueError");
            }
            other => panic!("unexpected disposition: {other:?}"),
        }
    }
}
