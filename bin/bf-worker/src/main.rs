//! Isolated handler-invocation worker.
//!
//! Reads exactly one [`WorkerRequest`] as a JSON line on stdin, loads the
//! named plugin's shared object, calls the named exported symbol with the
//! request serialized as a C string, and writes exactly one
//! [`WorkerResponse`] as a JSON line on stdout before exiting. This process
//! is the real isolation boundary: a fresh process image per invocation,
//! sharing no mutable state with the host.

use bf_common::worker_protocol::{WorkerRequest, WorkerResponse};
use serde_json::Value;
use std::ffi::{CStr, CString};
use std::io::{self, BufRead, Write};
use std::os::raw::c_char;

type PluginEntryPoint = unsafe extern "C" fn(*const c_char) -> *mut c_char;

fn main() {
    bf_common::logging::init_logging();

    let response = match read_request() {
        Ok(request) => invoke(request),
        Err(e) => WorkerResponse::Err {
            error: e,
            error_type: "WorkerProtocolError".to_string(),
        },
    };

    let line = serde_json::to_string(&response).expect("WorkerResponse always serializes");
    println!("{line}");
    io::stdout().flush().ok();
}

fn read_request() -> Result<WorkerRequest, String> {
    let stdin = io::stdin();
    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("failed to read request from stdin: {e}"))?;
    serde_json::from_str(&line).map_err(|e| format!("failed to parse worker request: {e}"))
}

fn invoke(request: WorkerRequest) -> WorkerResponse {
    let library = match unsafe { libloading::Library::new(&request.plugin_path) } {
        Ok(lib) => lib,
        Err(e) => {
            return WorkerResponse::Err {
                error: format!("failed to load plugin library: {e}"),
                error_type: "PluginLoadError".to_string(),
            }
        }
    };

    let symbol: libloading::Symbol<PluginEntryPoint> =
        match unsafe { library.get(request.symbol_name.as_bytes()) } {
            Ok(sym) => sym,
            Err(e) => {
                return WorkerResponse::Err {
                    error: format!("symbol '{}' not found: {e}", request.symbol_name),
                    error_type: "SymbolNotFoundError".to_string(),
                }
            }
        };

    let request_json = match serde_json::to_string(&request) {
        Ok(s) => s,
        Err(e) => {
            return WorkerResponse::Err {
                error: format!("failed to serialize request for plugin: {e}"),
                error_type: "SerializationError".to_string(),
            }
        }
    };

    let c_request = match CString::new(request_json) {
        Ok(c) => c,
        Err(e) => {
            return WorkerResponse::Err {
                error: format!("request JSON contained an interior nul byte: {e}"),
                error_type: "EncodingError".to_string(),
            }
        }
    };

    let call_result = std::panic::catch_unwind(|| unsafe { symbol(c_request.as_ptr()) });

    let raw_ptr = match call_result {
        Ok(ptr) => ptr,
        Err(_) => {
            return WorkerResponse::Err {
                error: "plugin handler panicked".to_string(),
                error_type: "PluginPanic".to_string(),
            }
        }
    };

    if raw_ptr.is_null() {
        return WorkerResponse::Err {
            error: "plugin handler returned a null response".to_string(),
            error_type: "PluginNullResponse".to_string(),
        };
    }

    let response_str = unsafe {
        let s = CStr::from_ptr(raw_ptr).to_string_lossy().into_owned();
        // The plugin's sibling `bf_free_cstring` export owns deallocation
        // of memory it allocated with `CString::into_raw`.
        if let Ok(free_fn) = library.get::<unsafe extern "C" fn(*mut c_char)>(b"bf_free_cstring") {
            free_fn(raw_ptr);
        }
        s
    };

    parse_plugin_response(&response_str)
}

fn parse_plugin_response(raw: &str) -> WorkerResponse {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            return WorkerResponse::Err {
                error: format!("plugin returned invalid JSON: {e}"),
                error_type: "InvalidPluginResponse".to_string(),
            }
        }
    };

    if let Value::Object(map) = &value {
        if let Some(error) = map.get("_error").and_then(Value::as_str) {
            let error_type = map
                .get("_type")
                .and_then(Value::as_str)
                .unwrap_or("Error")
                .to_string();
            return WorkerResponse::Err {
                error: error.to_string(),
                error_type,
            };
        }
    }

    WorkerResponse::Ok { result: value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_sentinel_becomes_err_response() {
        let raw = r#"{"_error": "boom", "_type": "ValueError"}"#;
        match parse_plugin_response(raw) {
            WorkerResponse::Err { error, error_type } => {
                assert_eq!(error, "boom");
                assert_eq!(error_type, "ValueError");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn plain_value_becomes_ok_response() {
        let raw = r#"{"text": "hello"}"#;
        match parse_plugin_response(raw) {
            WorkerResponse::Ok { result } => assert_eq!(result["text"], "hello"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
