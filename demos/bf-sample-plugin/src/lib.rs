//! A tabletop dice-roller: a minimal reference plugin showing the cdylib
//! ABI contract (JSON-in/JSON-out C strings) and the `bf-sdk` capability
//! bundle in use.

use bf_common::worker_protocol::WorkerRequest;
use serde_json::Value;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Every exported handler receives one JSON-encoded [`WorkerRequest`] as a
/// C string and returns one JSON-encoded result (or `{"_error", "_type"}`)
/// as a C string the host frees via [`bf_free_cstring`].
fn respond(value: Value) -> *mut c_char {
    let body = serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string());
    CString::new(body)
        .unwrap_or_else(|_| CString::new("null").unwrap())
        .into_raw()
}

fn error_response(message: &str, kind: &str) -> *mut c_char {
    respond(serde_json::json!({"_error": message, "_type": kind}))
}

fn parse_request(request_json: *const c_char) -> Result<WorkerRequest, String> {
    if request_json.is_null() {
        return Err("null request pointer".to_string());
    }
    let raw = unsafe { CStr::from_ptr(request_json) }.to_string_lossy();
    serde_json::from_str(&raw).map_err(|e| format!("invalid request JSON: {e}"))
}

/// Parses a `NdM` dice expression (e.g. `r 2d20`, `.r d6`). Returns
/// `(count, sides)` or `None` if the command text isn't a roll.
fn parse_roll_command(text: &str) -> Option<(u32, u32)> {
    let trimmed = text.trim_start_matches(['.', '/', '\\']).trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next()?;
    if !command.eq_ignore_ascii_case("r") && !command.eq_ignore_ascii_case("roll") {
        return None;
    }
    let expr = parts.next().unwrap_or("1d6").trim();

    let (count_str, sides_str) = expr.split_once(['d', 'D'])?;
    let count = if count_str.is_empty() {
        1
    } else {
        count_str.parse().ok()?
    };
    let sides: u32 = sides_str.trim().parse().ok()?;
    if count == 0 || count > 100 || sides == 0 || sides > 1000 {
        return None;
    }
    Some((count, sides))
}

fn roll(count: u32, sides: u32) -> (Vec<u32>, u32) {
    let rolls: Vec<u32> = (0..count)
        .map(|_| rand::random::<u32>() % sides + 1)
        .collect();
    let total = rolls.iter().sum();
    (rolls, total)
}

/// `INITIALIZER` entry: seeds this plugin's persisted config on first boot.
/// Returning `null` signals success to the registry.
#[no_mangle]
pub extern "C" fn on_init(request_json: *const c_char) -> *mut c_char {
    let request = match parse_request(request_json) {
        Ok(r) => r,
        Err(e) => return error_response(&e, "RequestParseError"),
    };

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => return error_response(&e.to_string(), "RuntimeError"),
    };

    let result = rt.block_on(async {
        let bot = bf_sdk::WorkerBotContext::new("dice".to_string(), request.conn_info.clone());
        let existing = bf_common::BotContext::config_read(&bot, "dice").await.unwrap_or(Value::Null);
        if existing == Value::Object(Default::default()) || existing.is_null() {
            let _ = bf_common::BotContext::config_write(&bot, "dice", serde_json::json!({"default_sides": 6})).await;
        }
    });
    let _ = result;

    respond(Value::Null)
}

/// Handles `.r`/`.roll` style commands in both group-bot-command and
/// private messages.
#[no_mangle]
pub extern "C" fn on_roll_command(request_json: *const c_char) -> *mut c_char {
    let request = match parse_request(request_json) {
        Ok(r) => r,
        Err(e) => return error_response(&e, "RequestParseError"),
    };

    let text = request
        .simple_event
        .as_ref()
        .and_then(|e| e.get("text_message"))
        .and_then(Value::as_str)
        .unwrap_or("");

    match parse_roll_command(text) {
        Some((count, sides)) => {
            let (rolls, total) = roll(count, sides);
            respond(Value::String(format!("{rolls:?} = {total}")))
        }
        None => respond(Value::Null),
    }
}

/// Frees a C string previously returned by one of this plugin's exports.
#[no_mangle]
pub extern "C" fn bf_free_cstring(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_roll_expression() {
        assert_eq!(parse_roll_command(".r 2d20"), Some((2, 20)));
    }

    #[test]
    fn parses_bare_die_with_implicit_count() {
        assert_eq!(parse_roll_command("/roll d6"), Some((1, 6)));
    }

    #[test]
    fn non_roll_text_returns_none() {
        assert_eq!(parse_roll_command("hello there"), None);
    }

    #[test]
    fn rejects_absurd_counts() {
        assert_eq!(parse_roll_command(".r 999d6"), None);
    }

    #[test]
    fn roll_produces_values_in_range() {
        let (rolls, total) = roll(5, 6);
        assert_eq!(rolls.len(), 5);
        assert!(rolls.iter().all(|&r| (1..=6).contains(&r)));
        assert_eq!(total, rolls.iter().sum::<u32>());
    }
}
