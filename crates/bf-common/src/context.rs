//! The capability surface handlers receive instead of ambient globals.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// The four capabilities a handler may invoke, implemented by `bf-sdk`
/// against a short-lived sqlite connection and reqwest client opened fresh
/// per call rather than a long-lived pool shared with the host process.
///
/// This replaces the source framework's parameter-name introspection
/// (inspecting a handler's signature to decide which keyword arguments to
/// supply): a handler built on `bf-sdk` builds its own implementation
/// directly and calls into it explicitly.
#[async_trait]
pub trait BotContext: Send + Sync {
    /// Query recorded history for the given scope. `limit` bounds the number
    /// of rows returned, most recent first.
    async fn history(&self, scope: &str, key: Option<&str>, limit: u32) -> Result<Vec<Value>>;

    /// Read this plugin's persisted configuration blob, or `{}` if none
    /// exists, the plugin name is empty, or the stored JSON is invalid.
    async fn config_read(&self, plugin_name: &str) -> Result<Value>;

    /// Upsert this plugin's configuration blob.
    async fn config_write(&self, plugin_name: &str, data: Value) -> Result<()>;

    /// Forward an action payload to the gateway and return its response.
    async fn api_call(&self, action: &str, data: Value) -> Result<Value>;
}
