//! The real `BotContext` implementation linked into plugin workers.
//!
//! Every capability call opens a fresh, short-lived connection (sqlite or
//! HTTP) rather than sharing a handle with the host process — workers are a
//! separate OS process and must not depend on host-owned state surviving
//! across the call.

use async_trait::async_trait;
use bf_common::worker_protocol::CapabilityConnInfo;
use bf_common::{AskrError, BotContext, Result};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, Row, SqliteConnection};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub struct WorkerBotContext {
    plugin_name: String,
    conn_info: CapabilityConnInfo,
}

impl WorkerBotContext {
    pub fn new(plugin_name: String, conn_info: CapabilityConnInfo) -> Self {
        Self {
            plugin_name,
            conn_info,
        }
    }

    async fn open_db(&self) -> Result<SqliteConnection> {
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            self.conn_info.history_db_path
        ))
        .map_err(AskrError::Database)?
        .journal_mode(SqliteJournalMode::Wal);

        SqliteConnection::connect_with(&options)
            .await
            .map_err(AskrError::Database)
    }
}

#[async_trait]
impl BotContext for WorkerBotContext {
    async fn history(&self, scope: &str, key: Option<&str>, limit: u32) -> Result<Vec<Value>> {
        let mut conn = self.open_db().await?;
        let limit_clause = if limit == 0 {
            String::new()
        } else {
            format!(" LIMIT {limit}")
        };

        let (query, identifier): (String, Option<i64>) = match scope {
            "private" => (
                format!(
                    "SELECT EVENT_KIND, PAYLOAD, CREATED_AT FROM FRIEND_EVENTS WHERE USER_ID = ? ORDER BY CREATED_AT DESC{limit_clause}"
                ),
                key.and_then(|k| k.parse().ok()),
            ),
            "group" => (
                format!(
                    "SELECT EVENT_KIND, PAYLOAD, CREATED_AT FROM GROUP_EVENTS WHERE GROUP_ID = ? ORDER BY CREATED_AT DESC{limit_clause}"
                ),
                key.and_then(|k| k.parse().ok()),
            ),
            _ => (
                format!(
                    "SELECT EVENT_KIND, PAYLOAD, CREATED_AT FROM OTHER_EVENTS ORDER BY CREATED_AT DESC{limit_clause}"
                ),
                None,
            ),
        };

        let mut q = sqlx::query(&query);
        if scope == "private" || scope == "group" {
            q = q.bind(identifier.unwrap_or_default());
        }

        let rows = q.fetch_all(&mut conn).await.map_err(AskrError::Database)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let event_kind: String = row.get("EVENT_KIND");
            let payload_str: String = row.get("PAYLOAD");
            match serde_json::from_str::<Value>(&payload_str) {
                Ok(payload) => out.push(serde_json::json!({
                    "event_kind": event_kind,
                    "payload": payload,
                })),
                Err(e) => warn!(error = %e, "skipping corrupt history row in worker read"),
            }
        }
        Ok(out)
    }

    async fn config_read(&self, plugin_name: &str) -> Result<Value> {
        let name = if plugin_name.is_empty() {
            &self.plugin_name
        } else {
            plugin_name
        };
        if name.is_empty() {
            return Ok(Value::Object(Default::default()));
        }

        let mut conn = self.open_db().await?;
        let row = sqlx::query("SELECT CONFIG_DATA FROM PLUGIN_CONFIGS WHERE PLUGIN_NAME = ?")
            .bind(name)
            .fetch_optional(&mut conn)
            .await
            .map_err(AskrError::Database)?;

        match row {
            Some(row) => {
                let data: String = row.get("CONFIG_DATA");
                Ok(serde_json::from_str(&data).unwrap_or(Value::Object(Default::default())))
            }
            None => Ok(Value::Object(Default::default())),
        }
    }

    async fn config_write(&self, plugin_name: &str, data: Value) -> Result<()> {
        let name = if plugin_name.is_empty() {
            self.plugin_name.clone()
        } else {
            plugin_name.to_string()
        };
        let data_str = serde_json::to_string(&data).map_err(AskrError::Serialization)?;
        let now = chrono::Utc::now().timestamp_millis();

        let mut conn = self.open_db().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO PLUGIN_CONFIGS (PLUGIN_NAME, CONFIG_DATA, CREATED_AT, UPDATED_AT) \
             VALUES (?, ?, COALESCE((SELECT CREATED_AT FROM PLUGIN_CONFIGS WHERE PLUGIN_NAME = ?), ?), ?)",
        )
        .bind(&name)
        .bind(&data_str)
        .bind(&name)
        .bind(now)
        .bind(now)
        .execute(&mut conn)
        .await
        .map_err(AskrError::Database)?;

        Ok(())
    }

    async fn api_call(&self, action: &str, data: Value) -> Result<Value> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.conn_info.http_timeout_seconds))
            .build()
            .map_err(AskrError::Http)?;

        let url = format!(
            "{}/{}",
            self.conn_info.gateway_base_url.trim_end_matches('/'),
            action
        );

        match client.post(&url).json(&data).send().await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(v) => Ok(v),
                Err(e) => {
                    warn!(error = %e, action, "api_call returned unparseable body");
                    Ok(Value::Null)
                }
            },
            Err(e) => {
                warn!(error = %e, action, "api_call failed");
                Ok(Value::Null)
            }
        }
    }
}
