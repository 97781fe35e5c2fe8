//! Embedded event history store and per-plugin configuration persistence.
//!
//! Three partitioned event tables (friend/group/other scope) plus one
//! plugin-config table, all in a single SQLite file opened in WAL mode.
//! Archival retries transient lock errors three times with a one-second
//! backoff; hard failures are logged and the record is dropped rather than
//! blocking the dispatch pipeline.

use bf_common::EventKind;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// The three archival partitions, chosen per event kind and presence of
/// `user_id`/`group_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Friend,
    Group,
    Other,
}

/// Classify an event into its archival scope. Returns `None` only for
/// `NOTICE_INPUT_STATUS`, which is never archived.
pub fn scope_for(kind: EventKind, user_id: Option<i64>, group_id: Option<i64>) -> Option<Scope> {
    use EventKind::*;
    match kind {
        NoticeInputStatus => None,
        MessagePrivate | NoticeFriendRecall | NoticeFriendAdd | NoticeProfileLike => {
            if user_id.is_some() {
                Some(Scope::Friend)
            } else {
                Some(Scope::Other)
            }
        }
        MessageGroup
        | MessageGroupMention
        | MessageGroupBot
        | NoticeGroupRecall
        | NoticeGroupIncrease
        | NoticeGroupDecrease
        | NoticeGroupAdmin
        | NoticeGroupBan
        | NoticeGroupUpload
        | NoticeGroupCard
        | NoticeEssence
        | NoticeGroupMsgEmojiLike
        | NoticeGroupName
        | NoticeGroupTitle => {
            if group_id.is_some() {
                Some(Scope::Group)
            } else {
                Some(Scope::Other)
            }
        }
        NoticePoke => {
            if group_id.is_some() {
                Some(Scope::Group)
            } else if user_id.is_some() {
                Some(Scope::Friend)
            } else {
                Some(Scope::Other)
            }
        }
        _ => Some(Scope::Other),
    }
}

/// Query-facing scope selector, distinct from the archival [`Scope`] only in
/// name — handlers ask for `private`/`group`/`other` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    Private,
    Group,
    Other,
}

impl FromStr for QueryScope {
    type Err = HistoryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "private" => Ok(QueryScope::Private),
            "group" => Ok(QueryScope::Group),
            _ => Ok(QueryScope::Other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub event_kind: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

pub struct HistoryStore {
    pool: SqlitePool,
}

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

impl HistoryStore {
    /// Open (creating if absent) the store file and initialize its schema.
    /// Startup failure here is fatal to the host process.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS FRIEND_EVENTS (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                USER_ID INTEGER NOT NULL,
                EVENT_KIND TEXT NOT NULL,
                PAYLOAD TEXT NOT NULL,
                CREATED_AT INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS IDX_FRIEND_USER ON FRIEND_EVENTS(USER_ID, CREATED_AT DESC);

            CREATE TABLE IF NOT EXISTS GROUP_EVENTS (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                GROUP_ID INTEGER NOT NULL,
                USER_ID INTEGER,
                EVENT_KIND TEXT NOT NULL,
                PAYLOAD TEXT NOT NULL,
                CREATED_AT INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS IDX_GROUP_ID ON GROUP_EVENTS(GROUP_ID, CREATED_AT DESC);
            CREATE INDEX IF NOT EXISTS IDX_GROUP_USER ON GROUP_EVENTS(GROUP_ID, USER_ID, CREATED_AT DESC);

            CREATE TABLE IF NOT EXISTS OTHER_EVENTS (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                EVENT_KIND TEXT NOT NULL,
                PAYLOAD TEXT NOT NULL,
                CREATED_AT INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS IDX_OTHER_TYPE ON OTHER_EVENTS(EVENT_KIND, CREATED_AT DESC);

            CREATE TABLE IF NOT EXISTS PLUGIN_CONFIGS (
                PLUGIN_NAME TEXT PRIMARY KEY,
                CONFIG_DATA TEXT NOT NULL,
                CREATED_AT INTEGER NOT NULL,
                UPDATED_AT INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Archive one classified event. Retries transient lock errors; logs and
    /// drops the record on hard failure rather than propagating it.
    pub async fn record(
        &self,
        kind: EventKind,
        user_id: Option<i64>,
        group_id: Option<i64>,
        payload: &Value,
    ) {
        let scope = match scope_for(kind, user_id, group_id) {
            Some(s) => s,
            None => return,
        };

        let now = Utc::now().timestamp_millis();
        let payload_str = match serde_json::to_string(payload) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to serialize event payload for archival");
                return;
            }
        };

        for attempt in 1..=MAX_RETRIES {
            let result = self
                .write_once(scope, kind, user_id, group_id, &payload_str, now)
                .await;
            match result {
                Ok(()) => return,
                Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                    warn!(attempt, error = %e, "transient error archiving event, retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => {
                    error!(error = %e, "failed to archive event, dropping record");
                    return;
                }
            }
        }
    }

    async fn write_once(
        &self,
        scope: Scope,
        kind: EventKind,
        user_id: Option<i64>,
        group_id: Option<i64>,
        payload_str: &str,
        now: i64,
    ) -> Result<()> {
        match scope {
            Scope::Friend => {
                sqlx::query(
                    "INSERT INTO FRIEND_EVENTS (USER_ID, EVENT_KIND, PAYLOAD, CREATED_AT) VALUES (?, ?, ?, ?)",
                )
                .bind(user_id.unwrap_or_default())
                .bind(kind.as_str())
                .bind(payload_str)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            Scope::Group => {
                sqlx::query(
                    "INSERT INTO GROUP_EVENTS (GROUP_ID, USER_ID, EVENT_KIND, PAYLOAD, CREATED_AT) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(group_id.unwrap_or_default())
                .bind(user_id)
                .bind(kind.as_str())
                .bind(payload_str)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            Scope::Other => {
                sqlx::query(
                    "INSERT INTO OTHER_EVENTS (EVENT_KIND, PAYLOAD, CREATED_AT) VALUES (?, ?, ?)",
                )
                .bind(kind.as_str())
                .bind(payload_str)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Query history for a scope/identifier. `count == 0` means "all rows".
    /// Results are chronological ascending regardless of storage order; rows
    /// with corrupt JSON payloads are skipped with a warning.
    pub async fn history(
        &self,
        scope: QueryScope,
        identifier: Option<i64>,
        count: u32,
    ) -> Result<Vec<HistoryRecord>> {
        let limit_clause = if count == 0 {
            String::new()
        } else {
            format!(" LIMIT {count}")
        };

        let rows = match scope {
            QueryScope::Private => {
                let query = format!(
                    "SELECT EVENT_KIND, PAYLOAD, CREATED_AT FROM FRIEND_EVENTS \
                     WHERE USER_ID = ? ORDER BY CREATED_AT DESC{limit_clause}"
                );
                sqlx::query(&query)
                    .bind(identifier.unwrap_or_default())
                    .fetch_all(&self.pool)
                    .await?
            }
            QueryScope::Group => {
                let query = format!(
                    "SELECT EVENT_KIND, PAYLOAD, CREATED_AT FROM GROUP_EVENTS \
                     WHERE GROUP_ID = ? ORDER BY CREATED_AT DESC{limit_clause}"
                );
                sqlx::query(&query)
                    .bind(identifier.unwrap_or_default())
                    .fetch_all(&self.pool)
                    .await?
            }
            QueryScope::Other => {
                let query = format!(
                    "SELECT EVENT_KIND, PAYLOAD, CREATED_AT FROM OTHER_EVENTS \
                     ORDER BY CREATED_AT DESC{limit_clause}"
                );
                sqlx::query(&query).fetch_all(&self.pool).await?
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let event_kind: String = row.get("EVENT_KIND");
            let payload_str: String = row.get("PAYLOAD");
            let created_at_ms: i64 = row.get("CREATED_AT");

            let payload = match serde_json::from_str::<Value>(&payload_str) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, event_kind = %event_kind, "skipping corrupt history row");
                    continue;
                }
            };
            let created_at = match DateTime::from_timestamp_millis(created_at_ms) {
                Some(dt) => dt,
                None => {
                    warn!(event_kind = %event_kind, "skipping history row with invalid timestamp");
                    continue;
                }
            };

            records.push(HistoryRecord {
                event_kind,
                payload,
                created_at,
            });
        }

        records.reverse();
        Ok(records)
    }

    /// Read a plugin's config blob, or `{}` if absent, the name is empty, or
    /// the stored JSON is invalid.
    pub async fn config_read(&self, plugin_name: &str) -> Result<Value> {
        if plugin_name.is_empty() {
            return Ok(Value::Object(Default::default()));
        }

        let row = sqlx::query("SELECT CONFIG_DATA FROM PLUGIN_CONFIGS WHERE PLUGIN_NAME = ?")
            .bind(plugin_name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("CONFIG_DATA");
                Ok(serde_json::from_str(&data).unwrap_or_else(|e| {
                    warn!(error = %e, plugin_name, "invalid stored config JSON, returning empty object");
                    Value::Object(Default::default())
                }))
            }
            None => Ok(Value::Object(Default::default())),
        }
    }

    /// Upsert a plugin's config blob. `CREATED_AT` is preserved across
    /// updates via `COALESCE` against the existing row.
    pub async fn config_write(&self, plugin_name: &str, data: &Value) -> Result<()> {
        let data_str = serde_json::to_string(data)?;
        let now = Utc::now().timestamp_millis();

        for attempt in 1..=MAX_RETRIES {
            let result = sqlx::query(
                "INSERT OR REPLACE INTO PLUGIN_CONFIGS (PLUGIN_NAME, CONFIG_DATA, CREATED_AT, UPDATED_AT) \
                 VALUES (?, ?, COALESCE((SELECT CREATED_AT FROM PLUGIN_CONFIGS WHERE PLUGIN_NAME = ?), ?), ?)",
            )
            .bind(plugin_name)
            .bind(&data_str)
            .bind(plugin_name)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    debug!(plugin_name, "config written");
                    return Ok(());
                }
                Err(e) if is_transient(&HistoryError::Database(e)) && attempt < MAX_RETRIES => {
                    warn!(attempt, plugin_name, "transient error writing config, retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("loop always returns or errors before exhausting retries")
    }
}

fn is_transient(err: &HistoryError) -> bool {
    match err {
        HistoryError::Database(sqlx::Error::Database(db_err)) => {
            let msg = db_err.message();
            msg.contains("database is locked") || msg.contains("database table is locked")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn open_store() -> HistoryStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let store = HistoryStore::open(path.to_str().unwrap()).await.unwrap();
        std::mem::forget(dir);
        store
    }

    #[tokio::test]
    async fn records_and_queries_friend_scope() {
        let store = open_store().await;
        store
            .record(EventKind::MessagePrivate, Some(1), None, &json!({"text": "hi"}))
            .await;
        let rows = store.history(QueryScope::Private, Some(1), 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_kind, "MESSAGE_PRIVATE");
    }

    #[tokio::test]
    async fn input_status_is_never_archived() {
        let store = open_store().await;
        store
            .record(EventKind::NoticeInputStatus, Some(1), None, &json!({}))
            .await;
        let rows = store.history(QueryScope::Private, Some(1), 0).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn config_write_preserves_created_at_across_updates() {
        let store = open_store().await;
        store.config_write("dice", &json!({"sides": 6})).await.unwrap();
        let row = sqlx::query("SELECT CREATED_AT FROM PLUGIN_CONFIGS WHERE PLUGIN_NAME = 'dice'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let first_created: i64 = row.get("CREATED_AT");

        tokio::time::sleep(Duration::from_millis(5)).await;
        store.config_write("dice", &json!({"sides": 20})).await.unwrap();
        let row = sqlx::query("SELECT CREATED_AT, CONFIG_DATA FROM PLUGIN_CONFIGS WHERE PLUGIN_NAME = 'dice'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let second_created: i64 = row.get("CREATED_AT");
        assert_eq!(first_created, second_created);
    }

    #[tokio::test]
    async fn config_read_returns_empty_object_for_missing_plugin() {
        let store = open_store().await;
        let value = store.config_read("nonexistent").await.unwrap();
        assert_eq!(value, json!({}));
    }
}
