// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL backend for the local record store.
//!
//! One table holds every collection; record fields live in a JSON text
//! column so schemaless upstream payloads fit without migrations:
//!
//! ```sql
//! CREATE TABLE records (
//!   collection VARCHAR(128) NOT NULL,
//!   id         VARCHAR(64)  NOT NULL,
//!   fields     LONGTEXT     NOT NULL,  -- JSON object
//!   updated_at BIGINT       NOT NULL,  -- epoch millis
//!   PRIMARY KEY (collection, id)
//! )
//! ```
//!
//! Filters are applied after loading a collection, through the same
//! normalized equality the engine uses, so `year = 2025` matches rows
//! whose JSON holds `2025.0`.
//!
//! ## sqlx Any Driver Quirks
//!
//! MySQL `LONGTEXT` comes back as bytes through the `Any` driver, so text
//! columns are read as `String` first and `Vec<u8>` second.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{any::AnyPoolOptions, AnyPool, Row};
use tracing::{debug, warn};

use super::traits::{Filter, RecordHandle, RecordStore, StorageError, StoredRecord};
use crate::resilience::retry::{retry, RetryConfig};
use crate::value::Fields;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

pub struct SqlStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlStore {
    /// Connect with startup-mode retry (fails fast if config is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(if is_sqlite { 1 } else { 10 })
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, is_sqlite };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = if self.is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#
        } else {
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection VARCHAR(128) NOT NULL,
                id VARCHAR(64) NOT NULL,
                fields LONGTEXT NOT NULL,
                updated_at BIGINT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#
        };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    fn encode(fields: &Fields) -> String {
        fields.to_json().to_string()
    }

    fn decode(collection: &str, id: &str, raw: &str) -> Result<Fields, StorageError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| StorageError::Decode {
                collection: collection.to_string(),
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        if !value.is_object() {
            return Err(StorageError::Decode {
                collection: collection.to_string(),
                id: id.to_string(),
                reason: "fields column is not a JSON object".to_string(),
            });
        }
        Ok(Fields::from_json(&value))
    }

    /// Read a text column as String (SQLite TEXT) or bytes (MySQL LONGTEXT).
    fn text_column(row: &sqlx::any::AnyRow, column: &str) -> Option<String> {
        row.try_get::<String, _>(column).ok().or_else(|| {
            row.try_get::<Vec<u8>, _>(column)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
    }

    async fn load_fields(&self, handle: &RecordHandle) -> Result<Fields, StorageError> {
        let row = sqlx::query("SELECT fields FROM records WHERE collection = ? AND id = ?")
            .bind(&handle.collection)
            .bind(&handle.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(handle.to_string()))?;

        let raw = Self::text_column(&row, "fields").unwrap_or_default();
        Self::decode(&handle.collection, &handle.id, &raw)
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: &str) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let count: i64 = row.try_get("cnt").unwrap_or(0);
        Ok(count as u64)
    }
}

#[async_trait]
impl RecordStore for SqlStore {
    async fn query_by_filter(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let rows = retry("sql_query", &RetryConfig::query(), || async {
            sqlx::query("SELECT id, fields FROM records WHERE collection = ? ORDER BY id")
                .bind(collection)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = Self::text_column(&row, "id").unwrap_or_default();
            let raw = Self::text_column(&row, "fields").unwrap_or_default();
            // A corrupt row is logged and left alone; with no key it is never an orphan
            let fields = match Self::decode(collection, &id, &raw) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(collection, id = %id, error = %e, "Skipping undecodable row");
                    continue;
                }
            };
            if filter.matches(&fields) {
                out.push(StoredRecord {
                    handle: RecordHandle::new(collection, id),
                    fields,
                });
            }
        }
        debug!(collection, filter = %filter, matched = out.len(), "SQL query");
        Ok(out)
    }

    async fn insert(&self, collection: &str, fields: &Fields) -> Result<RecordHandle, StorageError> {
        let id = Self::new_id();
        let payload = Self::encode(fields);
        let now = Self::now_millis();

        sqlx::query("INSERT INTO records (collection, id, fields, updated_at) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(&payload)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(RecordHandle::new(collection, id))
    }

    async fn update_fields(&self, handle: &RecordHandle, fields: &Fields) -> Result<(), StorageError> {
        // Read-merge-write keeps fields the caller did not mention
        let mut current = self.load_fields(handle).await?;
        current.merge_from(fields);
        let payload = Self::encode(&current);
        let now = Self::now_millis();

        let result = sqlx::query("UPDATE records SET fields = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(&payload)
            .bind(now)
            .bind(&handle.collection)
            .bind(&handle.id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(handle.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, handle: &RecordHandle) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(&handle.collection)
            .bind(&handle.id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(handle.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    async fn temp_store(dir: &tempfile::TempDir, name: &str) -> SqlStore {
        let path = dir.path().join(format!("{}.db", name));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        SqlStore::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir, "round_trip").await;

        let fields = Fields::new()
            .with("name", "Spring")
            .with("year", 2025)
            .with("tags", vec!["a".to_string(), "b".to_string()]);
        let handle = store.insert("sessions", &fields).await.unwrap();

        let records = store.query_by_filter("sessions", &Filter::all()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].handle, handle);
        assert_eq!(records[0].fields, fields);
    }

    #[tokio::test]
    async fn test_undecodable_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir, "corrupt").await;

        store.insert("sessions", &Fields::new().with("name", "ok")).await.unwrap();
        for (id, payload) in [("bad-json", "{not json"), ("bad-shape", "[1,2]")] {
            sqlx::query("INSERT INTO records (collection, id, fields, updated_at) VALUES (?, ?, ?, ?)")
                .bind("sessions")
                .bind(id)
                .bind(payload)
                .bind(0_i64)
                .execute(&store.pool)
                .await
                .unwrap();
        }

        let records = store.query_by_filter("sessions", &Filter::all()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields.get("name"), Some(&FieldValue::from("ok")));
        assert_eq!(store.count("sessions").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_filter_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir, "filter").await;

        store.insert("sessions", &Fields::new().with("year", 2024)).await.unwrap();
        store.insert("sessions", &Fields::new().with("year", 2025.0)).await.unwrap();
        store.insert("divisions", &Fields::new().with("year", 2025)).await.unwrap();

        let hits = store.query_by_filter("sessions", &Filter::year(2025)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.count("sessions").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir, "update").await;

        let handle = store
            .insert("sessions", &Fields::new().with("name", "A").with("notes", "local"))
            .await
            .unwrap();
        store
            .update_fields(&handle, &Fields::new().with("name", "B"))
            .await
            .unwrap();

        let records = store.query_by_filter("sessions", &Filter::all()).await.unwrap();
        assert_eq!(records[0].fields.get("name"), Some(&FieldValue::from("B")));
        assert_eq!(records[0].fields.get("notes"), Some(&FieldValue::from("local")));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir, "delete").await;

        let handle = store.insert("sessions", &Fields::new().with("name", "A")).await.unwrap();
        store.delete(&handle).await.unwrap();
        assert_eq!(store.count("sessions").await.unwrap(), 0);

        let again = store.delete(&handle).await;
        assert!(matches!(again, Err(StorageError::NotFound(_))));
    }
}
