//! SQLite storage backend.

use apiary_core::config::{shellexpand, StorageConfig};
use apiary_core::error::{ApiaryError, Result};
use apiary_core::traits::Storage;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS bot_memory (
    scope TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope, key)
);";

/// Durable bot memory backed by SQLite.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database and ensure the schema exists.
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let db_path = shellexpand(&config.db_path);

        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ApiaryError::Storage(format!("failed to create data dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| ApiaryError::Storage(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| ApiaryError::Storage(format!("failed to connect to sqlite: {e}")))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| ApiaryError::Storage(format!("failed to create schema: {e}")))?;

        info!("bot memory store initialized at {db_path}");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create(&self, scope: &str, key: &str, value: Value) -> Result<Value> {
        let encoded = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO bot_memory (scope, key, value, updated_at)
             VALUES (?, ?, ?, datetime('now'))
             ON CONFLICT(scope, key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(scope)
        .bind(key)
        .bind(&encoded)
        .execute(&self.pool)
        .await
        .map_err(|e| ApiaryError::Storage(format!("write failed for {scope}/{key}: {e}")))?;
        Ok(value)
    }

    async fn read(&self, scope: &str, key: Option<&str>) -> Result<Value> {
        match key {
            Some(k) => {
                let row: Option<(String,)> =
                    sqlx::query_as("SELECT value FROM bot_memory WHERE scope = ? AND key = ?")
                        .bind(scope)
                        .bind(k)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(|e| {
                            ApiaryError::Storage(format!("read failed for {scope}/{k}: {e}"))
                        })?;

                let (encoded,) = row
                    .ok_or_else(|| ApiaryError::Storage(format!("no value for {scope}/{k}")))?;
                Ok(serde_json::from_str(&encoded)?)
            }
            None => {
                let rows: Vec<(String, String)> =
                    sqlx::query_as("SELECT key, value FROM bot_memory WHERE scope = ?")
                        .bind(scope)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(|e| {
                            ApiaryError::Storage(format!("read failed for scope {scope}: {e}"))
                        })?;

                if rows.is_empty() {
                    return Err(ApiaryError::Storage(format!("no data for scope {scope}")));
                }

                let mut entries = Map::new();
                for (k, encoded) in rows {
                    entries.insert(k, serde_json::from_str(&encoded)?);
                }
                Ok(Value::Object(entries))
            }
        }
    }

    async fn delete(&self, scope: &str, key: Option<&str>) -> Result<()> {
        let result = match key {
            Some(k) => {
                sqlx::query("DELETE FROM bot_memory WHERE scope = ? AND key = ?")
                    .bind(scope)
                    .bind(k)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM bot_memory WHERE scope = ?")
                    .bind(scope)
                    .execute(&self.pool)
                    .await
            }
        };
        result.map_err(|e| ApiaryError::Storage(format!("delete failed for {scope}: {e}")))?;
        Ok(())
    }
}
