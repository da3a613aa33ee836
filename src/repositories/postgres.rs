use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;

use super::store::{Store, StoreError, StoreEvent, Subscription};

/// [Store] over a single `documents` table, one JSONB row per path.
#[derive(Clone)]
pub struct PgStore {
    conn: PgPool,
    events: broadcast::Sender<StoreEvent>,
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

impl PgStore {
    pub fn new(conn: PgPool) -> Self {
        let (events, _) = broadcast::channel(512);

        Self { conn, events }
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
                CREATE TABLE IF NOT EXISTS documents (
                    path TEXT PRIMARY KEY,
                    parent TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
                )
            "#,
        )
        .execute(&self.conn)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS documents_parent_idx ON documents (parent)")
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    fn rows_to_documents(
        path: &str,
        rows: Vec<sqlx::postgres::PgRow>,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        rows.into_iter()
            .map(|row| {
                let key: String = row.try_get("key").map_err(|e| read_error(path, e))?;
                let value: Value = row.try_get("value").map_err(|e| read_error(path, e))?;
                Ok((key, value))
            })
            .collect()
    }
}

fn read_error(path: &str, e: sqlx::Error) -> StoreError {
    StoreError::Read {
        path: path.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT value FROM documents WHERE path = $1")
            .bind(path)
            .fetch_optional(&self.conn)
            .await
            .map_err(|e| read_error(path, e))?;

        row.map(|row| row.try_get::<Value, _>("value"))
            .transpose()
            .map_err(|e| read_error(path, e))
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let (parent, key) = split_path(path);

        sqlx::query(
            r#"
                INSERT INTO documents (path, parent, key, value)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (path)
                DO UPDATE SET value = EXCLUDED.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(path)
        .bind(parent)
        .bind(key)
        .bind(&value)
        .execute(&self.conn)
        .await
        .map_err(|e| StoreError::Write {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let _ = self.events.send(StoreEvent {
            path: path.to_string(),
            value,
        });

        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let parent = path.trim_end_matches('/');
        let rows = sqlx::query(
            "SELECT key, value FROM documents WHERE parent = $1 ORDER BY created_at, key",
        )
        .bind(parent)
        .fetch_all(&self.conn)
        .await
        .map_err(|e| read_error(path, e))?;

        Self::rows_to_documents(path, rows)
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let rows = sqlx::query(
            "SELECT key, value FROM documents WHERE parent = $1 AND value ->> $2 = $3 ORDER BY created_at, key",
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.conn)
        .await
        .map_err(|e| read_error(collection, e))?;

        Self::rows_to_documents(collection, rows)
    }

    /// Only writes issued through this instance are observed.
    fn subscribe(&self, path: &str) -> Subscription {
        Subscription::new(path, self.events.subscribe())
    }
}
