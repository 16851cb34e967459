//! Chat log repository.

use super::store_error;
use async_trait::async_trait;
use parlance_conversation::{ChatLog, LOG_RETENTION_PER_SESSION, LogEntry, StoreError};
use rootcause::Report;
use sqlx::PgPool;
use tracing::instrument;

const STORE: &str = "chat log";

/// Chat log stored in the `chatlog` table.
pub struct PgChatLog {
    pool: PgPool,
}

impl PgChatLog {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatLog for PgChatLog {
    #[instrument(skip(self, entry), fields(session_id = %entry.session_id, role = entry.role.as_str()))]
    async fn append(&self, entry: LogEntry) -> Result<(), Report<StoreError>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error(STORE, e))?;

        sqlx::query(
            r#"
            INSERT INTO chatlog (session_id, sender_id, role, content, timestamp, tool_calls)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.session_id.as_str())
        .bind(&entry.sender_id)
        .bind(entry.role.as_str())
        .bind(&entry.content)
        .bind(entry.timestamp)
        .bind(&entry.tool_calls)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error(STORE, e))?;

        sqlx::query(
            r#"
            DELETE FROM chatlog WHERE id IN (
                SELECT id FROM (
                    SELECT id, ROW_NUMBER() OVER (
                        PARTITION BY session_id ORDER BY timestamp DESC, id DESC
                    ) AS rn
                    FROM chatlog
                    WHERE session_id = $1
                ) ranked
                WHERE rn > $2
            )
            "#,
        )
        .bind(entry.session_id.as_str())
        .bind(LOG_RETENTION_PER_SESSION as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error(STORE, e))?;

        tx.commit().await.map_err(|e| store_error(STORE, e))?;
        Ok(())
    }
}
