//! Agent registry: the last file server address each user's agent announced

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::AgentRecord;

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Record (or refresh) the agent address for `user_id`.
    async fn announce(&self, user_id: &str, base_url: &str, seen_at: i64) -> Result<AgentRecord>;

    async fn find(&self, user_id: &str) -> Result<Option<AgentRecord>>;
}

/// SQLite implementation of [`AgentRepository`]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn announce(&self, user_id: &str, base_url: &str, seen_at: i64) -> Result<AgentRecord> {
        sqlx::query(
            r#"
            INSERT INTO agents (user_id, base_url, last_seen) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                base_url = excluded.base_url,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(user_id)
        .bind(base_url)
        .bind(seen_at)
        .execute(&self.pool)
        .await?;

        Ok(AgentRecord {
            user_id: user_id.to_string(),
            base_url: base_url.to_string(),
            last_seen: seen_at,
        })
    }

    async fn find(&self, user_id: &str) -> Result<Option<AgentRecord>> {
        let row: Option<(String, String, i64)> =
            sqlx::query_as("SELECT user_id, base_url, last_seen FROM agents WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(user_id, base_url, last_seen)| AgentRecord {
            user_id,
            base_url,
            last_seen,
        }))
    }
}
