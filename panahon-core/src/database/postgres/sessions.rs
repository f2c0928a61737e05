use async_trait::async_trait;
use uuid::Uuid;

use super::PostgresStore;
use crate::{
    auth::session::{NewSession, Session},
    database::{StoreError, StoreResult, ports::SessionRepository},
};

const SESSION_COLUMNS: &str = r#"
    id,
    user_id AS subject_id,
    refresh_token_id,
    user_agent,
    client_ip,
    is_blocked,
    expires_at,
    created_at
"#;

#[async_trait]
impl SessionRepository for PostgresStore {
    async fn create_session(&self, session: &NewSession) -> StoreResult<Session> {
        let query = format!(
            r#"
            INSERT INTO sessions (
                id,
                user_id,
                refresh_token_id,
                user_agent,
                client_ip,
                expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SESSION_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, Session>(&query)
            .bind(session.id)
            .bind(session.subject_id)
            .bind(session.refresh_token_id)
            .bind(&session.user_agent)
            .bind(&session.client_ip)
            .bind(session.expires_at)
            .fetch_one(self.pool())
            .await?;

        Ok(row)
    }

    async fn get_session_by_id(&self, id: Uuid) -> StoreResult<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");

        let row = sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row)
    }

    async fn block_session(&self, id: Uuid) -> StoreResult<Session> {
        let query = format!(
            r#"
            UPDATE sessions
            SET is_blocked = TRUE
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)
    }
}
