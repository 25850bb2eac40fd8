// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Session Repository
//!
//! Sessions live in the `sessions` table; the cached capability snapshot is a
//! `jsonb` column in the same wire shape the API hands to clients.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, SessionRepository};
use crate::domain::role::UserId;
use crate::domain::session::{Session, SessionId, SessionSnapshot};

pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn session_from_row(row: &PgRow) -> Result<Session, RepositoryError> {
        let snapshot: serde_json::Value = row.try_get("snapshot")?;
        Ok(Session {
            id: SessionId(row.try_get("id")?),
            user_id: UserId(row.try_get("user_id")?),
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            snapshot: serde_json::from_value::<SessionSnapshot>(snapshot)?,
        })
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        let snapshot = serde_json::to_value(&session.snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, created_at, expires_at, snapshot)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                expires_at = EXCLUDED.expires_at,
                snapshot = EXCLUDED.snapshot
            "#,
        )
        .bind(session.id.0)
        .bind(session.user_id.0)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(snapshot)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, expires_at, snapshot FROM sessions WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::session_from_row).transpose()
    }

    async fn store_snapshot(
        &self,
        id: SessionId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), RepositoryError> {
        let snapshot = serde_json::to_value(snapshot)?;

        let result = sqlx::query("UPDATE sessions SET snapshot = $2 WHERE id = $1")
            .bind(id.0)
            .bind(snapshot)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("session {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
