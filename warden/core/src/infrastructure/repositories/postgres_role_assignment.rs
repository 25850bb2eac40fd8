// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Role Assignment Repository
//!
//! Read-only user → role membership from the `user_roles` table, which the
//! account system owns.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::repository::{RepositoryError, RoleAssignmentRepository};
use crate::domain::role::{RoleKey, UserId};

pub struct PostgresRoleAssignmentRepository {
    pool: PgPool,
}

impl PostgresRoleAssignmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleAssignmentRepository for PostgresRoleAssignmentRepository {
    async fn find_role_keys_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RoleKey>, RepositoryError> {
        let rows =
            sqlx::query("SELECT role_key FROM user_roles WHERE user_id = $1 ORDER BY role_key")
                .bind(user_id.0)
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|row| Ok(RoleKey::new(row.try_get::<String, _>("role_key")?)))
            .collect()
    }
}
