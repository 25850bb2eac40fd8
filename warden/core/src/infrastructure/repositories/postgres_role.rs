// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Role Repository
//!
//! Reads the `roles` table. [`PostgresRoleRepository::upsert`] lets the CLI
//! sync the configured role catalog before seeding.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, RoleRepository};
use crate::domain::role::{Role, RoleId, RoleKey};

pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, role: &Role) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, key, label, level, scope)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO UPDATE SET
                label = EXCLUDED.label,
                level = EXCLUDED.level,
                scope = EXCLUDED.scope
            "#,
        )
        .bind(role.id.0)
        .bind(role.key.as_str())
        .bind(&role.label)
        .bind(role.level)
        .bind(&role.scope)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn role_from_row(row: &PgRow) -> Result<Role, RepositoryError> {
        Ok(Role {
            id: RoleId(row.try_get("id")?),
            key: RoleKey::new(row.try_get::<String, _>("key")?),
            label: row.try_get("label")?,
            level: row.try_get("level")?,
            scope: row.try_get("scope")?,
        })
    }
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn find_by_key(&self, key: &RoleKey) -> Result<Option<Role>, RepositoryError> {
        let row = sqlx::query("SELECT id, key, label, level, scope FROM roles WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::role_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Role>, RepositoryError> {
        let rows = sqlx::query("SELECT id, key, label, level, scope FROM roles ORDER BY level, key")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::role_from_row).collect()
    }
}
