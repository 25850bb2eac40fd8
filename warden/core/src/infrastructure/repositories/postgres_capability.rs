// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Capability Repository
//!
//! `CapabilityRepository` backed by the `capabilities` and `role_capabilities`
//! tables. Both writes are `INSERT ... ON CONFLICT DO UPDATE`, so reseeding an
//! unchanged manifest set leaves the tables as they were. Revoked grants are
//! removed per capability with a single `DELETE`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::capability::{
    Capability, CapabilityKey, CapabilityValue, PluginId, RoleGrant, UnknownCapabilityValue,
};
use crate::domain::repository::{CapabilityRepository, RepositoryError, StoredAssignment};
use crate::domain::role::RoleId;

pub struct PostgresCapabilityRepository {
    pool: PgPool,
}

impl PostgresCapabilityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn capability_from_row(row: &PgRow) -> Result<Capability, RepositoryError> {
        let tags: serde_json::Value = row.try_get("tags")?;
        let assignments: serde_json::Value = row.try_get("assignments")?;

        Ok(Capability {
            key: CapabilityKey::new(row.try_get::<String, _>("key")?),
            description: row.try_get("description")?,
            scope: row.try_get("scope")?,
            category: row.try_get("category")?,
            tags: serde_json::from_value(tags)?,
            metadata: row.try_get("metadata")?,
            source: PluginId::new(row.try_get::<String, _>("source")?),
            namespace: row.try_get("namespace")?,
            assignments: serde_json::from_value::<Vec<RoleGrant>>(assignments)?,
        })
    }
}

fn parse_value(raw: &str) -> Result<CapabilityValue, RepositoryError> {
    raw.parse()
        .map_err(|e: UnknownCapabilityValue| RepositoryError::Serialization(e.to_string()))
}

#[async_trait]
impl CapabilityRepository for PostgresCapabilityRepository {
    async fn upsert_capability(&self, capability: &Capability) -> Result<(), RepositoryError> {
        let tags = serde_json::to_value(&capability.tags)?;
        let assignments = serde_json::to_value(&capability.assignments)?;

        sqlx::query(
            r#"
            INSERT INTO capabilities (
                key, description, scope, category, tags, metadata,
                source, namespace, assignments, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (key) DO UPDATE SET
                description = EXCLUDED.description,
                scope = EXCLUDED.scope,
                category = EXCLUDED.category,
                tags = EXCLUDED.tags,
                metadata = EXCLUDED.metadata,
                source = EXCLUDED.source,
                namespace = EXCLUDED.namespace,
                assignments = EXCLUDED.assignments,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(capability.key.as_str())
        .bind(&capability.description)
        .bind(&capability.scope)
        .bind(&capability.category)
        .bind(tags)
        .bind(&capability.metadata)
        .bind(capability.source.as_str())
        .bind(&capability.namespace)
        .bind(assignments)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_assignment(
        &self,
        role_id: RoleId,
        capability: &CapabilityKey,
        value: CapabilityValue,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO role_capabilities (role_id, capability_key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (role_id, capability_key) DO UPDATE SET
                value = EXCLUDED.value
            "#,
        )
        .bind(role_id.0)
        .bind(capability.as_str())
        .bind(value.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn retain_assignments(
        &self,
        capability: &CapabilityKey,
        keep: &[RoleId],
    ) -> Result<u64, RepositoryError> {
        let keep: Vec<uuid::Uuid> = keep.iter().map(|id| id.0).collect();

        let result = sqlx::query(
            r#"
            DELETE FROM role_capabilities
            WHERE capability_key = $1 AND role_id <> ALL($2)
            "#,
        )
        .bind(capability.as_str())
        .bind(&keep)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_by_key(
        &self,
        key: &CapabilityKey,
    ) -> Result<Option<Capability>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT key, description, scope, category, tags, metadata, source, namespace, assignments
            FROM capabilities
            WHERE key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::capability_from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Capability>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT key, description, scope, category, tags, metadata, source, namespace, assignments
            FROM capabilities
            ORDER BY key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::capability_from_row).collect()
    }

    async fn find_grants_for_role(
        &self,
        role_id: RoleId,
    ) -> Result<Vec<(CapabilityKey, CapabilityValue)>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT capability_key, value
            FROM role_capabilities
            WHERE role_id = $1
            ORDER BY capability_key
            "#,
        )
        .bind(role_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let key: String = row.try_get("capability_key")?;
                let value: String = row.try_get("value")?;
                Ok((CapabilityKey::new(key), parse_value(&value)?))
            })
            .collect()
    }

    async fn list_assignments(&self) -> Result<Vec<StoredAssignment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT role_id, capability_key, value
            FROM role_capabilities
            ORDER BY role_id, capability_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role_id: uuid::Uuid = row.try_get("role_id")?;
                let key: String = row.try_get("capability_key")?;
                let value: String = row.try_get("value")?;
                Ok(StoredAssignment {
                    role_id: RoleId(role_id),
                    capability: CapabilityKey::new(key),
                    value: parse_value(&value)?,
                })
            })
            .collect()
    }
}
