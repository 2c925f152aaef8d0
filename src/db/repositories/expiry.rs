//! Expiry repository
//!
//! Database operations for vehicle expiries.
//!
//! This module provides:
//! - `ExpiryRepository` trait defining the interface for expiry data access
//! - `SqlxExpiryRepository` implementing the trait for SQLite

use crate::models::Expiry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Expiry repository trait
#[async_trait]
pub trait ExpiryRepository: Send + Sync {
    /// Create a new expiry
    async fn create(&self, expiry: &Expiry) -> Result<Expiry>;

    /// Get expiry by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Expiry>>;

    /// List expiries for a vehicle, soonest due first
    async fn list_by_vehicle(&self, vehicle_id: i64) -> Result<Vec<Expiry>>;

    /// Delete an expiry
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based expiry repository implementation
pub struct SqlxExpiryRepository {
    pool: SqlitePool,
}

impl SqlxExpiryRepository {
    /// Create a new SQLx expiry repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn ExpiryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ExpiryRepository for SqlxExpiryRepository {
    async fn create(&self, expiry: &Expiry) -> Result<Expiry> {
        let now = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO expiries (vehicle_id, kind, due_on, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(expiry.vehicle_id)
        .bind(&expiry.kind)
        .bind(expiry.due_on)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create expiry")?;

        let id = result.last_insert_rowid();

        Ok(Expiry {
            id,
            vehicle_id: expiry.vehicle_id,
            kind: expiry.kind.clone(),
            due_on: expiry.due_on,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Expiry>> {
        let row = sqlx::query(
            r#"
            SELECT id, vehicle_id, kind, due_on, created_at
            FROM expiries
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get expiry by ID")?;

        match row {
            Some(row) => Ok(Some(row_to_expiry(&row))),
            None => Ok(None),
        }
    }

    async fn list_by_vehicle(&self, vehicle_id: i64) -> Result<Vec<Expiry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vehicle_id, kind, due_on, created_at
            FROM expiries
            WHERE vehicle_id = ?
            ORDER BY due_on ASC, id ASC
            "#,
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list expiries")?;

        Ok(rows.iter().map(row_to_expiry).collect())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM expiries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete expiry")?;

        Ok(())
    }
}

fn row_to_expiry(row: &sqlx::sqlite::SqliteRow) -> Expiry {
    Expiry {
        id: row.get("id"),
        vehicle_id: row.get("vehicle_id"),
        kind: row.get("kind"),
        due_on: row.get("due_on"),
        created_at: row.get("created_at"),
    }
}
