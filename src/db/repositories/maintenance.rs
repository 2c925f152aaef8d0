//! Maintenance record repository
//!
//! Database operations for maintenance records.
//!
//! This module provides:
//! - `MaintenanceRepository` trait defining the interface for record data access
//! - `SqlxMaintenanceRepository` implementing the trait for SQLite
//!
//! The checklist is stored as a JSON object in a single column; unknown or
//! missing fields deserialize to their defaults.

use crate::models::{Checklist, MaintenanceRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Maintenance record repository trait
#[async_trait]
pub trait MaintenanceRepository: Send + Sync {
    /// Create a new maintenance record
    async fn create(&self, record: &MaintenanceRecord) -> Result<MaintenanceRecord>;

    /// Get maintenance record by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<MaintenanceRecord>>;

    /// List records for a vehicle, most recent work first
    async fn list_by_vehicle(&self, vehicle_id: i64) -> Result<Vec<MaintenanceRecord>>;

    /// Get the most recent record for a vehicle
    async fn latest_for_vehicle(&self, vehicle_id: i64) -> Result<Option<MaintenanceRecord>>;

    /// Delete a maintenance record
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based maintenance record repository implementation
pub struct SqlxMaintenanceRepository {
    pool: SqlitePool,
}

impl SqlxMaintenanceRepository {
    /// Create a new SQLx maintenance record repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn MaintenanceRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MaintenanceRepository for SqlxMaintenanceRepository {
    async fn create(&self, record: &MaintenanceRecord) -> Result<MaintenanceRecord> {
        let now = Utc::now();
        let checklist_json =
            serde_json::to_string(&record.checklist).context("Failed to serialize checklist")?;

        let result = sqlx::query(
            r#"
            INSERT INTO maintenance_records (vehicle_id, performed_on, odometer, checklist, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.vehicle_id)
        .bind(record.performed_on)
        .bind(record.odometer)
        .bind(&checklist_json)
        .bind(&record.notes)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create maintenance record")?;

        let id = result.last_insert_rowid();

        Ok(MaintenanceRecord {
            id,
            vehicle_id: record.vehicle_id,
            performed_on: record.performed_on,
            odometer: record.odometer,
            checklist: record.checklist.clone(),
            notes: record.notes.clone(),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<MaintenanceRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, vehicle_id, performed_on, odometer, checklist, notes, created_at
            FROM maintenance_records
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get maintenance record by ID")?;

        match row {
            Some(row) => Ok(Some(row_to_record(&row))),
            None => Ok(None),
        }
    }

    async fn list_by_vehicle(&self, vehicle_id: i64) -> Result<Vec<MaintenanceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vehicle_id, performed_on, odometer, checklist, notes, created_at
            FROM maintenance_records
            WHERE vehicle_id = ?
            ORDER BY performed_on DESC, id DESC
            "#,
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list maintenance records")?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn latest_for_vehicle(&self, vehicle_id: i64) -> Result<Option<MaintenanceRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, vehicle_id, performed_on, odometer, checklist, notes, created_at
            FROM maintenance_records
            WHERE vehicle_id = ?
            ORDER BY performed_on DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get latest maintenance record")?;

        match row {
            Some(row) => Ok(Some(row_to_record(&row))),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM maintenance_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete maintenance record")?;

        Ok(())
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> MaintenanceRecord {
    let checklist_str: String = row.get("checklist");
    let checklist: Checklist = serde_json::from_str(&checklist_str).unwrap_or_default();

    MaintenanceRecord {
        id: row.get("id"),
        vehicle_id: row.get("vehicle_id"),
        performed_on: row.get("performed_on"),
        odometer: row.get("odometer"),
        checklist,
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}
