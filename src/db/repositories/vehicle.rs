//! Vehicle repository
//!
//! Database operations for vehicles.
//!
//! This module provides:
//! - `VehicleRepository` trait defining the interface for vehicle data access
//! - `SqlxVehicleRepository` implementing the trait for SQLite
//!
//! Photo filenames are stored as a JSON array in a single column.

use crate::models::Vehicle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Vehicle repository trait
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    /// Create a new vehicle
    async fn create(&self, vehicle: &Vehicle) -> Result<Vehicle>;

    /// Get vehicle by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Vehicle>>;

    /// Get vehicle by plate
    async fn get_by_plate(&self, plate: &str) -> Result<Option<Vehicle>>;

    /// List vehicles owned by a user, oldest first
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Vehicle>>;

    /// List all vehicles, oldest first
    async fn list_all(&self) -> Result<Vec<Vehicle>>;

    /// Update a vehicle
    async fn update(&self, vehicle: &Vehicle) -> Result<Vehicle>;

    /// Replace the photo list
    async fn update_photos(&self, id: i64, photos: &[String]) -> Result<()>;

    /// Replace the registration document filename
    async fn update_document(&self, id: i64, document: Option<&str>) -> Result<()>;

    /// Delete a vehicle
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based vehicle repository implementation
pub struct SqlxVehicleRepository {
    pool: SqlitePool,
}

impl SqlxVehicleRepository {
    /// Create a new SQLx vehicle repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn VehicleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl VehicleRepository for SqlxVehicleRepository {
    async fn create(&self, vehicle: &Vehicle) -> Result<Vehicle> {
        let now = Utc::now();
        let photos_json =
            serde_json::to_string(&vehicle.photos).context("Failed to serialize photos")?;

        let result = sqlx::query(
            r#"
            INSERT INTO vehicles (owner_id, plate, make, model, year, odometer, photos, document, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(vehicle.owner_id)
        .bind(&vehicle.plate)
        .bind(&vehicle.make)
        .bind(&vehicle.model)
        .bind(vehicle.year)
        .bind(vehicle.odometer)
        .bind(&photos_json)
        .bind(&vehicle.document)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create vehicle")?;

        let id = result.last_insert_rowid();

        Ok(Vehicle {
            id,
            owner_id: vehicle.owner_id,
            plate: vehicle.plate.clone(),
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
            year: vehicle.year,
            odometer: vehicle.odometer,
            photos: vehicle.photos.clone(),
            document: vehicle.document.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Vehicle>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, plate, make, model, year, odometer, photos, document, created_at, updated_at
            FROM vehicles
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get vehicle by ID")?;

        match row {
            Some(row) => Ok(Some(row_to_vehicle(&row))),
            None => Ok(None),
        }
    }

    async fn get_by_plate(&self, plate: &str) -> Result<Option<Vehicle>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, plate, make, model, year, odometer, photos, document, created_at, updated_at
            FROM vehicles
            WHERE plate = ?
            "#,
        )
        .bind(plate)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get vehicle by plate")?;

        match row {
            Some(row) => Ok(Some(row_to_vehicle(&row))),
            None => Ok(None),
        }
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Vehicle>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, plate, make, model, year, odometer, photos, document, created_at, updated_at
            FROM vehicles
            WHERE owner_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list vehicles by owner")?;

        Ok(rows.iter().map(row_to_vehicle).collect())
    }

    async fn list_all(&self) -> Result<Vec<Vehicle>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, plate, make, model, year, odometer, photos, document, created_at, updated_at
            FROM vehicles
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list vehicles")?;

        Ok(rows.iter().map(row_to_vehicle).collect())
    }

    async fn update(&self, vehicle: &Vehicle) -> Result<Vehicle> {
        let now = Utc::now();
        let photos_json =
            serde_json::to_string(&vehicle.photos).context("Failed to serialize photos")?;

        sqlx::query(
            r#"
            UPDATE vehicles
            SET plate = ?, make = ?, model = ?, year = ?, odometer = ?, photos = ?, document = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&vehicle.plate)
        .bind(&vehicle.make)
        .bind(&vehicle.model)
        .bind(vehicle.year)
        .bind(vehicle.odometer)
        .bind(&photos_json)
        .bind(&vehicle.document)
        .bind(now)
        .bind(vehicle.id)
        .execute(&self.pool)
        .await
        .context("Failed to update vehicle")?;

        self.get_by_id(vehicle.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Vehicle not found after update"))
    }

    async fn update_photos(&self, id: i64, photos: &[String]) -> Result<()> {
        let photos_json = serde_json::to_string(photos).context("Failed to serialize photos")?;

        sqlx::query("UPDATE vehicles SET photos = ?, updated_at = ? WHERE id = ?")
            .bind(&photos_json)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update vehicle photos")?;

        Ok(())
    }

    async fn update_document(&self, id: i64, document: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE vehicles SET document = ?, updated_at = ? WHERE id = ?")
            .bind(document)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update vehicle document")?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM vehicles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete vehicle")?;

        Ok(())
    }
}

fn row_to_vehicle(row: &sqlx::sqlite::SqliteRow) -> Vehicle {
    let photos_str: String = row.get("photos");
    let photos: Vec<String> = serde_json::from_str(&photos_str).unwrap_or_default();

    Vehicle {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        plate: row.get("plate"),
        make: row.get("make"),
        model: row.get("model"),
        year: row.get("year"),
        odometer: row.get("odometer"),
        photos,
        document: row.get("document"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
