//! Maintenance service
//!
//! Business logic for workshop records. Every operation goes through the
//! vehicle access check: admins reach any vehicle's history, members only
//! their own.

use crate::db::repositories::{MaintenanceRepository, VehicleRepository};
use crate::models::{CreateMaintenanceInput, MaintenanceRecord, User, Vehicle};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;

/// Error types for maintenance service operations
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Vehicle or record not found, or not accessible to this user
    #[error("Not found")]
    NotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Maintenance service for workshop records
pub struct MaintenanceService {
    maintenance_repo: Arc<dyn MaintenanceRepository>,
    vehicle_repo: Arc<dyn VehicleRepository>,
}

impl MaintenanceService {
    /// Create a new maintenance service
    pub fn new(
        maintenance_repo: Arc<dyn MaintenanceRepository>,
        vehicle_repo: Arc<dyn VehicleRepository>,
    ) -> Self {
        Self {
            maintenance_repo,
            vehicle_repo,
        }
    }

    /// Add a maintenance record to a vehicle
    pub async fn add_record(
        &self,
        actor: &User,
        vehicle_id: i64,
        input: CreateMaintenanceInput,
    ) -> Result<MaintenanceRecord, MaintenanceServiceError> {
        let vehicle = self.accessible_vehicle(actor, vehicle_id).await?;

        if input.odometer < 0 {
            return Err(MaintenanceServiceError::ValidationError(
                "Odometer cannot be negative".to_string(),
            ));
        }

        let record = MaintenanceRecord {
            id: 0,
            vehicle_id: vehicle.id,
            performed_on: input.performed_on,
            odometer: input.odometer,
            checklist: input.checklist,
            notes: input.notes.trim().to_string(),
            created_at: Utc::now(),
        };

        let created = self
            .maintenance_repo
            .create(&record)
            .await
            .context("Failed to create maintenance record")?;

        Ok(created)
    }

    /// List a vehicle's maintenance history, most recent work first
    pub async fn list_records(
        &self,
        actor: &User,
        vehicle_id: i64,
    ) -> Result<Vec<MaintenanceRecord>, MaintenanceServiceError> {
        let vehicle = self.accessible_vehicle(actor, vehicle_id).await?;

        let records = self
            .maintenance_repo
            .list_by_vehicle(vehicle.id)
            .await
            .context("Failed to list maintenance records")?;

        Ok(records)
    }

    /// Get the most recent record for a vehicle, if any
    pub async fn latest_record(
        &self,
        actor: &User,
        vehicle_id: i64,
    ) -> Result<Option<MaintenanceRecord>, MaintenanceServiceError> {
        let vehicle = self.accessible_vehicle(actor, vehicle_id).await?;

        let record = self
            .maintenance_repo
            .latest_for_vehicle(vehicle.id)
            .await
            .context("Failed to get latest maintenance record")?;

        Ok(record)
    }

    /// Delete a maintenance record
    pub async fn delete_record(
        &self,
        actor: &User,
        record_id: i64,
    ) -> Result<(), MaintenanceServiceError> {
        let record = self
            .maintenance_repo
            .get_by_id(record_id)
            .await
            .context("Failed to get maintenance record")?
            .ok_or(MaintenanceServiceError::NotFound)?;

        // Access is decided by the vehicle the record hangs off
        self.accessible_vehicle(actor, record.vehicle_id).await?;

        self.maintenance_repo
            .delete(record.id)
            .await
            .context("Failed to delete maintenance record")?;

        Ok(())
    }

    async fn accessible_vehicle(
        &self,
        actor: &User,
        vehicle_id: i64,
    ) -> Result<Vehicle, MaintenanceServiceError> {
        let vehicle = self
            .vehicle_repo
            .get_by_id(vehicle_id)
            .await
            .context("Failed to get vehicle")?
            .ok_or(MaintenanceServiceError::NotFound)?;

        if !actor.can_access_vehicle(vehicle.owner_id) {
            return Err(MaintenanceServiceError::NotFound);
        }

        Ok(vehicle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxMaintenanceRepository, SqlxVehicleRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Checklist, UserRole};
    use chrono::NaiveDate;
    use sqlx::SqlitePool;

    async fn setup_test_service() -> (SqlitePool, MaintenanceService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = MaintenanceService::new(
            SqlxMaintenanceRepository::boxed(pool.clone()),
            SqlxVehicleRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    async fn insert_user(pool: &SqlitePool, id: i64, role: UserRole) -> User {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, role, must_change_password, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(id)
        .bind(format!("user{}", id))
        .bind("hash")
        .bind(role.to_string())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .expect("Failed to insert user");

        User {
            id,
            username: format!("user{}", id),
            password_hash: "hash".to_string(),
            role,
            must_change_password: false,
            profile_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn insert_vehicle(pool: &SqlitePool, owner_id: i64, plate: &str) -> i64 {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO vehicles (owner_id, plate, make, model, created_at, updated_at)
            VALUES (?, ?, 'Fiat', 'Panda', ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(plate)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .expect("Failed to insert vehicle");
        result.last_insert_rowid()
    }

    fn record_input(performed_on: NaiveDate, odometer: i64) -> CreateMaintenanceInput {
        CreateMaintenanceInput {
            performed_on,
            odometer,
            checklist: Checklist::default(),
            notes: "  oil change  ".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_add_record_trims_notes() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let created = service
            .add_record(&owner, vehicle_id, record_input(date(2024, 3, 10), 50_000))
            .await
            .expect("Failed to add record");

        assert_eq!(created.notes, "oil change");
        assert_eq!(created.vehicle_id, vehicle_id);
    }

    #[tokio::test]
    async fn test_add_record_negative_odometer_rejected() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let result = service
            .add_record(&owner, vehicle_id, record_input(date(2024, 3, 10), -1))
            .await;

        assert!(matches!(result, Err(MaintenanceServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_add_record_other_members_vehicle_not_found() {
        let (pool, service) = setup_test_service().await;
        insert_user(&pool, 1, UserRole::Member).await;
        let bob = insert_user(&pool, 2, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let result = service
            .add_record(&bob, vehicle_id, record_input(date(2024, 3, 10), 50_000))
            .await;

        assert!(matches!(result, Err(MaintenanceServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_records_most_recent_first() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        service
            .add_record(&owner, vehicle_id, record_input(date(2024, 1, 5), 40_000))
            .await
            .expect("Failed to add record");
        service
            .add_record(&owner, vehicle_id, record_input(date(2024, 6, 20), 48_000))
            .await
            .expect("Failed to add record");

        let records = service
            .list_records(&owner, vehicle_id)
            .await
            .expect("Failed to list");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].performed_on, date(2024, 6, 20));
        assert_eq!(records[1].performed_on, date(2024, 1, 5));
    }

    #[tokio::test]
    async fn test_latest_record() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let none = service
            .latest_record(&owner, vehicle_id)
            .await
            .expect("Failed to query");
        assert!(none.is_none());

        service
            .add_record(&owner, vehicle_id, record_input(date(2024, 1, 5), 40_000))
            .await
            .expect("Failed to add record");
        service
            .add_record(&owner, vehicle_id, record_input(date(2024, 6, 20), 48_000))
            .await
            .expect("Failed to add record");

        let latest = service
            .latest_record(&owner, vehicle_id)
            .await
            .expect("Failed to query")
            .expect("Record not found");
        assert_eq!(latest.performed_on, date(2024, 6, 20));
    }

    #[tokio::test]
    async fn test_admin_reads_any_history() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let admin = insert_user(&pool, 2, UserRole::Admin).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        service
            .add_record(&owner, vehicle_id, record_input(date(2024, 3, 10), 50_000))
            .await
            .expect("Failed to add record");

        let records = service
            .list_records(&admin, vehicle_id)
            .await
            .expect("Admin should list");
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_record_respects_vehicle_access() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let bob = insert_user(&pool, 2, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let created = service
            .add_record(&owner, vehicle_id, record_input(date(2024, 3, 10), 50_000))
            .await
            .expect("Failed to add record");

        let result = service.delete_record(&bob, created.id).await;
        assert!(matches!(result, Err(MaintenanceServiceError::NotFound)));

        service
            .delete_record(&owner, created.id)
            .await
            .expect("Owner should delete");

        let records = service
            .list_records(&owner, vehicle_id)
            .await
            .expect("Failed to list");
        assert!(records.is_empty());
    }
}
