//! Vehicle service
//!
//! Implements business logic for the fleet:
//! - Access rules: admins see and modify every vehicle, members only
//!   their own
//! - Plate normalization and uniqueness
//! - Photo gallery and registration document handling

use crate::db::repositories::VehicleRepository;
use crate::models::{normalize_plate, CreateVehicleInput, UpdateVehicleInput, User, Vehicle};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;

/// Accepted range for a vehicle model year
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2100;

/// Error types for vehicle service operations
#[derive(Debug, thiserror::Error)]
pub enum VehicleServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Plate already registered
    #[error("Plate already registered: {0}")]
    PlateExists(String),

    /// Vehicle not found or not accessible to this user
    #[error("Vehicle not found")]
    NotFound,

    /// Operation not permitted for this actor
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Vehicle service for managing the fleet
pub struct VehicleService {
    vehicle_repo: Arc<dyn VehicleRepository>,
}

impl VehicleService {
    /// Create a new vehicle service
    pub fn new(vehicle_repo: Arc<dyn VehicleRepository>) -> Self {
        Self { vehicle_repo }
    }

    /// Create a new vehicle
    ///
    /// Members register vehicles for themselves; admins can register a
    /// vehicle to any owner. The plate is normalized (uppercased, spaces
    /// stripped) and must be unique across the fleet.
    pub async fn create_vehicle(
        &self,
        actor: &User,
        input: CreateVehicleInput,
    ) -> Result<Vehicle, VehicleServiceError> {
        if !actor.is_admin() && input.owner_id != actor.id {
            return Err(VehicleServiceError::Forbidden(
                "Only admins can register vehicles for other users".to_string(),
            ));
        }

        let plate = normalize_plate(&input.plate);
        let make = input.make.trim().to_string();
        let model = input.model.trim().to_string();
        validate_fields(&plate, &make, &model, input.year, input.odometer)?;

        if self
            .vehicle_repo
            .get_by_plate(&plate)
            .await
            .context("Failed to check plate")?
            .is_some()
        {
            return Err(VehicleServiceError::PlateExists(plate));
        }

        let now = Utc::now();
        let vehicle = Vehicle {
            id: 0,
            owner_id: input.owner_id,
            plate,
            make,
            model,
            year: input.year,
            odometer: input.odometer,
            photos: Vec::new(),
            document: None,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .vehicle_repo
            .create(&vehicle)
            .await
            .context("Failed to create vehicle")?;

        Ok(created)
    }

    /// Get a vehicle, respecting access rules
    ///
    /// A vehicle that exists but belongs to someone else looks exactly like
    /// a missing one to a non-admin.
    pub async fn get_vehicle(&self, actor: &User, id: i64) -> Result<Vehicle, VehicleServiceError> {
        self.get_accessible(actor, id).await
    }

    /// List vehicles visible to this user: all for admins, own otherwise
    pub async fn list_vehicles(&self, actor: &User) -> Result<Vec<Vehicle>, VehicleServiceError> {
        let vehicles = if actor.is_admin() {
            self.vehicle_repo
                .list_all()
                .await
                .context("Failed to list vehicles")?
        } else {
            self.vehicle_repo
                .list_by_owner(actor.id)
                .await
                .context("Failed to list vehicles")?
        };

        Ok(vehicles)
    }

    /// Update a vehicle's base fields
    pub async fn update_vehicle(
        &self,
        actor: &User,
        id: i64,
        input: UpdateVehicleInput,
    ) -> Result<Vehicle, VehicleServiceError> {
        let mut vehicle = self.get_accessible(actor, id).await?;

        if let Some(plate) = input.plate {
            let plate = normalize_plate(&plate);
            if plate != vehicle.plate {
                if plate.is_empty() {
                    return Err(VehicleServiceError::ValidationError(
                        "Plate cannot be empty".to_string(),
                    ));
                }
                if self
                    .vehicle_repo
                    .get_by_plate(&plate)
                    .await
                    .context("Failed to check plate")?
                    .is_some()
                {
                    return Err(VehicleServiceError::PlateExists(plate));
                }
                vehicle.plate = plate;
            }
        }
        if let Some(make) = input.make {
            vehicle.make = make.trim().to_string();
        }
        if let Some(model) = input.model {
            vehicle.model = model.trim().to_string();
        }
        if let Some(year) = input.year {
            vehicle.year = year;
        }
        if let Some(odometer) = input.odometer {
            vehicle.odometer = odometer;
        }

        validate_fields(
            &vehicle.plate,
            &vehicle.make,
            &vehicle.model,
            vehicle.year,
            vehicle.odometer,
        )?;

        let updated = self
            .vehicle_repo
            .update(&vehicle)
            .await
            .context("Failed to update vehicle")?;

        Ok(updated)
    }

    /// Append uploaded photos to a vehicle's gallery
    ///
    /// Existing photos are kept; new filenames are appended in upload order.
    pub async fn add_photos(
        &self,
        actor: &User,
        id: i64,
        new_photos: Vec<String>,
    ) -> Result<Vehicle, VehicleServiceError> {
        let mut vehicle = self.get_accessible(actor, id).await?;

        if new_photos.is_empty() {
            return Ok(vehicle);
        }

        vehicle.photos.extend(new_photos);
        self.vehicle_repo
            .update_photos(vehicle.id, &vehicle.photos)
            .await
            .context("Failed to update photos")?;

        Ok(vehicle)
    }

    /// Set or clear a vehicle's registration document
    pub async fn set_document(
        &self,
        actor: &User,
        id: i64,
        document: Option<String>,
    ) -> Result<Vehicle, VehicleServiceError> {
        let mut vehicle = self.get_accessible(actor, id).await?;

        self.vehicle_repo
            .update_document(vehicle.id, document.as_deref())
            .await
            .context("Failed to update document")?;
        vehicle.document = document;

        Ok(vehicle)
    }

    /// Delete a vehicle
    ///
    /// Maintenance records and expiries go with it via foreign key cascades.
    pub async fn delete_vehicle(&self, actor: &User, id: i64) -> Result<(), VehicleServiceError> {
        let vehicle = self.get_accessible(actor, id).await?;

        self.vehicle_repo
            .delete(vehicle.id)
            .await
            .context("Failed to delete vehicle")?;

        Ok(())
    }

    async fn get_accessible(&self, actor: &User, id: i64) -> Result<Vehicle, VehicleServiceError> {
        let vehicle = self
            .vehicle_repo
            .get_by_id(id)
            .await
            .context("Failed to get vehicle")?
            .ok_or(VehicleServiceError::NotFound)?;

        if !actor.can_access_vehicle(vehicle.owner_id) {
            return Err(VehicleServiceError::NotFound);
        }

        Ok(vehicle)
    }
}

fn validate_fields(
    plate: &str,
    make: &str,
    model: &str,
    year: Option<i32>,
    odometer: i64,
) -> Result<(), VehicleServiceError> {
    if plate.is_empty() {
        return Err(VehicleServiceError::ValidationError(
            "Plate cannot be empty".to_string(),
        ));
    }
    if make.is_empty() {
        return Err(VehicleServiceError::ValidationError(
            "Make cannot be empty".to_string(),
        ));
    }
    if model.is_empty() {
        return Err(VehicleServiceError::ValidationError(
            "Model cannot be empty".to_string(),
        ));
    }
    if let Some(year) = year {
        if !YEAR_RANGE.contains(&year) {
            return Err(VehicleServiceError::ValidationError(format!(
                "Year must be between {} and {}",
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            )));
        }
    }
    if odometer < 0 {
        return Err(VehicleServiceError::ValidationError(
            "Odometer cannot be negative".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxVehicleRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use sqlx::SqlitePool;

    async fn setup_test_service() -> (SqlitePool, VehicleService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = VehicleService::new(SqlxVehicleRepository::boxed(pool.clone()));
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

    fn vehicle_input(owner_id: i64, plate: &str) -> CreateVehicleInput {
        CreateVehicleInput {
            owner_id,
            plate: plate.to_string(),
            make: "Fiat".to_string(),
            model: "Panda".to_string(),
            year: Some(2018),
            odometer: 42_000,
        }
    }

    #[tokio::test]
    async fn test_create_vehicle_normalizes_plate() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;

        let created = service
            .create_vehicle(&owner, vehicle_input(1, " ab 123 cd "))
            .await
            .expect("Failed to create vehicle");

        assert_eq!(created.plate, "AB123CD");
    }

    #[tokio::test]
    async fn test_create_vehicle_duplicate_plate_rejected_after_normalization() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;

        service
            .create_vehicle(&owner, vehicle_input(1, "AB123CD"))
            .await
            .expect("Failed to create vehicle");

        let result = service
            .create_vehicle(&owner, vehicle_input(1, "ab 123 cd"))
            .await;

        assert!(matches!(result, Err(VehicleServiceError::PlateExists(_))));
    }

    #[tokio::test]
    async fn test_create_vehicle_member_cannot_assign_other_owner() {
        let (pool, service) = setup_test_service().await;
        let member = insert_user(&pool, 1, UserRole::Member).await;
        insert_user(&pool, 2, UserRole::Member).await;

        let result = service.create_vehicle(&member, vehicle_input(2, "AB123CD")).await;

        assert!(matches!(result, Err(VehicleServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_create_vehicle_admin_assigns_any_owner() {
        let (pool, service) = setup_test_service().await;
        let admin = insert_user(&pool, 1, UserRole::Admin).await;
        insert_user(&pool, 2, UserRole::Member).await;

        let created = service
            .create_vehicle(&admin, vehicle_input(2, "AB123CD"))
            .await
            .expect("Failed to create vehicle");

        assert_eq!(created.owner_id, 2);
    }

    #[tokio::test]
    async fn test_create_vehicle_validation_errors() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;

        let mut input = vehicle_input(1, "   ");
        let result = service.create_vehicle(&owner, input.clone()).await;
        assert!(matches!(result, Err(VehicleServiceError::ValidationError(_))));

        input = vehicle_input(1, "AB123CD");
        input.make = "".to_string();
        let result = service.create_vehicle(&owner, input.clone()).await;
        assert!(matches!(result, Err(VehicleServiceError::ValidationError(_))));

        input = vehicle_input(1, "AB123CD");
        input.year = Some(1800);
        let result = service.create_vehicle(&owner, input.clone()).await;
        assert!(matches!(result, Err(VehicleServiceError::ValidationError(_))));

        input = vehicle_input(1, "AB123CD");
        input.odometer = -5;
        let result = service.create_vehicle(&owner, input).await;
        assert!(matches!(result, Err(VehicleServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_member_sees_only_own_vehicles() {
        let (pool, service) = setup_test_service().await;
        let alice = insert_user(&pool, 1, UserRole::Member).await;
        let bob = insert_user(&pool, 2, UserRole::Member).await;
        let admin = insert_user(&pool, 3, UserRole::Admin).await;

        service
            .create_vehicle(&alice, vehicle_input(1, "AA111AA"))
            .await
            .expect("Failed to create");
        service
            .create_vehicle(&bob, vehicle_input(2, "BB222BB"))
            .await
            .expect("Failed to create");

        let alices = service.list_vehicles(&alice).await.expect("Failed to list");
        assert_eq!(alices.len(), 1);
        assert_eq!(alices[0].plate, "AA111AA");

        let admins = service.list_vehicles(&admin).await.expect("Failed to list");
        assert_eq!(admins.len(), 2);
    }

    #[tokio::test]
    async fn test_other_members_vehicle_looks_missing() {
        let (pool, service) = setup_test_service().await;
        let alice = insert_user(&pool, 1, UserRole::Member).await;
        let bob = insert_user(&pool, 2, UserRole::Member).await;

        let created = service
            .create_vehicle(&alice, vehicle_input(1, "AA111AA"))
            .await
            .expect("Failed to create");

        let result = service.get_vehicle(&bob, created.id).await;
        assert!(matches!(result, Err(VehicleServiceError::NotFound)));

        let result = service
            .update_vehicle(
                &bob,
                created.id,
                UpdateVehicleInput {
                    odometer: Some(99_999),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(VehicleServiceError::NotFound)));

        let result = service.delete_vehicle(&bob, created.id).await;
        assert!(matches!(result, Err(VehicleServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_admin_updates_any_vehicle() {
        let (pool, service) = setup_test_service().await;
        let alice = insert_user(&pool, 1, UserRole::Member).await;
        let admin = insert_user(&pool, 3, UserRole::Admin).await;

        let created = service
            .create_vehicle(&alice, vehicle_input(1, "AA111AA"))
            .await
            .expect("Failed to create");

        let updated = service
            .update_vehicle(
                &admin,
                created.id,
                UpdateVehicleInput {
                    odometer: Some(50_000),
                    ..Default::default()
                },
            )
            .await
            .expect("Admin should update");

        assert_eq!(updated.odometer, 50_000);
    }

    #[tokio::test]
    async fn test_update_vehicle_clears_year() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let created = service
            .create_vehicle(&owner, vehicle_input(1, "AA111AA"))
            .await
            .expect("Failed to create");

        let updated = service
            .update_vehicle(
                &owner,
                created.id,
                UpdateVehicleInput {
                    year: Some(None),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to update");

        assert!(updated.year.is_none());
    }

    #[tokio::test]
    async fn test_add_photos_appends() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let created = service
            .create_vehicle(&owner, vehicle_input(1, "AA111AA"))
            .await
            .expect("Failed to create");

        service
            .add_photos(&owner, created.id, vec!["first.jpg".to_string()])
            .await
            .expect("Failed to add photo");
        let vehicle = service
            .add_photos(&owner, created.id, vec!["second.jpg".to_string()])
            .await
            .expect("Failed to add photo");

        assert_eq!(vehicle.photos, vec!["first.jpg", "second.jpg"]);
    }

    #[tokio::test]
    async fn test_set_and_clear_document() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let created = service
            .create_vehicle(&owner, vehicle_input(1, "AA111AA"))
            .await
            .expect("Failed to create");

        let vehicle = service
            .set_document(&owner, created.id, Some("libretto.pdf".to_string()))
            .await
            .expect("Failed to set document");
        assert_eq!(vehicle.document.as_deref(), Some("libretto.pdf"));

        let vehicle = service
            .set_document(&owner, created.id, None)
            .await
            .expect("Failed to clear document");
        assert!(vehicle.document.is_none());
    }

    #[tokio::test]
    async fn test_delete_vehicle() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let created = service
            .create_vehicle(&owner, vehicle_input(1, "AA111AA"))
            .await
            .expect("Failed to create");

        service
            .delete_vehicle(&owner, created.id)
            .await
            .expect("Failed to delete");

        let result = service.get_vehicle(&owner, created.id).await;
        assert!(matches!(result, Err(VehicleServiceError::NotFound)));
    }
}
