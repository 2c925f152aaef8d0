//! Expiry service
//!
//! Business logic for vehicle deadlines: listing with status filters and
//! building the attention report (overdue plus due within a week) that
//! feeds the dashboard and the bot notifier.

use crate::db::repositories::{ExpiryRepository, VehicleRepository};
use crate::models::{CreateExpiryInput, Expiry, ExpiryFilter, ExpiryStatus, User, Vehicle};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Error types for expiry service operations
#[derive(Debug, thiserror::Error)]
pub enum ExpiryServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Vehicle or expiry not found, or not accessible to this user
    #[error("Not found")]
    NotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// One expiry needing attention, paired with its vehicle and status
#[derive(Debug, Clone, Serialize)]
pub struct DueExpiry {
    pub vehicle: Vehicle,
    pub expiry: Expiry,
    pub status: ExpiryStatus,
}

/// Expiry service for vehicle deadlines
pub struct ExpiryService {
    expiry_repo: Arc<dyn ExpiryRepository>,
    vehicle_repo: Arc<dyn VehicleRepository>,
}

impl ExpiryService {
    /// Create a new expiry service
    pub fn new(
        expiry_repo: Arc<dyn ExpiryRepository>,
        vehicle_repo: Arc<dyn VehicleRepository>,
    ) -> Self {
        Self {
            expiry_repo,
            vehicle_repo,
        }
    }

    /// Add an expiry to a vehicle
    pub async fn add_expiry(
        &self,
        actor: &User,
        vehicle_id: i64,
        input: CreateExpiryInput,
    ) -> Result<Expiry, ExpiryServiceError> {
        let vehicle = self.accessible_vehicle(actor, vehicle_id).await?;

        let kind = input.kind.trim().to_string();
        if kind.is_empty() {
            return Err(ExpiryServiceError::ValidationError(
                "Expiry type cannot be empty".to_string(),
            ));
        }

        let expiry = Expiry {
            id: 0,
            vehicle_id: vehicle.id,
            kind,
            due_on: input.due_on,
            created_at: Utc::now(),
        };

        let created = self
            .expiry_repo
            .create(&expiry)
            .await
            .context("Failed to create expiry")?;

        Ok(created)
    }

    /// List a vehicle's expiries through a status filter, soonest due first
    ///
    /// The upcoming and overdue filters select disjoint subsets of what the
    /// all filter returns.
    pub async fn list_expiries(
        &self,
        actor: &User,
        vehicle_id: i64,
        filter: ExpiryFilter,
        today: NaiveDate,
    ) -> Result<Vec<Expiry>, ExpiryServiceError> {
        let vehicle = self.accessible_vehicle(actor, vehicle_id).await?;

        let expiries = self
            .expiry_repo
            .list_by_vehicle(vehicle.id)
            .await
            .context("Failed to list expiries")?;

        Ok(expiries
            .into_iter()
            .filter(|e| filter.matches(e.status_on(today)))
            .collect())
    }

    /// Delete an expiry
    pub async fn delete_expiry(
        &self,
        actor: &User,
        expiry_id: i64,
    ) -> Result<(), ExpiryServiceError> {
        let expiry = self
            .expiry_repo
            .get_by_id(expiry_id)
            .await
            .context("Failed to get expiry")?
            .ok_or(ExpiryServiceError::NotFound)?;

        // Access is decided by the vehicle the expiry hangs off
        self.accessible_vehicle(actor, expiry.vehicle_id).await?;

        self.expiry_repo
            .delete(expiry.id)
            .await
            .context("Failed to delete expiry")?;

        Ok(())
    }

    /// Collect everything needing attention across the vehicles this user
    /// can see: overdue expiries and those due within the upcoming window
    ///
    /// Sorted soonest due first across vehicles. Feeds the dashboard and
    /// the notification report.
    pub async fn attention_report(
        &self,
        actor: &User,
        today: NaiveDate,
    ) -> Result<Vec<DueExpiry>, ExpiryServiceError> {
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

        let mut report = Vec::new();
        for vehicle in vehicles {
            let expiries = self
                .expiry_repo
                .list_by_vehicle(vehicle.id)
                .await
                .context("Failed to list expiries")?;

            for expiry in expiries {
                let status = expiry.status_on(today);
                if matches!(status, ExpiryStatus::Overdue | ExpiryStatus::Upcoming) {
                    report.push(DueExpiry {
                        vehicle: vehicle.clone(),
                        expiry,
                        status,
                    });
                }
            }
        }

        report.sort_by(|a, b| a.expiry.due_on.cmp(&b.expiry.due_on));
        Ok(report)
    }

    async fn accessible_vehicle(
        &self,
        actor: &User,
        vehicle_id: i64,
    ) -> Result<Vehicle, ExpiryServiceError> {
        let vehicle = self
            .vehicle_repo
            .get_by_id(vehicle_id)
            .await
            .context("Failed to get vehicle")?
            .ok_or(ExpiryServiceError::NotFound)?;

        if !actor.can_access_vehicle(vehicle.owner_id) {
            return Err(ExpiryServiceError::NotFound);
        }

        Ok(vehicle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxExpiryRepository, SqlxVehicleRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use chrono::Duration;
    use sqlx::SqlitePool;

    async fn setup_test_service() -> (SqlitePool, ExpiryService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = ExpiryService::new(
            SqlxExpiryRepository::boxed(pool.clone()),
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

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn expiry_input(kind: &str, due_on: NaiveDate) -> CreateExpiryInput {
        CreateExpiryInput {
            kind: kind.to_string(),
            due_on,
        }
    }

    #[tokio::test]
    async fn test_add_expiry_trims_kind() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let created = service
            .add_expiry(&owner, vehicle_id, expiry_input("  Insurance  ", date(2025, 2, 1)))
            .await
            .expect("Failed to add expiry");

        assert_eq!(created.kind, "Insurance");
    }

    #[tokio::test]
    async fn test_add_expiry_empty_kind_rejected() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let result = service
            .add_expiry(&owner, vehicle_id, expiry_input("   ", date(2025, 2, 1)))
            .await;

        assert!(matches!(result, Err(ExpiryServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_add_expiry_other_members_vehicle_not_found() {
        let (pool, service) = setup_test_service().await;
        insert_user(&pool, 1, UserRole::Member).await;
        let bob = insert_user(&pool, 2, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let result = service
            .add_expiry(&bob, vehicle_id, expiry_input("Insurance", date(2025, 2, 1)))
            .await;

        assert!(matches!(result, Err(ExpiryServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_filters_partition_expiries() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;
        let today = date(2024, 6, 15);

        // One overdue, one due today, one at the window edge, one beyond
        for (kind, due) in [
            ("Inspection", date(2024, 6, 1)),
            ("Insurance", today),
            ("Road tax", today + Duration::days(7)),
            ("Revision", today + Duration::days(30)),
        ] {
            service
                .add_expiry(&owner, vehicle_id, expiry_input(kind, due))
                .await
                .expect("Failed to add expiry");
        }

        let all = service
            .list_expiries(&owner, vehicle_id, ExpiryFilter::All, today)
            .await
            .expect("Failed to list");
        let upcoming = service
            .list_expiries(&owner, vehicle_id, ExpiryFilter::Upcoming, today)
            .await
            .expect("Failed to list");
        let overdue = service
            .list_expiries(&owner, vehicle_id, ExpiryFilter::Overdue, today)
            .await
            .expect("Failed to list");

        assert_eq!(all.len(), 4);
        assert_eq!(upcoming.len(), 2);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].kind, "Inspection");

        // Upcoming and overdue are disjoint subsets of all
        for e in upcoming.iter().chain(overdue.iter()) {
            assert!(all.iter().any(|a| a.id == e.id));
        }
        assert!(upcoming.iter().all(|u| overdue.iter().all(|o| o.id != u.id)));
    }

    #[tokio::test]
    async fn test_list_expiries_soonest_first() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        service
            .add_expiry(&owner, vehicle_id, expiry_input("Road tax", date(2025, 6, 30)))
            .await
            .expect("Failed to add expiry");
        service
            .add_expiry(&owner, vehicle_id, expiry_input("Insurance", date(2025, 2, 1)))
            .await
            .expect("Failed to add expiry");

        let all = service
            .list_expiries(&owner, vehicle_id, ExpiryFilter::All, date(2024, 1, 1))
            .await
            .expect("Failed to list");

        assert_eq!(all[0].kind, "Insurance");
        assert_eq!(all[1].kind, "Road tax");
    }

    #[tokio::test]
    async fn test_delete_expiry_respects_vehicle_access() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let bob = insert_user(&pool, 2, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        let created = service
            .add_expiry(&owner, vehicle_id, expiry_input("Insurance", date(2025, 2, 1)))
            .await
            .expect("Failed to add expiry");

        let result = service.delete_expiry(&bob, created.id).await;
        assert!(matches!(result, Err(ExpiryServiceError::NotFound)));

        service
            .delete_expiry(&owner, created.id)
            .await
            .expect("Owner should delete");
    }

    #[tokio::test]
    async fn test_attention_report_scopes_to_visible_vehicles() {
        let (pool, service) = setup_test_service().await;
        let alice = insert_user(&pool, 1, UserRole::Member).await;
        let bob = insert_user(&pool, 2, UserRole::Member).await;
        let admin = insert_user(&pool, 3, UserRole::Admin).await;
        let alices_vehicle = insert_vehicle(&pool, 1, "AA111AA").await;
        let bobs_vehicle = insert_vehicle(&pool, 2, "BB222BB").await;
        let today = date(2024, 6, 15);

        service
            .add_expiry(&alice, alices_vehicle, expiry_input("Insurance", date(2024, 6, 10)))
            .await
            .expect("Failed to add expiry");
        service
            .add_expiry(&bob, bobs_vehicle, expiry_input("Inspection", date(2024, 6, 18)))
            .await
            .expect("Failed to add expiry");
        // Far in the future, never reported
        service
            .add_expiry(&alice, alices_vehicle, expiry_input("Road tax", date(2025, 1, 1)))
            .await
            .expect("Failed to add expiry");

        let alices_report = service
            .attention_report(&alice, today)
            .await
            .expect("Failed to build report");
        assert_eq!(alices_report.len(), 1);
        assert_eq!(alices_report[0].expiry.kind, "Insurance");
        assert_eq!(alices_report[0].status, ExpiryStatus::Overdue);

        let admins_report = service
            .attention_report(&admin, today)
            .await
            .expect("Failed to build report");
        assert_eq!(admins_report.len(), 2);
        // Sorted soonest due first
        assert_eq!(admins_report[0].expiry.kind, "Insurance");
        assert_eq!(admins_report[1].expiry.kind, "Inspection");
        assert_eq!(admins_report[1].status, ExpiryStatus::Upcoming);
    }

    #[tokio::test]
    async fn test_attention_report_empty_when_nothing_due() {
        let (pool, service) = setup_test_service().await;
        let owner = insert_user(&pool, 1, UserRole::Member).await;
        let vehicle_id = insert_vehicle(&pool, 1, "AB123CD").await;

        service
            .add_expiry(&owner, vehicle_id, expiry_input("Insurance", date(2030, 1, 1)))
            .await
            .expect("Failed to add expiry");

        let report = service
            .attention_report(&owner, date(2024, 6, 15))
            .await
            .expect("Failed to build report");

        assert!(report.is_empty());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use crate::models::{Expiry, ExpiryFilter, ExpiryStatus, UPCOMING_WINDOW_DAYS};
    use chrono::{Duration, NaiveDate, Utc};
    use proptest::prelude::*;

    fn expiry_due(due_on: NaiveDate) -> Expiry {
        Expiry {
            id: 1,
            vehicle_id: 1,
            kind: "Insurance".to_string(),
            due_on,
            created_at: Utc::now(),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// For any due date, the upcoming and overdue filters select
        /// disjoint subsets of what the all filter accepts.
        #[test]
        fn property_filters_partition(offset_days in -400i64..400) {
            let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
            let expiry = expiry_due(today + Duration::days(offset_days));
            let status = expiry.status_on(today);

            let in_upcoming = ExpiryFilter::Upcoming.matches(status);
            let in_overdue = ExpiryFilter::Overdue.matches(status);
            let in_all = ExpiryFilter::All.matches(status);

            prop_assert!(in_all, "the all filter accepts everything");
            prop_assert!(
                !(in_upcoming && in_overdue),
                "upcoming and overdue never both match"
            );
        }

        /// Status classification agrees with the raw date arithmetic.
        #[test]
        fn property_status_matches_window(offset_days in -400i64..400) {
            let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
            let expiry = expiry_due(today + Duration::days(offset_days));

            let expected = if offset_days < 0 {
                ExpiryStatus::Overdue
            } else if offset_days <= UPCOMING_WINDOW_DAYS {
                ExpiryStatus::Upcoming
            } else {
                ExpiryStatus::Scheduled
            };

            prop_assert_eq!(expiry.status_on(today), expected);
        }
    }
}
