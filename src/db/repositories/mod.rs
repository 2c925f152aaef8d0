//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity.

pub mod expiry;
pub mod maintenance;
pub mod session;
pub mod user;
pub mod vehicle;

pub use expiry::{ExpiryRepository, SqlxExpiryRepository};
pub use maintenance::{MaintenanceRepository, SqlxMaintenanceRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use vehicle::{SqlxVehicleRepository, VehicleRepository};
