//! Services layer - Business logic
//!
//! This module contains all business logic services for the Paddock fleet
//! system. Services are responsible for:
//! - Implementing business rules and access checks
//! - Coordinating between repositories
//! - Handling validation and error cases

pub mod expiry;
pub mod maintenance;
pub mod password;
pub mod user;
pub mod vehicle;

pub use expiry::{DueExpiry, ExpiryService, ExpiryServiceError};
pub use maintenance::{MaintenanceService, MaintenanceServiceError};
pub use password::{hash_password, verify_password};
pub use user::{LoginInput, UserService, UserServiceError, MIN_PASSWORD_LEN};
pub use vehicle::{VehicleService, VehicleServiceError};
