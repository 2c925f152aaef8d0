//! Data models
//!
//! This module contains all data structures used throughout the Paddock fleet
//! system. Models represent:
//! - Database entities (User, Session, Vehicle, MaintenanceRecord, Expiry)
//! - Service input types
//! - Computed views (expiry status, filters)

mod expiry;
mod maintenance;
mod session;
mod user;
mod vehicle;

pub use expiry::{CreateExpiryInput, Expiry, ExpiryFilter, ExpiryStatus, UPCOMING_WINDOW_DAYS};
pub use maintenance::{Checklist, ChecklistItem, CreateMaintenanceInput, MaintenanceRecord};
pub use session::Session;
pub use user::{CreateUserInput, UpdateUserInput, User, UserRole};
pub use vehicle::{normalize_plate, CreateVehicleInput, UpdateVehicleInput, Vehicle};
