//! Vehicle model
//!
//! A vehicle belongs to exactly one user. Photos are stored as filenames
//! under the upload root and persisted as a JSON array; the registration
//! document (when uploaded) is a single filename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vehicle entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique identifier
    pub id: i64,
    /// Owning user
    pub owner_id: i64,
    /// License plate, stored normalized (trimmed, upper-case), unique
    pub plate: String,
    /// Manufacturer
    pub make: String,
    /// Model name
    pub model: String,
    /// Year of registration, if known
    pub year: Option<i32>,
    /// Current odometer reading in kilometres
    pub odometer: i64,
    /// Uploaded photo filenames
    pub photos: Vec<String>,
    /// Uploaded registration document filename, if any
    pub document: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// Short human-readable label, used in page titles and bot messages.
    pub fn label(&self) -> String {
        format!("{} {} ({})", self.make, self.model, self.plate)
    }
}

/// Normalize a plate for storage and comparison: trim, drop inner spaces,
/// upper-case.
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Input for registering a new vehicle
#[derive(Debug, Clone)]
pub struct CreateVehicleInput {
    /// Owner; admins may register vehicles for other users
    pub owner_id: i64,
    /// License plate (normalized by the service)
    pub plate: String,
    /// Manufacturer
    pub make: String,
    /// Model name
    pub model: String,
    /// Year of registration
    pub year: Option<i32>,
    /// Odometer reading in kilometres
    pub odometer: i64,
}

/// Input for editing an existing vehicle; `None` fields stay untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateVehicleInput {
    /// New plate (optional)
    pub plate: Option<String>,
    /// New manufacturer (optional)
    pub make: Option<String>,
    /// New model name (optional)
    pub model: Option<String>,
    /// New year; `Some(None)` clears it
    pub year: Option<Option<i32>>,
    /// New odometer reading (optional)
    pub odometer: Option<i64>,
}
