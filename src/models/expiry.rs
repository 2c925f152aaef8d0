//! Expiry model
//!
//! An expiry is a date-bound obligation attached to a vehicle: insurance,
//! inspection, road tax and the like. Status is computed against a reference
//! date rather than stored, so listings never go stale.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Days ahead within which an expiry counts as upcoming
pub const UPCOMING_WINDOW_DAYS: i64 = 7;

/// Expiry entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expiry {
    /// Unique identifier
    pub id: i64,
    /// Vehicle this expiry belongs to
    pub vehicle_id: i64,
    /// What expires (e.g. "Insurance", "Inspection")
    pub kind: String,
    /// Due date
    pub due_on: NaiveDate,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Expiry {
    /// Classify this expiry relative to `today`.
    pub fn status_on(&self, today: NaiveDate) -> ExpiryStatus {
        if self.due_on < today {
            ExpiryStatus::Overdue
        } else if self.due_on <= today + Duration::days(UPCOMING_WINDOW_DAYS) {
            ExpiryStatus::Upcoming
        } else {
            ExpiryStatus::Scheduled
        }
    }
}

/// Computed status of an expiry relative to a reference date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryStatus {
    /// Due date has passed
    Overdue,
    /// Due within the upcoming window
    Upcoming,
    /// Due beyond the upcoming window
    Scheduled,
}

/// Listing filter for expiries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryFilter {
    /// Only expiries due within the upcoming window
    Upcoming,
    /// Only expiries whose due date has passed
    Overdue,
    /// Everything
    #[default]
    All,
}

impl ExpiryFilter {
    /// Whether an expiry with the given status passes this filter.
    pub fn matches(&self, status: ExpiryStatus) -> bool {
        match self {
            ExpiryFilter::Upcoming => status == ExpiryStatus::Upcoming,
            ExpiryFilter::Overdue => status == ExpiryStatus::Overdue,
            ExpiryFilter::All => true,
        }
    }
}

impl fmt::Display for ExpiryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryFilter::Upcoming => write!(f, "upcoming"),
            ExpiryFilter::Overdue => write!(f, "overdue"),
            ExpiryFilter::All => write!(f, "all"),
        }
    }
}

impl FromStr for ExpiryFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upcoming" => Ok(ExpiryFilter::Upcoming),
            "overdue" => Ok(ExpiryFilter::Overdue),
            "all" => Ok(ExpiryFilter::All),
            _ => Err(anyhow::anyhow!("Invalid expiry filter: {}", s)),
        }
    }
}

/// Input for adding an expiry
#[derive(Debug, Clone)]
pub struct CreateExpiryInput {
    /// What expires
    pub kind: String,
    /// Due date
    pub due_on: NaiveDate,
}
