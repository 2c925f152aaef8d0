//! Maintenance record model
//!
//! A maintenance record captures one workshop visit: the date, the odometer
//! reading, free-form notes and a structured checklist of the parts touched.
//! The checklist is persisted as JSON in a single column; every field is
//! serde-defaulted so rows written by older versions still load.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One checklist entry: whether the part was serviced, plus the part code
/// and brand fitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Part was replaced/serviced during this visit
    #[serde(default)]
    pub done: bool,
    /// Part code
    #[serde(default)]
    pub code: String,
    /// Part brand
    #[serde(default)]
    pub brand: String,
}

impl ChecklistItem {
    /// True when nothing was recorded for this part
    pub fn is_blank(&self) -> bool {
        !self.done && self.code.is_empty() && self.brand.is_empty()
    }
}

/// The workshop checklist: filters, oil, pads and discs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    #[serde(default)]
    pub oil_filter: ChecklistItem,
    #[serde(default)]
    pub fuel_filter: ChecklistItem,
    #[serde(default)]
    pub air_filter: ChecklistItem,
    #[serde(default)]
    pub cabin_filter: ChecklistItem,
    #[serde(default)]
    pub oil: ChecklistItem,
    /// Oil grade fitted (e.g. "5W30"), free text
    #[serde(default)]
    pub oil_grade: String,
    #[serde(default)]
    pub front_pads: ChecklistItem,
    #[serde(default)]
    pub rear_pads: ChecklistItem,
    #[serde(default)]
    pub front_discs: ChecklistItem,
    #[serde(default)]
    pub rear_discs: ChecklistItem,
}

impl Checklist {
    /// Field keys paired with display labels, in display order.
    ///
    /// The keys double as the serde field names and the HTML form input
    /// names, so the web form parser and the JSON column stay in sync.
    pub const FIELDS: [(&'static str, &'static str); 9] = [
        ("oil_filter", "Oil filter"),
        ("fuel_filter", "Fuel filter"),
        ("air_filter", "Air filter"),
        ("cabin_filter", "Cabin filter"),
        ("oil", "Oil"),
        ("front_pads", "Front pads"),
        ("rear_pads", "Rear pads"),
        ("front_discs", "Front discs"),
        ("rear_discs", "Rear discs"),
    ];

    /// Label/item pairs in display order, for templates and bot messages.
    pub fn items(&self) -> [(&'static str, &ChecklistItem); 9] {
        [
            ("Oil filter", &self.oil_filter),
            ("Fuel filter", &self.fuel_filter),
            ("Air filter", &self.air_filter),
            ("Cabin filter", &self.cabin_filter),
            ("Oil", &self.oil),
            ("Front pads", &self.front_pads),
            ("Rear pads", &self.rear_pads),
            ("Front discs", &self.front_discs),
            ("Rear discs", &self.rear_discs),
        ]
    }

    /// Mutable access to an entry by its field key
    pub fn item_mut(&mut self, key: &str) -> Option<&mut ChecklistItem> {
        match key {
            "oil_filter" => Some(&mut self.oil_filter),
            "fuel_filter" => Some(&mut self.fuel_filter),
            "air_filter" => Some(&mut self.air_filter),
            "cabin_filter" => Some(&mut self.cabin_filter),
            "oil" => Some(&mut self.oil),
            "front_pads" => Some(&mut self.front_pads),
            "rear_pads" => Some(&mut self.rear_pads),
            "front_discs" => Some(&mut self.front_discs),
            "rear_discs" => Some(&mut self.rear_discs),
            _ => None,
        }
    }

    /// Count of parts marked as serviced
    pub fn done_count(&self) -> usize {
        self.items().iter().filter(|(_, item)| item.done).count()
    }
}

/// Maintenance record entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    /// Unique identifier
    pub id: i64,
    /// Vehicle this record belongs to
    pub vehicle_id: i64,
    /// Date the work was performed
    pub performed_on: NaiveDate,
    /// Odometer reading at the time, in kilometres
    pub odometer: i64,
    /// Structured checklist of serviced parts
    pub checklist: Checklist,
    /// Free-form notes
    pub notes: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Input for adding a maintenance record
#[derive(Debug, Clone)]
pub struct CreateMaintenanceInput {
    /// Date the work was performed
    pub performed_on: NaiveDate,
    /// Odometer reading in kilometres
    pub odometer: i64,
    /// Checklist of serviced parts
    pub checklist: Checklist,
    /// Free-form notes
    pub notes: String,
}
