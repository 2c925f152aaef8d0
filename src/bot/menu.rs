//! Keyboards and callback data
//!
//! Callback data is a tiny colon-separated format: `menu`, `maint:{id}`,
//! `exp:{id}:{filter}`, `addm:{id}`, `addm_save`, `addm_cancel`. It travels
//! through Telegram and comes back on button presses, so encode and parse
//! must stay in lockstep.

use std::str::FromStr;

use crate::models::{ExpiryFilter, Vehicle};

use super::types::{InlineKeyboardButton, InlineKeyboardMarkup, ReplyKeyboardMarkup};

/// Main menu button labels
pub const VEHICLES_BUTTON: &str = "\u{1F697} Vehicles";
pub const MAINTENANCE_BUTTON: &str = "\u{1F527} Maintenance";
pub const EXPIRIES_BUTTON: &str = "\u{23F0} Expiries";
pub const LOGOUT_BUTTON: &str = "\u{274C} Logout";

/// Everything an inline button can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    /// Back to the main menu
    Menu,
    /// Show a vehicle's maintenance history
    Maintenance(i64),
    /// Show a vehicle's expiries through a filter
    Expiries(i64, ExpiryFilter),
    /// Start the add-maintenance dialogue for a vehicle
    AddMaintenance(i64),
    /// Save the draft being collected
    SaveMaintenance,
    /// Discard the draft being collected
    CancelMaintenance,
}

impl Callback {
    pub fn encode(&self) -> String {
        match self {
            Callback::Menu => "menu".to_string(),
            Callback::Maintenance(id) => format!("maint:{}", id),
            Callback::Expiries(id, filter) => format!("exp:{}:{}", id, filter),
            Callback::AddMaintenance(id) => format!("addm:{}", id),
            Callback::SaveMaintenance => "addm_save".to_string(),
            Callback::CancelMaintenance => "addm_cancel".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Callback> {
        match data {
            "menu" => return Some(Callback::Menu),
            "addm_save" => return Some(Callback::SaveMaintenance),
            "addm_cancel" => return Some(Callback::CancelMaintenance),
            _ => {}
        }

        let mut parts = data.split(':');
        let kind = parts.next()?;
        let id: i64 = parts.next()?.parse().ok()?;
        match kind {
            "maint" => Some(Callback::Maintenance(id)),
            "addm" => Some(Callback::AddMaintenance(id)),
            "exp" => {
                let filter = ExpiryFilter::from_str(parts.next()?).ok()?;
                Some(Callback::Expiries(id, filter))
            }
            _ => None,
        }
    }
}

/// The persistent menu shown to logged-in chats
pub fn main_keyboard() -> ReplyKeyboardMarkup {
    ReplyKeyboardMarkup {
        keyboard: vec![
            vec![VEHICLES_BUTTON.to_string(), MAINTENANCE_BUTTON.to_string()],
            vec![EXPIRIES_BUTTON.to_string(), LOGOUT_BUTTON.to_string()],
        ],
        resize_keyboard: true,
    }
}

/// What a vehicle button press should open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerPurpose {
    Maintenance,
    Expiries,
}

/// One button per vehicle, labelled "make model (plate)"
pub fn vehicle_picker(vehicles: &[Vehicle], purpose: PickerPurpose) -> InlineKeyboardMarkup {
    let inline_keyboard = vehicles
        .iter()
        .map(|v| {
            let callback = match purpose {
                PickerPurpose::Maintenance => Callback::Maintenance(v.id),
                PickerPurpose::Expiries => Callback::Expiries(v.id, ExpiryFilter::All),
            };
            vec![InlineKeyboardButton::new(
                format!("{} {} ({})", v.make, v.model, v.plate),
                callback.encode(),
            )]
        })
        .collect();
    InlineKeyboardMarkup { inline_keyboard }
}

/// Attached to a maintenance history listing
pub fn maintenance_keyboard(vehicle_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::new(
                "\u{2795} Add record",
                Callback::AddMaintenance(vehicle_id).encode(),
            )],
            vec![InlineKeyboardButton::new(
                "\u{1F519} Menu",
                Callback::Menu.encode(),
            )],
        ],
    }
}

/// Attached to an expiry listing: filters plus add and menu
pub fn expiry_keyboard(vehicle_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![
                InlineKeyboardButton::new(
                    "\u{23F3} Next 7 days",
                    Callback::Expiries(vehicle_id, ExpiryFilter::Upcoming).encode(),
                ),
                InlineKeyboardButton::new(
                    "\u{26D4} Overdue",
                    Callback::Expiries(vehicle_id, ExpiryFilter::Overdue).encode(),
                ),
            ],
            vec![InlineKeyboardButton::new(
                "\u{1F504} All",
                Callback::Expiries(vehicle_id, ExpiryFilter::All).encode(),
            )],
            vec![InlineKeyboardButton::new(
                "\u{1F519} Menu",
                Callback::Menu.encode(),
            )],
        ],
    }
}

/// Attached to the draft summary at the end of the add dialogue
pub fn confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            InlineKeyboardButton::new("\u{2705} Save", Callback::SaveMaintenance.encode()),
            InlineKeyboardButton::new("\u{1F519} Cancel", Callback::CancelMaintenance.encode()),
        ]],
    }
}
