//! Update dispatcher: slash commands, menu buttons and inline callbacks
//!
//! All data access goes through the same services as the web UI, acting as
//! the user whose session token the chat holds. A chat without a token gets
//! a login prompt; service-level denials come back as reply text.

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};

use crate::config::parse_notify_time;
use crate::models::{ExpiryFilter, ExpiryStatus, User};
use crate::services::{
    ExpiryService, LoginInput, MaintenanceService, MaintenanceServiceError, UserService,
    UserServiceError, VehicleService, VehicleServiceError,
};

use super::client::BotClient;
use super::menu::{
    confirm_keyboard, expiry_keyboard, main_keyboard, maintenance_keyboard, vehicle_picker,
    Callback, PickerPurpose, EXPIRIES_BUTTON, LOGOUT_BUTTON, MAINTENANCE_BUTTON, VEHICLES_BUTTON,
};
use super::notifier::NotifySettings;
use super::session::{BotSessionStore, ChatState, DraftStep, MaintenanceDraft};
use super::types::{CallbackQuery, ReplyKeyboardRemove, ReplyMarkup, Update};

const LOGIN_PROMPT: &str = "You need to /login first.";
const OOPS: &str = "Something went wrong. Please try again.";
const HELP_TEXT: &str = "Commands:\n\
    /login <username> <password> (or just /login)\n\
    /logout\n\
    /notify_on, /notify_off, /notify_time HH:MM (admins)\n\
    Or use the menu buttons.";

/// Split "/cmd@BotName arg1 arg2" into the command and its arguments
fn parse_command(text: &str) -> Option<(&str, Vec<&str>)> {
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let command = head.split('@').next().unwrap_or(head);
    Some((command, parts.collect()))
}

/// Human summary of a completed draft, shown above the save/cancel buttons
fn draft_summary(draft: &MaintenanceDraft) -> String {
    format!(
        "About to save:\n\u{1F4C5} Date: {}\n\u{1F6E3} Odometer: {} km\n\u{1F4DD} Notes: {}",
        draft
            .performed_on
            .map(|d| d.to_string())
            .unwrap_or_else(|| "?".to_string()),
        draft.odometer.unwrap_or(0),
        if draft.notes.is_empty() {
            "none"
        } else {
            &draft.notes
        },
    )
}

/// Handles one Telegram update at a time
pub struct BotHandler {
    client: BotClient,
    store: Arc<BotSessionStore>,
    settings: Arc<NotifySettings>,
    user_service: Arc<UserService>,
    vehicle_service: Arc<VehicleService>,
    maintenance_service: Arc<MaintenanceService>,
    expiry_service: Arc<ExpiryService>,
}

impl BotHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: BotClient,
        store: Arc<BotSessionStore>,
        settings: Arc<NotifySettings>,
        user_service: Arc<UserService>,
        vehicle_service: Arc<VehicleService>,
        maintenance_service: Arc<MaintenanceService>,
        expiry_service: Arc<ExpiryService>,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            user_service,
            vehicle_service,
            maintenance_service,
            expiry_service,
        }
    }

    pub async fn handle_update(&self, update: Update) -> Result<()> {
        if let Some(message) = update.message {
            if let Some(text) = message.text.as_deref() {
                self.handle_message(message.chat.id, text.trim()).await?;
            }
        } else if let Some(query) = update.callback_query {
            self.handle_callback(query).await?;
        }
        Ok(())
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.client.send_message(chat_id, text, None).await?;
        Ok(())
    }

    async fn send_with(&self, chat_id: i64, text: &str, markup: ReplyMarkup) -> Result<()> {
        self.client.send_message(chat_id, text, Some(markup)).await?;
        Ok(())
    }

    async fn send_main_menu(&self, chat_id: i64) -> Result<()> {
        self.send_with(
            chat_id,
            "Choose an option:",
            ReplyMarkup::Keyboard(main_keyboard()),
        )
        .await
    }

    /// Resolve the chat's session token to a user, dropping stale state
    async fn current_user(&self, chat_id: i64) -> Result<Option<User>> {
        let Some(token) = self.store.token(chat_id).await else {
            return Ok(None);
        };
        match self.user_service.validate_session(&token).await {
            Ok(Some(user)) => Ok(Some(user)),
            Ok(None) => {
                self.store.remove(chat_id).await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_message(&self, chat_id: i64, text: &str) -> Result<()> {
        if let Some((command, args)) = parse_command(text) {
            return self.handle_command(chat_id, command, &args).await;
        }
        self.handle_text(chat_id, text).await
    }

    async fn handle_command(&self, chat_id: i64, command: &str, args: &[&str]) -> Result<()> {
        match command {
            "start" => {
                self.send_with(
                    chat_id,
                    "Welcome to the Paddock garage bot! Choose an option:",
                    ReplyMarkup::Keyboard(main_keyboard()),
                )
                .await
            }
            "help" => self.send(chat_id, HELP_TEXT).await,
            "login" => match args {
                [] => {
                    self.store.set(chat_id, ChatState::AwaitingUsername).await;
                    self.send_with(
                        chat_id,
                        "Username:",
                        ReplyMarkup::Remove(ReplyKeyboardRemove::new()),
                    )
                    .await
                }
                [username, password] => self.try_login(chat_id, username, password).await,
                _ => {
                    self.send(chat_id, "Usage: /login <username> <password>")
                        .await
                }
            },
            "logout" => self.logout_chat(chat_id).await,
            "notify_on" => self.set_notifications(chat_id, true).await,
            "notify_off" => self.set_notifications(chat_id, false).await,
            "notify_time" => self.set_notify_time(chat_id, args).await,
            _ => self.send(chat_id, "Unknown command. Try /help.").await,
        }
    }

    async fn try_login(&self, chat_id: i64, username: &str, password: &str) -> Result<()> {
        match self
            .user_service
            .login(LoginInput::new(username, password))
            .await
        {
            Ok((session, user)) => {
                if user.must_change_password {
                    // Not usable until the password is changed in the web UI
                    let _ = self.user_service.logout(&session.id).await;
                    self.store.remove(chat_id).await;
                    return self
                        .send(
                            chat_id,
                            "Your account still has a temporary password. \
                             Sign in to the web app and change it first.",
                        )
                        .await;
                }
                self.store
                    .set(chat_id, ChatState::LoggedIn { token: session.id })
                    .await;
                tracing::info!(username = %user.username, chat_id, "Bot login");
                self.send_with(
                    chat_id,
                    &format!("Logged in as {}.", user.username),
                    ReplyMarkup::Keyboard(main_keyboard()),
                )
                .await
            }
            Err(UserServiceError::AuthenticationError(_)) => {
                self.store.remove(chat_id).await;
                self.send(chat_id, "Invalid username or password.").await
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot login failed");
                self.store.remove(chat_id).await;
                self.send(chat_id, OOPS).await
            }
        }
    }

    async fn logout_chat(&self, chat_id: i64) -> Result<()> {
        match self.store.remove(chat_id).await {
            Some(state) if state.token().is_some() => {
                if let Some(token) = state.token() {
                    let _ = self.user_service.logout(token).await;
                }
                tracing::info!(chat_id, "Bot logout");
                self.send_with(
                    chat_id,
                    "Logged out.",
                    ReplyMarkup::Remove(ReplyKeyboardRemove::new()),
                )
                .await
            }
            _ => self.send(chat_id, "You were not logged in.").await,
        }
    }

    async fn handle_text(&self, chat_id: i64, text: &str) -> Result<()> {
        match self.store.state(chat_id).await {
            ChatState::AwaitingUsername => {
                self.store
                    .set(
                        chat_id,
                        ChatState::AwaitingPassword {
                            username: text.to_string(),
                        },
                    )
                    .await;
                self.send(chat_id, "Password:").await
            }
            ChatState::AwaitingPassword { username } => {
                self.try_login(chat_id, &username, text).await
            }
            ChatState::AddingMaintenance { token, draft } => {
                self.advance_draft(chat_id, token, draft, text).await
            }
            ChatState::LoggedIn { .. } => self.handle_menu_button(chat_id, text).await,
            ChatState::Idle => self.send(chat_id, LOGIN_PROMPT).await,
        }
    }

    async fn handle_menu_button(&self, chat_id: i64, text: &str) -> Result<()> {
        if text == LOGOUT_BUTTON {
            return self.logout_chat(chat_id).await;
        }

        let Some(user) = self.current_user(chat_id).await? else {
            return self.send(chat_id, LOGIN_PROMPT).await;
        };

        match text {
            VEHICLES_BUTTON => self.list_vehicles(chat_id, &user).await,
            MAINTENANCE_BUTTON => {
                self.send_picker(chat_id, &user, PickerPurpose::Maintenance)
                    .await
            }
            EXPIRIES_BUTTON => {
                self.send_picker(chat_id, &user, PickerPurpose::Expiries)
                    .await
            }
            _ => {
                self.send(chat_id, "Pick an option from the menu, or /help.")
                    .await
            }
        }
    }

    async fn list_vehicles(&self, chat_id: i64, user: &User) -> Result<()> {
        let vehicles = match self.vehicle_service.list_vehicles(user).await {
            Ok(vehicles) => vehicles,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot vehicle listing failed");
                return self.send(chat_id, OOPS).await;
            }
        };

        if vehicles.is_empty() {
            return self.send(chat_id, "No vehicles yet.").await;
        }
        let lines: Vec<String> = vehicles
            .iter()
            .map(|v| {
                format!(
                    "ID {}: {} {} ({}), {} km",
                    v.id, v.make, v.model, v.plate, v.odometer
                )
            })
            .collect();
        self.send(chat_id, &lines.join("\n")).await
    }

    async fn send_picker(&self, chat_id: i64, user: &User, purpose: PickerPurpose) -> Result<()> {
        let vehicles = match self.vehicle_service.list_vehicles(user).await {
            Ok(vehicles) => vehicles,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot vehicle listing failed");
                return self.send(chat_id, OOPS).await;
            }
        };

        if vehicles.is_empty() {
            return self.send(chat_id, "No vehicles yet.").await;
        }
        self.send_with(
            chat_id,
            "Select a vehicle:",
            ReplyMarkup::Inline(vehicle_picker(&vehicles, purpose)),
        )
        .await
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<()> {
        // Private chats share the user's id, which covers the rare
        // callback arriving without its message
        let chat_id = query
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(query.from.id);

        if let Err(e) = self.client.answer_callback_query(&query.id).await {
            tracing::debug!(error = %e, "Failed to answer callback query");
        }

        let Some(data) = query.data.as_deref() else {
            return Ok(());
        };
        let Some(callback) = Callback::parse(data) else {
            tracing::debug!(data, "Unrecognized callback data");
            return Ok(());
        };

        match callback {
            Callback::Menu => {
                // Backing out of a half-finished draft drops it
                if let ChatState::AddingMaintenance { token, .. } = self.store.state(chat_id).await
                {
                    self.store.set(chat_id, ChatState::LoggedIn { token }).await;
                }
                self.send_main_menu(chat_id).await
            }
            Callback::Maintenance(vehicle_id) => {
                let Some(user) = self.current_user(chat_id).await? else {
                    return self.send(chat_id, LOGIN_PROMPT).await;
                };
                self.show_maintenance(chat_id, &user, vehicle_id).await
            }
            Callback::Expiries(vehicle_id, filter) => {
                let Some(user) = self.current_user(chat_id).await? else {
                    return self.send(chat_id, LOGIN_PROMPT).await;
                };
                let edit_message = query.message.as_ref().map(|m| m.message_id);
                self.show_expiries(chat_id, &user, vehicle_id, filter, edit_message)
                    .await
            }
            Callback::AddMaintenance(vehicle_id) => {
                self.start_add_maintenance(chat_id, vehicle_id).await
            }
            Callback::SaveMaintenance => self.save_draft(chat_id).await,
            Callback::CancelMaintenance => self.cancel_draft(chat_id).await,
        }
    }

    async fn show_maintenance(&self, chat_id: i64, user: &User, vehicle_id: i64) -> Result<()> {
        let vehicle = match self.vehicle_service.get_vehicle(user, vehicle_id).await {
            Ok(vehicle) => vehicle,
            Err(VehicleServiceError::NotFound) => {
                return self.send(chat_id, "Vehicle not found.").await;
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot vehicle lookup failed");
                return self.send(chat_id, OOPS).await;
            }
        };

        let records = match self
            .maintenance_service
            .list_records(user, vehicle_id)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot maintenance listing failed");
                return self.send(chat_id, OOPS).await;
            }
        };

        let mut lines = vec![format!(
            "\u{1F527} {} {} ({})",
            vehicle.make, vehicle.model, vehicle.plate
        )];
        if records.is_empty() {
            lines.push("No maintenance records yet.".to_string());
        }
        for record in &records {
            let mut line = format!("{}, {} km", record.performed_on, record.odometer);
            let done = record.checklist.done_count();
            if done == 1 {
                line.push_str(", 1 part");
            } else if done > 1 {
                line.push_str(&format!(", {} parts", done));
            }
            if !record.notes.is_empty() {
                line.push_str(&format!(" ({})", record.notes));
            }
            lines.push(line);
        }

        self.send_with(
            chat_id,
            &lines.join("\n"),
            ReplyMarkup::Inline(maintenance_keyboard(vehicle_id)),
        )
        .await
    }

    async fn show_expiries(
        &self,
        chat_id: i64,
        user: &User,
        vehicle_id: i64,
        filter: ExpiryFilter,
        edit_message: Option<i64>,
    ) -> Result<()> {
        let vehicle = match self.vehicle_service.get_vehicle(user, vehicle_id).await {
            Ok(vehicle) => vehicle,
            Err(VehicleServiceError::NotFound) => {
                return self.send(chat_id, "Vehicle not found.").await;
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot vehicle lookup failed");
                return self.send(chat_id, OOPS).await;
            }
        };

        let today = Utc::now().date_naive();
        let expiries = match self
            .expiry_service
            .list_expiries(user, vehicle_id, filter, today)
            .await
        {
            Ok(expiries) => expiries,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot expiry listing failed");
                return self.send(chat_id, OOPS).await;
            }
        };

        let mut lines = vec![format!(
            "\u{23F0} {} {} ({}), {} expiries",
            vehicle.make, vehicle.model, vehicle.plate, filter
        )];
        if expiries.is_empty() {
            lines.push("Nothing for this filter.".to_string());
        }
        for expiry in &expiries {
            let icon = match expiry.status_on(today) {
                ExpiryStatus::Overdue => "\u{26D4}",
                ExpiryStatus::Upcoming => "\u{26A0}",
                ExpiryStatus::Scheduled => "\u{1F4C5}",
            };
            lines.push(format!("{} {} due {}", icon, expiry.kind, expiry.due_on));
        }
        let text = lines.join("\n");
        let keyboard = expiry_keyboard(vehicle_id);

        match edit_message {
            Some(message_id) => {
                // Pressing the active filter again leaves the message as-is
                match self
                    .client
                    .edit_message_text(chat_id, message_id, &text, Some(keyboard))
                    .await
                {
                    Err(e) if e.is_not_modified() => Ok(()),
                    Err(e) => Err(e.into()),
                    Ok(()) => Ok(()),
                }
            }
            None => {
                self.send_with(chat_id, &text, ReplyMarkup::Inline(keyboard))
                    .await
            }
        }
    }

    async fn start_add_maintenance(&self, chat_id: i64, vehicle_id: i64) -> Result<()> {
        let Some(user) = self.current_user(chat_id).await? else {
            return self.send(chat_id, LOGIN_PROMPT).await;
        };
        // Check access up front rather than after the whole dialogue
        match self.vehicle_service.get_vehicle(&user, vehicle_id).await {
            Ok(_) => {}
            Err(VehicleServiceError::NotFound) => {
                return self.send(chat_id, "Vehicle not found.").await;
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot vehicle lookup failed");
                return self.send(chat_id, OOPS).await;
            }
        }
        let Some(token) = self.store.token(chat_id).await else {
            return self.send(chat_id, LOGIN_PROMPT).await;
        };

        self.store
            .set(
                chat_id,
                ChatState::AddingMaintenance {
                    token,
                    draft: MaintenanceDraft::new(vehicle_id),
                },
            )
            .await;
        self.send_with(
            chat_id,
            "Service date (YYYY-MM-DD):",
            ReplyMarkup::Remove(ReplyKeyboardRemove::new()),
        )
        .await
    }

    async fn advance_draft(
        &self,
        chat_id: i64,
        token: String,
        mut draft: MaintenanceDraft,
        text: &str,
    ) -> Result<()> {
        match draft.step {
            DraftStep::Date => match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                Ok(date) => {
                    draft.performed_on = Some(date);
                    draft.step = DraftStep::Odometer;
                    self.store
                        .set(chat_id, ChatState::AddingMaintenance { token, draft })
                        .await;
                    self.send(chat_id, "Odometer reading (km):").await
                }
                Err(_) => {
                    self.send(chat_id, "That is not a valid date. Use YYYY-MM-DD:")
                        .await
                }
            },
            DraftStep::Odometer => match text.parse::<i64>() {
                Ok(km) if km >= 0 => {
                    draft.odometer = Some(km);
                    draft.step = DraftStep::Notes;
                    self.store
                        .set(chat_id, ChatState::AddingMaintenance { token, draft })
                        .await;
                    self.send(chat_id, "Notes (or send - for none):").await
                }
                _ => {
                    self.send(chat_id, "The odometer reading must be a number:")
                        .await
                }
            },
            DraftStep::Notes => {
                draft.notes = if text == "-" {
                    String::new()
                } else {
                    text.to_string()
                };
                draft.step = DraftStep::Confirm;
                let summary = draft_summary(&draft);
                self.store
                    .set(chat_id, ChatState::AddingMaintenance { token, draft })
                    .await;
                self.send_with(
                    chat_id,
                    &summary,
                    ReplyMarkup::Inline(confirm_keyboard()),
                )
                .await
            }
            DraftStep::Confirm => {
                self.send(chat_id, "Use the Save or Cancel buttons below.")
                    .await
            }
        }
    }

    async fn save_draft(&self, chat_id: i64) -> Result<()> {
        let ChatState::AddingMaintenance { token, draft } = self.store.state(chat_id).await else {
            return self.send(chat_id, "Nothing to save.").await;
        };
        let Some(input) = draft.to_input() else {
            return self.send(chat_id, "The record is not complete yet.").await;
        };
        let Some(user) = self.current_user(chat_id).await? else {
            return self.send(chat_id, LOGIN_PROMPT).await;
        };

        match self
            .maintenance_service
            .add_record(&user, draft.vehicle_id, input)
            .await
        {
            Ok(record) => {
                tracing::info!(
                    chat_id,
                    vehicle_id = draft.vehicle_id,
                    record_id = record.id,
                    "Bot added maintenance record"
                );
                self.store.set(chat_id, ChatState::LoggedIn { token }).await;
                self.send_with(
                    chat_id,
                    "\u{2705} Maintenance saved.",
                    ReplyMarkup::Keyboard(main_keyboard()),
                )
                .await
            }
            Err(MaintenanceServiceError::ValidationError(message)) => {
                self.send(chat_id, &message).await
            }
            Err(MaintenanceServiceError::NotFound) => {
                self.store.set(chat_id, ChatState::LoggedIn { token }).await;
                self.send(chat_id, "Vehicle not found.").await
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Bot maintenance save failed");
                self.send(chat_id, OOPS).await
            }
        }
    }

    async fn cancel_draft(&self, chat_id: i64) -> Result<()> {
        if let ChatState::AddingMaintenance { token, .. } = self.store.state(chat_id).await {
            self.store.set(chat_id, ChatState::LoggedIn { token }).await;
            self.send_with(
                chat_id,
                "Cancelled.",
                ReplyMarkup::Keyboard(main_keyboard()),
            )
            .await
        } else {
            self.send(chat_id, "Nothing to cancel.").await
        }
    }

    async fn set_notifications(&self, chat_id: i64, enable: bool) -> Result<()> {
        if self.require_admin(chat_id).await?.is_none() {
            return Ok(());
        }
        let previous = self.settings.set_enabled(enable).await;
        let text = match (enable, previous) {
            (true, true) => "Notifications are already enabled.",
            (true, false) => "Daily notifications enabled.",
            (false, false) => "Notifications are already disabled.",
            (false, true) => "Daily notifications disabled.",
        };
        self.send(chat_id, text).await
    }

    async fn set_notify_time(&self, chat_id: i64, args: &[&str]) -> Result<()> {
        if self.require_admin(chat_id).await?.is_none() {
            return Ok(());
        }
        let Some((hour, minute)) = args.first().and_then(|s| parse_notify_time(s)) else {
            return self.send(chat_id, "Usage: /notify_time HH:MM (UTC)").await;
        };
        self.settings.set_time(hour, minute).await;
        tracing::info!(hour, minute, "Notification time changed");
        self.send(
            chat_id,
            &format!("Notifications scheduled at {:02}:{:02} UTC.", hour, minute),
        )
        .await
    }

    /// Resolve the chat's user and require the admin role, replying with
    /// the refusal when it does not hold
    async fn require_admin(&self, chat_id: i64) -> Result<Option<User>> {
        match self.current_user(chat_id).await? {
            None => {
                self.send(chat_id, LOGIN_PROMPT).await?;
                Ok(None)
            }
            Some(user) if !user.is_admin() => {
                self.send(chat_id, "Administrator privileges required.")
                    .await?;
                Ok(None)
            }
            Some(user) => Ok(Some(user)),
        }
    }
}
