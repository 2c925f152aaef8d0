//! Daily expiry notifications
//!
//! One background task wakes at the configured HH:MM (UTC) and sends every
//! logged-in chat the report of overdue and soon-due expiries its user can
//! see. Empty reports are not sent. Schedule and enabled flag start from
//! config and are adjustable at runtime through the admin commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::RwLock;

use crate::models::ExpiryStatus;
use crate::services::{DueExpiry, ExpiryService, UserService};

use super::client::BotClient;
use super::session::BotSessionStore;

/// Mutable notification schedule shared between the commands and the task
pub struct NotifySettings {
    state: RwLock<NotifyState>,
}

#[derive(Debug, Clone, Copy)]
struct NotifyState {
    enabled: bool,
    hour: u8,
    minute: u8,
}

impl NotifySettings {
    pub fn new(enabled: bool, hour: u8, minute: u8) -> Self {
        Self {
            state: RwLock::new(NotifyState {
                enabled,
                hour,
                minute,
            }),
        }
    }

    pub async fn enabled(&self) -> bool {
        self.state.read().await.enabled
    }

    /// Flip the enabled flag, returning what it was
    pub async fn set_enabled(&self, enabled: bool) -> bool {
        let mut state = self.state.write().await;
        let previous = state.enabled;
        state.enabled = enabled;
        previous
    }

    pub async fn time(&self) -> (u8, u8) {
        let state = self.state.read().await;
        (state.hour, state.minute)
    }

    pub async fn set_time(&self, hour: u8, minute: u8) {
        let mut state = self.state.write().await;
        state.hour = hour;
        state.minute = minute;
    }
}

/// Seconds from `now` to the next HH:MM (UTC); a target at or before `now`
/// means tomorrow's occurrence.
pub fn seconds_until(now: DateTime<Utc>, hour: u8, minute: u8) -> u64 {
    let target_time = NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), 0)
        .unwrap_or(NaiveTime::MIN);
    let mut target = now.date_naive().and_time(target_time).and_utc();
    if target <= now {
        target += chrono::Duration::days(1);
    }
    (target - now).num_seconds().max(0) as u64
}

/// Render a report as a plain-text message
pub fn format_report(report: &[DueExpiry]) -> String {
    let mut lines = vec!["\u{1F4E3} Expiries needing attention:".to_string()];
    for due in report {
        let line = match due.status {
            ExpiryStatus::Overdue => format!(
                "\u{26D4} {} {}: {} was due {}",
                due.vehicle.make, due.vehicle.plate, due.expiry.kind, due.expiry.due_on
            ),
            _ => format!(
                "\u{26A0} {} {}: {} due {}",
                due.vehicle.make, due.vehicle.plate, due.expiry.kind, due.expiry.due_on
            ),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// The notification task; runs until the process exits
///
/// Sleeps in one-minute slices so schedule changes made through the admin
/// commands take effect without restarting the task.
pub async fn run(
    client: BotClient,
    store: Arc<BotSessionStore>,
    user_service: Arc<UserService>,
    expiry_service: Arc<ExpiryService>,
    settings: Arc<NotifySettings>,
) {
    loop {
        let (hour, minute) = settings.time().await;
        let wait = seconds_until(Utc::now(), hour, minute);
        if wait > 60 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            continue;
        }
        tokio::time::sleep(Duration::from_secs(wait)).await;

        if !settings.enabled().await {
            continue;
        }
        send_reports(&client, &store, &user_service, &expiry_service).await;
    }
}

async fn send_reports(
    client: &BotClient,
    store: &BotSessionStore,
    user_service: &UserService,
    expiry_service: &ExpiryService,
) {
    let today = Utc::now().date_naive();

    for (chat_id, token) in store.logged_in_chats().await {
        let user = match user_service.validate_session(&token).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                // Session died server-side; drop the stale chat state
                store.remove(chat_id).await;
                continue;
            }
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "Failed to resolve chat session");
                continue;
            }
        };

        let report = match expiry_service.attention_report(&user, today).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "Failed to build expiry report");
                continue;
            }
        };
        if report.is_empty() {
            continue;
        }

        match client
            .send_message(chat_id, &format_report(&report), None)
            .await
        {
            Ok(_) => {
                tracing::info!(chat_id, items = report.len(), "Sent expiry notification")
            }
            Err(e) => tracing::warn!(chat_id, error = %e, "Failed to send notification"),
        }
    }
}
