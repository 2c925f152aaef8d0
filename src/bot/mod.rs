//! Telegram companion bot
//!
//! A thin front end over the same services the web UI uses: members log in
//! with their web credentials, browse their vehicles, check expiries and
//! append maintenance records from chat. A background task pushes a daily
//! digest of expiries that need attention.
//!
//! The bot half only starts when a token is configured; the web app is
//! fully functional without it.

pub mod client;
pub mod commands;
pub mod menu;
pub mod notifier;
pub mod session;
pub mod types;

pub use client::{BotClient, BotError};
pub use commands::BotHandler;
pub use notifier::NotifySettings;
pub use session::BotSessionStore;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::{ExpiryService, MaintenanceService, UserService, VehicleService};

/// Connect and long-poll for updates until the process exits
///
/// Poll failures are logged and retried with a short backoff; update
/// handling failures never stop the loop.
pub async fn run(
    config: Arc<Config>,
    user_service: Arc<UserService>,
    vehicle_service: Arc<VehicleService>,
    maintenance_service: Arc<MaintenanceService>,
    expiry_service: Arc<ExpiryService>,
) -> anyhow::Result<()> {
    let Some(token) = config.bot.token.as_deref() else {
        anyhow::bail!("Telegram bot token is not configured");
    };
    let client = BotClient::new(token)?;
    let me = client.get_me().await?;
    tracing::info!(
        username = me.username.as_deref().unwrap_or("unknown"),
        "Bot connected"
    );

    let store = Arc::new(BotSessionStore::new());
    let settings = Arc::new(NotifySettings::new(
        config.bot.notifications_enabled,
        config.bot.notify_hour,
        config.bot.notify_minute,
    ));

    tokio::spawn(notifier::run(
        client.clone(),
        store.clone(),
        user_service.clone(),
        expiry_service.clone(),
        settings.clone(),
    ));

    let handler = BotHandler::new(
        client.clone(),
        store,
        settings,
        user_service,
        vehicle_service,
        maintenance_service,
        expiry_service,
    );

    let mut offset: Option<i64> = None;
    loop {
        match client
            .get_updates(offset, config.bot.poll_timeout_secs)
            .await
        {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    if let Err(e) = handler.handle_update(update).await {
                        tracing::warn!(error = %e, "Failed to handle bot update");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Polling for bot updates failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
