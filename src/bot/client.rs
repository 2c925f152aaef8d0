//! Thin Telegram Bot API client
//!
//! Plain HTTP against `api.telegram.org` with reqwest; every method is a
//! POST of a JSON payload. Only the handful of calls the bot needs are
//! wrapped.

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::types::{ApiResponse, InlineKeyboardMarkup, Message, ReplyMarkup, TelegramUser, Update};

/// Error types for Bot API calls
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("Telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Telegram answered with ok=false
    #[error("Telegram rejected {method}: {description}")]
    Api { method: String, description: String },
}

impl BotError {
    /// True for the edit-without-changes rejection, which callers may
    /// safely ignore (pressing the same filter button twice).
    pub fn is_not_modified(&self) -> bool {
        matches!(self, BotError::Api { description, .. } if description.contains("message is not modified"))
    }
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
}

impl BotClient {
    /// Create a client for the given bot token
    pub fn new(token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Paddock-Bot")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            base_url: format!("https://api.telegram.org/bot{}", token),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T, BotError> {
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(payload)
            .send()
            .await?;

        let api: ApiResponse<T> = response.json().await?;
        if !api.ok {
            return Err(BotError::Api {
                method: method.to_string(),
                description: api
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }
        api.result.ok_or_else(|| BotError::Api {
            method: method.to_string(),
            description: "ok response without result".to_string(),
        })
    }

    /// getMe - identify the bot account the token belongs to
    pub async fn get_me(&self) -> Result<TelegramUser, BotError> {
        self.call("getMe", &serde_json::json!({}), Duration::from_secs(30))
            .await
    }

    /// getUpdates - long poll for new updates
    ///
    /// Blocks server-side for up to `timeout_secs`; the request timeout
    /// leaves headroom on top of that.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, BotError> {
        let payload = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call(
            "getUpdates",
            &payload,
            Duration::from_secs(timeout_secs + 10),
        )
        .await
    }

    /// sendMessage, optionally with a keyboard
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<Message, BotError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = serde_json::json!(markup);
        }
        self.call("sendMessage", &payload, Duration::from_secs(30))
            .await
    }

    /// editMessageText - rewrite a sent message (used by the filter buttons)
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), BotError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = serde_json::json!(markup);
        }
        // The result is the edited Message (or True); nothing we need
        let _: serde_json::Value = self
            .call("editMessageText", &payload, Duration::from_secs(30))
            .await?;
        Ok(())
    }

    /// answerCallbackQuery - stop the client-side spinner after a button press
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), BotError> {
        let payload = serde_json::json!({ "callback_query_id": callback_query_id });
        let _: serde_json::Value = self
            .call("answerCallbackQuery", &payload, Duration::from_secs(30))
            .await?;
        Ok(())
    }
}
