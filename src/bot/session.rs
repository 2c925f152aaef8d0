//! Per-chat conversation state
//!
//! The bot keeps one state per Telegram chat in memory: logged out, somewhere
//! in the login dialogue, logged in (holding a session token verified against
//! the same session table as the web UI), or mid-way through adding a
//! maintenance record. State is process-local and lost on restart.

use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::models::{Checklist, CreateMaintenanceInput};

/// Where a chat currently is in its conversation with the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    /// No session; everything except /login and /help gets a login prompt
    Idle,
    /// `/login` without arguments; the next message is the username
    AwaitingUsername,
    /// Username received; the next message is the password
    AwaitingPassword { username: String },
    /// Authenticated with a session token
    LoggedIn { token: String },
    /// Authenticated and collecting a new maintenance record
    AddingMaintenance {
        token: String,
        draft: MaintenanceDraft,
    },
}

impl ChatState {
    /// The session token, for states that carry one
    pub fn token(&self) -> Option<&str> {
        match self {
            ChatState::LoggedIn { token } | ChatState::AddingMaintenance { token, .. } => {
                Some(token)
            }
            _ => None,
        }
    }
}

/// Which field the add-maintenance dialogue asks for next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStep {
    Date,
    Odometer,
    Notes,
    Confirm,
}

/// Partially collected maintenance record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceDraft {
    pub vehicle_id: i64,
    pub step: DraftStep,
    pub performed_on: Option<NaiveDate>,
    pub odometer: Option<i64>,
    pub notes: String,
}

impl MaintenanceDraft {
    /// Start a fresh draft for a vehicle, asking for the date first
    pub fn new(vehicle_id: i64) -> Self {
        Self {
            vehicle_id,
            step: DraftStep::Date,
            performed_on: None,
            odometer: None,
            notes: String::new(),
        }
    }

    /// Turn a completed draft into service input; None until the dialogue
    /// reached the confirm step.
    pub fn to_input(&self) -> Option<CreateMaintenanceInput> {
        if self.step != DraftStep::Confirm {
            return None;
        }
        Some(CreateMaintenanceInput {
            performed_on: self.performed_on?,
            odometer: self.odometer?,
            checklist: Checklist::default(),
            notes: self.notes.clone(),
        })
    }
}

/// In-memory chat states, keyed by chat id
pub struct BotSessionStore {
    chats: RwLock<HashMap<i64, ChatState>>,
}

impl BotSessionStore {
    pub fn new() -> Self {
        Self {
            chats: RwLock::new(HashMap::new()),
        }
    }

    /// Current state of a chat; unknown chats are Idle
    pub async fn state(&self, chat_id: i64) -> ChatState {
        self.chats
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or(ChatState::Idle)
    }

    pub async fn set(&self, chat_id: i64, state: ChatState) {
        self.chats.write().await.insert(chat_id, state);
    }

    /// Drop a chat's state, returning what it was
    pub async fn remove(&self, chat_id: i64) -> Option<ChatState> {
        self.chats.write().await.remove(&chat_id)
    }

    /// The chat's session token, if it is logged in
    pub async fn token(&self, chat_id: i64) -> Option<String> {
        self.chats
            .read()
            .await
            .get(&chat_id)
            .and_then(|s| s.token().map(|t| t.to_string()))
    }

    /// All chats holding a session token, for the notifier
    pub async fn logged_in_chats(&self) -> Vec<(i64, String)> {
        self.chats
            .read()
            .await
            .iter()
            .filter_map(|(chat_id, state)| state.token().map(|t| (*chat_id, t.to_string())))
            .collect()
    }
}

impl Default for BotSessionStore {
    fn default() -> Self {
        Self::new()
    }
}
