//! Configuration management
//!
//! This module handles loading and parsing configuration for the Paddock
//! vehicle tracker. Configuration can be loaded from:
//! - config.yaml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults, so the binary
//! starts with no config file at all. The bot token and the session secret
//! are expected to arrive through the environment in real deployments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Upload configuration
    #[serde(default)]
    pub uploads: UploadConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Bot configuration
    #[serde(default)]
    pub bot: BotConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            uploads: UploadConfig::default(),
            session: SessionConfig::default(),
            bot: BotConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/paddock.db")
}

/// Upload configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload root directory; photos, documents and profile images live in
    /// subdirectories underneath it
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed MIME types for vehicle photos and profile images
    #[serde(default = "default_allowed_image_types")]
    pub allowed_image_types: Vec<String>,
    /// Allowed MIME types for the vehicle document
    #[serde(default = "default_allowed_document_types")]
    pub allowed_document_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_image_types: default_allowed_image_types(),
            allowed_document_types: default_allowed_document_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_image_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

fn default_allowed_document_types() -> Vec<String> {
    vec![
        "application/pdf".to_string(),
        "image/jpeg".to_string(),
        "image/png".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed for photo uploads
    pub fn is_image_allowed(&self, mime_type: &str) -> bool {
        self.allowed_image_types.iter().any(|t| t == mime_type)
    }

    /// Check if a MIME type is allowed for document uploads
    pub fn is_document_allowed(&self, mime_type: &str) -> bool {
        self.allowed_document_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn extension_for(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "application/pdf" => "pdf",
            _ => "bin",
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Secret used to sign the session cookie. Deployments set this through
    /// PADDOCK_SESSION_SECRET; an empty value makes the server generate a
    /// random one at startup (cookies then die with the process).
    #[serde(default)]
    pub secret: String,
    /// Session lifetime in days
    #[serde(default = "default_session_ttl_days")]
    pub ttl_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_days: default_session_ttl_days(),
        }
    }
}

fn default_session_ttl_days() -> i64 {
    7
}

/// Bot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Telegram bot token; usually provided via PADDOCK_BOT_TOKEN or
    /// TELEGRAM_TOKEN. When absent the bot half stays disabled.
    #[serde(default)]
    pub token: Option<String>,
    /// Long-poll timeout in seconds for getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Whether the daily expiry notifications start enabled
    #[serde(default)]
    pub notifications_enabled: bool,
    /// Hour (UTC) of the daily notification
    #[serde(default = "default_notify_hour")]
    pub notify_hour: u8,
    /// Minute of the daily notification
    #[serde(default)]
    pub notify_minute: u8,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            poll_timeout_secs: default_poll_timeout(),
            notifications_enabled: false,
            notify_hour: default_notify_hour(),
            notify_minute: 0,
        }
    }
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_notify_hour() -> u8 {
    8
}

/// Parse a "HH:MM" string into (hour, minute), validating the ranges.
///
/// Used by the config env override and by the bot's /notify_time command.
pub fn parse_notify_time(s: &str) -> Option<(u8, u8)> {
    let (h, m) = s.trim().split_once(':')?;
    let hour: u8 = h.parse().ok()?;
    let minute: u8 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - PADDOCK_SERVER_HOST
    /// - PADDOCK_SERVER_PORT
    /// - PADDOCK_DATABASE_PATH
    /// - PADDOCK_UPLOAD_PATH
    /// - PADDOCK_SESSION_SECRET
    /// - PADDOCK_SESSION_TTL_DAYS
    /// - PADDOCK_BOT_TOKEN (or TELEGRAM_TOKEN)
    /// - PADDOCK_BOT_NOTIFY_TIME (HH:MM, UTC)
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PADDOCK_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PADDOCK_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(path) = std::env::var("PADDOCK_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("PADDOCK_UPLOAD_PATH") {
            self.uploads.path = PathBuf::from(path);
        }

        if let Ok(secret) = std::env::var("PADDOCK_SESSION_SECRET") {
            self.session.secret = secret;
        }
        if let Ok(ttl) = std::env::var("PADDOCK_SESSION_TTL_DAYS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                if ttl > 0 {
                    self.session.ttl_days = ttl;
                }
            }
        }

        // PADDOCK_BOT_TOKEN wins over the conventional TELEGRAM_TOKEN
        if let Ok(token) = std::env::var("PADDOCK_BOT_TOKEN") {
            self.bot.token = Some(token);
        } else if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            self.bot.token = Some(token);
        }
        if let Ok(time) = std::env::var("PADDOCK_BOT_NOTIFY_TIME") {
            if let Some((hour, minute)) = parse_notify_time(&time) {
                self.bot.notify_hour = hour;
                self.bot.notify_minute = minute;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
// Both `tests` and `property_tests` modules use this to prevent race conditions.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        for var in [
            "PADDOCK_SERVER_HOST",
            "PADDOCK_SERVER_PORT",
            "PADDOCK_DATABASE_PATH",
            "PADDOCK_UPLOAD_PATH",
            "PADDOCK_SESSION_SECRET",
            "PADDOCK_SESSION_TTL_DAYS",
            "PADDOCK_BOT_TOKEN",
            "TELEGRAM_TOKEN",
            "PADDOCK_BOT_NOTIFY_TIME",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yaml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, PathBuf::from("data/paddock.db"));
        assert_eq!(config.uploads.path, PathBuf::from("data/uploads"));
        assert_eq!(config.session.ttl_days, 7);
        assert!(config.bot.token.is_none());
        assert!(!config.bot.notifications_enabled);
        assert_eq!(config.bot.notify_hour, 8);
        assert_eq!(config.bot.notify_minute, 0);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 3000\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        // Specified value
        assert_eq!(config.server.port, 3000);
        // Default values
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.path, PathBuf::from("data/paddock.db"));
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
database:
  path: "var/fleet.db"
uploads:
  path: "var/uploads"
  max_file_size: 1048576
session:
  secret: "topsecret"
  ttl_days: 30
bot:
  token: "123:abc"
  poll_timeout_secs: 10
  notifications_enabled: true
  notify_hour: 7
  notify_minute: 30
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("var/fleet.db"));
        assert_eq!(config.uploads.path, PathBuf::from("var/uploads"));
        assert_eq!(config.uploads.max_file_size, 1048576);
        assert_eq!(config.session.secret, "topsecret");
        assert_eq!(config.session.ttl_days, 30);
        assert_eq!(config.bot.token.as_deref(), Some("123:abc"));
        assert_eq!(config.bot.poll_timeout_secs, 10);
        assert!(config.bot.notifications_enabled);
        assert_eq!(config.bot.notify_hour, 7);
        assert_eq!(config.bot.notify_minute, 30);
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let result = Config::load(file.path());

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("parse") || err_msg.contains("invalid"));
    }

    #[test]
    fn test_load_malformed_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  host: [invalid yaml").unwrap();

        let result = Config::load(file.path());

        assert!(result.is_err());
    }

    #[test]
    fn test_env_override_server_config() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  host: \"0.0.0.0\"\n  port: 8080\n").unwrap();

        std::env::set_var("PADDOCK_SERVER_HOST", "192.168.1.1");
        std::env::set_var("PADDOCK_SERVER_PORT", "4000");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 4000);

        clear_env();
    }

    #[test]
    fn test_env_override_paths_and_secret() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        std::env::set_var("PADDOCK_DATABASE_PATH", "/var/lib/paddock/db.sqlite");
        std::env::set_var("PADDOCK_UPLOAD_PATH", "/var/lib/paddock/uploads");
        std::env::set_var("PADDOCK_SESSION_SECRET", "s3cret");
        std::env::set_var("PADDOCK_SESSION_TTL_DAYS", "14");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(
            config.database.path,
            PathBuf::from("/var/lib/paddock/db.sqlite")
        );
        assert_eq!(
            config.uploads.path,
            PathBuf::from("/var/lib/paddock/uploads")
        );
        assert_eq!(config.session.secret, "s3cret");
        assert_eq!(config.session.ttl_days, 14);

        clear_env();
    }

    #[test]
    fn test_env_override_bot_token_alias() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        std::env::set_var("TELEGRAM_TOKEN", "111:legacy");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.bot.token.as_deref(), Some("111:legacy"));

        // PADDOCK_BOT_TOKEN takes precedence over the alias
        std::env::set_var("PADDOCK_BOT_TOKEN", "222:primary");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.bot.token.as_deref(), Some("222:primary"));

        clear_env();
    }

    #[test]
    fn test_env_override_notify_time() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        std::env::set_var("PADDOCK_BOT_NOTIFY_TIME", "06:45");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.bot.notify_hour, 6);
        assert_eq!(config.bot.notify_minute, 45);

        clear_env();
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("PADDOCK_SERVER_PORT", "not_a_number");
        std::env::set_var("PADDOCK_SESSION_TTL_DAYS", "-3");
        std::env::set_var("PADDOCK_BOT_NOTIFY_TIME", "25:99");

        let config = Config::load_with_env(file.path()).unwrap();

        // Invalid values keep whatever the file/defaults said
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.ttl_days, 7);
        assert_eq!(config.bot.notify_hour, 8);
        assert_eq!(config.bot.notify_minute, 0);

        clear_env();
    }

    #[test]
    fn test_parse_notify_time() {
        assert_eq!(parse_notify_time("08:00"), Some((8, 0)));
        assert_eq!(parse_notify_time("23:59"), Some((23, 59)));
        assert_eq!(parse_notify_time(" 7:05 "), Some((7, 5)));
        assert_eq!(parse_notify_time("24:00"), None);
        assert_eq!(parse_notify_time("12:60"), None);
        assert_eq!(parse_notify_time("noon"), None);
        assert_eq!(parse_notify_time("12"), None);
    }

    #[test]
    fn test_upload_type_checks() {
        let config = UploadConfig::default();

        assert!(config.is_image_allowed("image/jpeg"));
        assert!(config.is_image_allowed("image/png"));
        assert!(!config.is_image_allowed("application/pdf"));
        assert!(config.is_document_allowed("application/pdf"));
        assert!(!config.is_document_allowed("image/gif"));
        assert_eq!(config.extension_for("image/webp"), "webp");
        assert_eq!(config.extension_for("application/pdf"), "pdf");
        assert_eq!(config.extension_for("video/mp4"), "bin");
    }
}
