//! Database connection pool
//!
//! SQLite is the only backend; the pool factory creates the database file
//! (and its parent directories) on first start and enables foreign keys,
//! which SQLite leaves off by default.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::config::DatabaseConfig;

/// Create a SQLite connection pool from configuration.
///
/// The database file is created if missing (`mode=rwc`), and
/// `PRAGMA foreign_keys = ON` is applied so ownership cascades
/// (user -> vehicles -> records) actually fire.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    connect(&config.path.to_string_lossy()).await
}

/// Create a SQLite in-memory database pool for testing
pub async fn create_test_pool() -> Result<SqlitePool> {
    connect(":memory:").await
}

async fn connect(path: &str) -> Result<SqlitePool> {
    // Ensure the database directory exists for file-based SQLite
    if path != ":memory:" {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {:?}", parent)
                })?;
            }
        }
    }

    let connection_url = if path == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite:{}?mode=rwc", path)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .connect(&connection_url)
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {}", path))?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .context("Failed to enable foreign keys")?;

    Ok(pool)
}
