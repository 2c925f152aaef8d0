//! Database layer
//!
//! SQLite access for the Paddock vehicle tracker: pool creation, embedded
//! migrations and the per-aggregate repositories.
//!
//! # Usage
//!
//! ```ignore
//! use paddock::config::DatabaseConfig;
//! use paddock::db::{create_pool, migrations};
//!
//! let config = DatabaseConfig::default();
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool};
