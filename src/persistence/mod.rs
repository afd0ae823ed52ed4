//! Persistence Layer
//!
//! SQLite storage for per-account sync documents and user subscriptions,
//! with async access via sqlx.
//!
//! # Database Schema
//!
//! ## account_documents
//! - account_id: Broker account id (primary key)
//! - document: JSON `{positions, metrics, syncMetadata, instrumentCache}`
//! - last_sync: Timestamp copied out of the document for inspection
//! - updated_at: Timestamp
//!
//! ## subscriptions
//! - user_id: Primary key
//! - plan_name, max_accounts, max_strategies
//! - is_active, is_banned, is_cancelled: 0/1 flags
//! - updated_at: Timestamp

pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Initialize the database connection pool and run migrations
///
/// # Arguments
/// - `database_url`: e.g. "sqlite://data/tradepulse.db"
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");
    Ok(pool)
}

/// Single-connection in-memory database, used by tests
pub async fn init_memory_database() -> Result<DbPool, DatabaseError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS account_documents (
            account_id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            last_sync DATETIME NOT NULL,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create account_documents table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            user_id TEXT PRIMARY KEY,
            plan_name TEXT NOT NULL,
            max_accounts INTEGER NOT NULL CHECK(max_accounts >= 0),
            max_strategies INTEGER NOT NULL CHECK(max_strategies >= 0),
            is_active INTEGER NOT NULL DEFAULT 1,
            is_banned INTEGER NOT NULL DEFAULT 0,
            is_cancelled INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create subscriptions table: {}", e))
    })?;

    info!("✓ Migrations complete");
    Ok(())
}
