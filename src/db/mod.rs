pub mod models;
pub mod repositories;
mod error;

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

pub use error::DatabaseError;
pub use models::*;

/// Initialize the database connection pool.
///
/// The schema is owned by the surrounding application; this service only
/// connects to it.
pub async fn init_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.unwrap_or(10))
        .min_connections(config.min_connections.unwrap_or(1))
        .connect(config.url.expose_secret())
        .await
        .context("Failed to connect to the database")?;

    Ok(pool)
}
