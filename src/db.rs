//! Connection pool setup: optional database creation and bounded connect retry.

use crate::error::BootstrapError;
use crate::settings::DatabaseSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::{ConnectOptions, PgPool};
use std::time::Duration;

const MAINTENANCE_DB: &str = "postgres";
const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

pub fn pool_options(db: &DatabaseSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(db.max_connections)
        .acquire_timeout(db.connect_timeout)
}

/// Pool that connects on first use. Never fails; used where the database may be absent.
pub fn lazy_pool(db: &DatabaseSettings) -> PgPool {
    pool_options(db).connect_lazy_with(db.connect_options())
}

/// Delay before retry number `attempt` (0-based): 500ms, 1s, 2s, ... capped at 8s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(5);
    (BASE_BACKOFF * factor).min(MAX_BACKOFF)
}

/// Connect with `1 + connect_retries` attempts and exponential backoff between them.
pub async fn connect_with_retry(db: &DatabaseSettings) -> Result<PgPool, BootstrapError> {
    let attempts = db.connect_retries.saturating_add(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_connect(db).await {
            Ok(pool) => {
                tracing::info!(target_db = %db.target(), attempt, "database connected");
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                let delay = backoff_delay(attempt - 1);
                tracing::warn!(
                    target_db = %db.target(),
                    attempt,
                    of = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                return Err(BootstrapError::Connectivity {
                    target: db.target(),
                    attempts,
                    source,
                });
            }
        }
    }
}

async fn try_connect(db: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    if db.create_if_missing {
        ensure_database_exists(db).await?;
    }
    pool_options(db).connect_with(db.connect_options()).await
}

/// Create the configured database through the maintenance database when it does not exist.
/// Returns true when it was created.
pub async fn ensure_database_exists(db: &DatabaseSettings) -> Result<bool, sqlx::Error> {
    if db.name.is_empty() || db.name == MAINTENANCE_DB {
        return Ok(false);
    }
    let mut conn = db.connect_options_for(MAINTENANCE_DB).connect().await?;
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db.name)
        .fetch_one(&mut conn)
        .await?;
    if exists {
        return Ok(false);
    }
    sqlx::query(&format!("CREATE DATABASE {}", crate::config::quote_ident(&db.name)))
        .execute(&mut conn)
        .await?;
    tracing::info!(database = %db.name, "database created");
    Ok(true)
}
