#![allow(dead_code)]

use forum_api::db::{connect_with_retry, ensure_database_exists, lazy_pool};
use forum_api::{build_router, models, resolve, AppState, ResolvedModel, Settings};
use sqlx::PgPool;
use std::collections::HashMap;

pub fn settings_from(pairs: &[(&str, &str)]) -> Settings {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Settings::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// Settings pointing at a port nothing listens on, failing fast.
pub fn unreachable_settings() -> Settings {
    settings_from(&[
        ("APP_ENV", "test"),
        ("APP_HOST", "127.0.0.1"),
        ("APP_PORT", "18090"),
        ("POSTGRES_HOST", "127.0.0.1"),
        ("POSTGRES_PORT", "1"),
        ("DB_CONNECT_TIMEOUT_SECS", "1"),
        ("DB_CONNECT_RETRIES", "1"),
    ])
}

pub fn model() -> ResolvedModel {
    resolve(&models::model_graph(), &models::api_entities()).unwrap()
}

/// Router over a pool that never connects; only routes that fail before touching the database are usable.
pub fn offline_router() -> axum::Router {
    let settings = unreachable_settings();
    let pool = lazy_pool(&settings.database);
    build_router(AppState::new(pool, settings, model()))
}

/// A new, empty database on the server named by the `POSTGRES_*` environment.
pub async fn fresh_database(max_connections: u32) -> (Settings, PgPool) {
    let mut settings = Settings::from_env().unwrap();
    settings.database.name = format!("forum_test_{}", rand::random::<u32>());
    settings.database.max_connections = max_connections;
    ensure_database_exists(&settings.database).await.unwrap();
    let pool = connect_with_retry(&settings.database).await.unwrap();
    (settings, pool)
}
