//! Shared application state handed to every route.

use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::settings::Settings;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
    /// Built once at startup; the schema only changes through migrations.
    pub model: Arc<ResolvedModel>,
}

impl AppState {
    pub fn new(pool: PgPool, settings: Settings, model: ResolvedModel) -> Self {
        AppState {
            pool,
            settings: Arc::new(settings),
            model: Arc::new(model),
        }
    }

    /// Entity exposed at `path`, with `operation` enabled.
    pub fn entity(&self, path: &str, operation: &str) -> Result<&ResolvedEntity, AppError> {
        let entity = self
            .model
            .entity_by_path(path)
            .ok_or_else(|| AppError::NotFound(format!("no entity at /{}", path)))?;
        if !entity.allows(operation) {
            return Err(AppError::BadRequest(format!("{} not allowed on {}", operation, path)));
        }
        Ok(entity)
    }
}
