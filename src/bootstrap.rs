//! Startup sequence: configure, connect and register migrations, apply the schema, then serve.
//!
//! The phases only move forward, one step at a time, or to `Failed`. The listener
//! is bound after the schema is applied, so no request ever sees a partial schema.

use crate::config::{resolve, ResolvedModel};
use crate::db;
use crate::error::{BootstrapError, ConfigError};
use crate::migration::{InitDbOutcome, MigrationSource, Migrator};
use crate::models;
use crate::routes::build_router;
use crate::settings::Settings;
use crate::state::AppState;
use sqlx::PgPool;
use std::future::Future;
use tokio::net::TcpListener;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unconfigured,
    Configured,
    MigrationsInitialized,
    SchemaApplied,
    Serving,
    Failed,
}

impl Phase {
    /// The only forward edge out of this phase.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Unconfigured => Some(Phase::Configured),
            Phase::Configured => Some(Phase::MigrationsInitialized),
            Phase::MigrationsInitialized => Some(Phase::SchemaApplied),
            Phase::SchemaApplied => Some(Phase::Serving),
            Phase::Serving | Phase::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == Phase::Failed
    }
}

#[derive(Debug)]
pub struct Bootstrap {
    phase: Phase,
    history: Vec<Phase>,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl Bootstrap {
    pub fn new() -> Self {
        Bootstrap {
            phase: Phase::Unconfigured,
            history: vec![Phase::Unconfigured],
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, in order.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn transition(&mut self, to: Phase) -> Result<(), BootstrapError> {
        let allowed = match to {
            Phase::Failed => !self.phase.is_terminal(),
            _ => self.phase.next() == Some(to),
        };
        if !allowed {
            return Err(BootstrapError::IllegalTransition { from: self.phase, to });
        }
        tracing::info!(from = ?self.phase, to = ?to, "bootstrap phase");
        self.phase = to;
        self.history.push(to);
        Ok(())
    }

    /// Record a fatal error and move to `Failed`.
    pub fn fail(&mut self, error: &BootstrapError) {
        tracing::error!(phase = ?self.phase, error = %error, "bootstrap failed");
        if !self.phase.is_terminal() {
            self.phase = Phase::Failed;
            self.history.push(Phase::Failed);
        }
    }

    /// Run every step and serve until `shutdown` resolves. Any error leaves the bootstrap in `Failed`.
    pub async fn run<F>(&mut self, settings: Result<Settings, ConfigError>, shutdown: F) -> Result<(), BootstrapError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let result = self.run_steps(settings, shutdown).await;
        if let Err(ref e) = result {
            self.fail(e);
        }
        result
    }

    async fn run_steps<F>(&mut self, settings: Result<Settings, ConfigError>, shutdown: F) -> Result<(), BootstrapError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (settings, model) = self.configure(settings)?;
        let (pool, migrator) = self.connect(&settings).await?;
        self.apply_schema(&pool, &migrator).await?;

        let addr = settings.listen_addr();
        let listener = TcpListener::bind(addr).await?;
        self.transition(Phase::Serving)?;
        tracing::info!(%addr, "listening");
        let app = build_router(AppState::new(pool, settings, model));
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
        tracing::info!("server stopped");
        Ok(())
    }

    pub fn configure(&mut self, settings: Result<Settings, ConfigError>) -> Result<(Settings, ResolvedModel), BootstrapError> {
        let settings = settings?;
        let model = resolve(&models::model_graph(), &models::api_entities())?;
        tracing::info!(environment = ?settings.environment, database = %settings.database.target(), "settings resolved");
        self.transition(Phase::Configured)?;
        Ok((settings, model))
    }

    pub async fn connect(&mut self, settings: &Settings) -> Result<(PgPool, Migrator), BootstrapError> {
        let pool = db::connect_with_retry(&settings.database).await?;
        let mut migrator = Migrator::new();
        migrator.init(MigrationSource::forum())?;
        self.transition(Phase::MigrationsInitialized)?;
        Ok((pool, migrator))
    }

    pub async fn apply_schema(&mut self, pool: &PgPool, migrator: &Migrator) -> Result<(), BootstrapError> {
        match migrator.init_db(pool).await? {
            InitDbOutcome::Initialized { applied } => tracing::info!(%applied, "database initialized"),
            InitDbOutcome::AlreadyInitialized => tracing::info!("database already initialized"),
        }
        let applied = migrator.upgrade(pool).await?;
        tracing::info!(count = applied.len(), ?applied, "schema up to date");
        self.transition(Phase::SchemaApplied)
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
