//! Forum API: persons, comments and votes over PostgreSQL, with versioned schema migrations
//! and a phased startup that only serves once the schema is current.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod models;
pub mod openapi;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;

pub use bootstrap::{shutdown_signal, Bootstrap, Phase};
pub use config::{resolve, ResolvedEntity, ResolvedModel};
pub use error::{AppError, BootstrapError, ConfigError, MigrationError};
pub use migration::{InitDbOutcome, MigrationSource, Migrator};
pub use routes::build_router;
pub use settings::Settings;
pub use state::AppState;
