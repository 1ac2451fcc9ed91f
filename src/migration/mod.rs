//! Versioned schema migrations: DDL rendering, the migration list and the runtime that applies it.

pub mod ddl;
pub mod runtime;
pub mod versions;

pub use ddl::MigrationStep;
pub use runtime::{InitDbOutcome, MigrationSource, MigrationStatus, Migrator, BOOKKEEPING_TABLE};
pub use versions::Migration;
