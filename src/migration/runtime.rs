//! Migration runtime: register a source, create the bookkeeping table, apply pending migrations.

use crate::config::{validate_graph, ColumnType, ModelGraph, TableDef};
use crate::error::{ConfigError, MigrationError};
use crate::migration::ddl::MigrationStep;
use crate::migration::versions::{self, Migration};
use crate::models;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use std::time::Instant;

pub const BOOKKEEPING_TABLE: &str = "schema_migrations";

/// Key for `pg_advisory_lock`; serialises migrators across processes.
const ADVISORY_LOCK_KEY: i64 = 0x666f_7275_6d;

const CREATE_BOOKKEEPING: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    app TEXT NOT NULL,
    version BIGINT NOT NULL,
    name TEXT NOT NULL,
    checksum TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (app, version)
)
"#;

/// Declared schema plus the migrations that build it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationSource {
    pub app: String,
    pub graph: ModelGraph,
    pub migrations: Vec<Migration>,
}

impl MigrationSource {
    /// The forum schema and its migration list.
    pub fn forum() -> Self {
        MigrationSource {
            app: models::APP_NAME.to_string(),
            graph: models::model_graph(),
            migrations: versions::all(),
        }
    }

    /// Check ordering and naming, replay every step, then compare the result with the declared graph.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.app.trim().is_empty() {
            return Err(ConfigError::Missing("migration source app").into());
        }
        validate_graph(&self.graph)?;
        if self.migrations.is_empty() {
            return Err(ConfigError::Missing("migrations").into());
        }
        for (i, m) in self.migrations.iter().enumerate() {
            let expected = i as i64 + 1;
            if m.version != expected {
                return Err(ConfigError::Invalid {
                    key: "migration version",
                    value: m.version.to_string(),
                    reason: format!("expected {}", expected),
                }
                .into());
            }
            let valid_name = !m.name.is_empty()
                && m.name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !valid_name {
                return Err(ConfigError::Invalid {
                    key: "migration name",
                    value: m.name.clone(),
                    reason: "must be non-empty lowercase snake_case".into(),
                }
                .into());
            }
        }

        let replayed = replay(&self.migrations)?;
        let differences = graph_diff(&replayed, &self.graph);
        if !differences.is_empty() {
            return Err(MigrationError::ModelDrift(differences.join("; ")));
        }
        Ok(())
    }
}

/// Build the schema the migrations produce, without touching a database.
pub fn replay(migrations: &[Migration]) -> Result<ModelGraph, MigrationError> {
    let mut schema = ModelGraph::default();
    for m in migrations {
        for step in &m.steps {
            apply_step(&mut schema, step).map_err(|reason| MigrationError::Conflict { id: m.id(), reason })?;
        }
    }
    Ok(schema)
}

fn apply_step(schema: &mut ModelGraph, step: &MigrationStep) -> Result<(), String> {
    match step {
        MigrationStep::CreateEnum(e) => {
            if schema.enum_def(&e.name).is_some() {
                return Err(format!("enum {} already exists", e.name));
            }
            schema.enums.push(e.clone());
        }
        MigrationStep::CreateTable(t) => {
            if schema.table(&t.name).is_some() {
                return Err(format!("table {} already exists", t.name));
            }
            for c in &t.columns {
                require_enum(schema, &c.ty)?;
            }
            if t.column(&t.primary_key).is_none() {
                return Err(format!("primary key {}.{} is not a column", t.name, t.primary_key));
            }
            schema.tables.push(t.clone());
        }
        MigrationStep::AddColumn { table, column } => {
            require_enum(schema, &column.ty)?;
            let t = table_mut(schema, table)?;
            if t.column(&column.name).is_some() {
                return Err(format!("column {}.{} already exists", table, column.name));
            }
            t.columns.push(column.clone());
        }
        MigrationStep::AddForeignKey(fk) => {
            if schema.foreign_keys.iter().any(|f| f.name == fk.name) {
                return Err(format!("constraint {} already exists", fk.name));
            }
            require_column(schema, &fk.table, &fk.column)?;
            require_column(schema, &fk.references_table, &fk.references_column)?;
            schema.foreign_keys.push(fk.clone());
        }
        MigrationStep::CreateIndex(idx) => {
            if schema.indexes.iter().any(|i| i.name == idx.name) {
                return Err(format!("index {} already exists", idx.name));
            }
            for col in &idx.columns {
                require_column(schema, &idx.table, col)?;
            }
            schema.indexes.push(idx.clone());
        }
        MigrationStep::AddUnique { table, unique } => {
            for col in &unique.columns {
                require_column(schema, table, col)?;
            }
            let t = table_mut(schema, table)?;
            if t.unique.iter().any(|u| u.name == unique.name) {
                return Err(format!("constraint {} already exists", unique.name));
            }
            t.unique.push(unique.clone());
        }
    }
    Ok(())
}

fn require_enum(schema: &ModelGraph, ty: &ColumnType) -> Result<(), String> {
    if let ColumnType::Enum(name) = ty {
        if schema.enum_def(name).is_none() {
            return Err(format!("enum {} does not exist", name));
        }
    }
    Ok(())
}

fn require_column(schema: &ModelGraph, table: &str, column: &str) -> Result<(), String> {
    let t = schema
        .table(table)
        .ok_or_else(|| format!("table {} does not exist", table))?;
    if t.column(column).is_none() {
        return Err(format!("column {}.{} does not exist", table, column));
    }
    Ok(())
}

fn table_mut<'a>(schema: &'a mut ModelGraph, name: &str) -> Result<&'a mut TableDef, String> {
    schema
        .tables
        .iter_mut()
        .find(|t| t.name == name)
        .ok_or_else(|| format!("table {} does not exist", name))
}

/// Differences between the replayed and the declared schema. Column and constraint order is ignored.
pub fn graph_diff(replayed: &ModelGraph, declared: &ModelGraph) -> Vec<String> {
    let mut out = Vec::new();
    let replayed_tables: Vec<TableDef> = replayed.tables.iter().map(normalize_table).collect();
    let declared_tables: Vec<TableDef> = declared.tables.iter().map(normalize_table).collect();
    diff_named("enum", &replayed.enums, &declared.enums, |e| &e.name, &mut out);
    diff_named("table", &replayed_tables, &declared_tables, |t| &t.name, &mut out);
    diff_named("foreign key", &replayed.foreign_keys, &declared.foreign_keys, |f| &f.name, &mut out);
    diff_named("index", &replayed.indexes, &declared.indexes, |i| &i.name, &mut out);
    out
}

fn normalize_table(t: &TableDef) -> TableDef {
    let mut t = t.clone();
    t.columns.sort_by(|a, b| a.name.cmp(&b.name));
    t.unique.sort_by(|a, b| a.name.cmp(&b.name));
    t
}

fn diff_named<T: PartialEq>(
    kind: &str,
    replayed: &[T],
    declared: &[T],
    name: impl Fn(&T) -> &String,
    out: &mut Vec<String>,
) {
    for d in declared {
        match replayed.iter().find(|r| name(r) == name(d)) {
            None => out.push(format!("{} {} is declared but no migration creates it", kind, name(d))),
            Some(r) if r != d => out.push(format!("{} {} differs from its migrations", kind, name(d))),
            Some(_) => {}
        }
    }
    for r in replayed {
        if !declared.iter().any(|d| name(d) == name(r)) {
            out.push(format!("{} {} is created by a migration but not declared", kind, name(r)));
        }
    }
}

/// One row of the bookkeeping table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitDbOutcome {
    /// Bookkeeping table created and the initial migration applied.
    Initialized { applied: String },
    /// Bookkeeping table already present; nothing changed.
    AlreadyInitialized,
}

#[derive(Clone, Debug, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub id: String,
    pub checksum: String,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Applied rows must be exactly the first N defined migrations, with matching checksums.
/// Returns N.
pub fn verify_applied(defined: &[Migration], applied: &[AppliedMigration]) -> Result<usize, MigrationError> {
    for row in applied {
        if !defined.iter().any(|m| m.version == row.version) {
            return Err(MigrationError::UnknownApplied { version: row.version });
        }
    }
    for (i, row) in applied.iter().enumerate() {
        let expected = &defined[i];
        if expected.version != row.version {
            let id = defined
                .iter()
                .find(|m| m.version == row.version)
                .map(|m| m.id())
                .unwrap_or_else(|| row.version.to_string());
            return Err(MigrationError::OutOfOrder { id });
        }
        let checksum = expected.checksum();
        if checksum != row.checksum {
            return Err(MigrationError::ChecksumMismatch {
                id: expected.id(),
                recorded: row.checksum.clone(),
                defined: checksum,
            });
        }
    }
    Ok(applied.len())
}

/// Holds the registered migration source and runs it against a pool.
#[derive(Debug, Default)]
pub struct Migrator {
    source: Option<MigrationSource>,
}

impl Migrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source`. Registering an equal source again is a no-op.
    pub fn init(&mut self, source: MigrationSource) -> Result<(), MigrationError> {
        if let Some(existing) = &self.source {
            if *existing == source {
                return Ok(());
            }
            return Err(MigrationError::SourceMismatch(existing.app.clone()));
        }
        source.validate()?;
        tracing::debug!(app = %source.app, migrations = source.migrations.len(), "migration source registered");
        self.source = Some(source);
        Ok(())
    }

    pub fn source(&self) -> Result<&MigrationSource, MigrationError> {
        self.source.as_ref().ok_or(MigrationError::NotRegistered)
    }

    /// Create the bookkeeping table and apply the initial migration in one transaction.
    pub async fn init_db(&self, pool: &PgPool) -> Result<InitDbOutcome, MigrationError> {
        let source = self.source()?;
        let mut conn = lock(pool).await?;
        let result = init_db_locked(&mut conn, source).await;
        unlock(&mut conn).await;
        result
    }

    /// Apply every pending migration, each in its own transaction. Returns the applied ids.
    pub async fn upgrade(&self, pool: &PgPool) -> Result<Vec<String>, MigrationError> {
        let source = self.source()?;
        let mut conn = lock(pool).await?;
        let result = upgrade_locked(&mut conn, source).await;
        unlock(&mut conn).await;
        result
    }

    pub async fn status(&self, pool: &PgPool) -> Result<Vec<MigrationStatus>, MigrationError> {
        let source = self.source()?;
        let mut conn = pool.acquire().await?;
        let applied = if bookkeeping_exists(&mut conn).await? {
            applied_rows(&mut conn, &source.app).await?
        } else {
            Vec::new()
        };
        Ok(source
            .migrations
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                id: m.id(),
                checksum: m.checksum(),
                applied_at: applied.iter().find(|a| a.version == m.version).map(|a| a.applied_at),
            })
            .collect())
    }
}

async fn lock(pool: &PgPool) -> Result<PoolConnection<Postgres>, MigrationError> {
    let mut conn = pool.acquire().await?;
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(ADVISORY_LOCK_KEY)
        .execute(&mut *conn)
        .await?;
    Ok(conn)
}

async fn unlock(conn: &mut PoolConnection<Postgres>) {
    if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(ADVISORY_LOCK_KEY)
        .execute(&mut **conn)
        .await
    {
        tracing::warn!(error = %e, "failed to release migration lock");
    }
}

async fn init_db_locked(conn: &mut PgConnection, source: &MigrationSource) -> Result<InitDbOutcome, MigrationError> {
    if bookkeeping_exists(conn).await? {
        tracing::info!("bookkeeping table present, init-db is a no-op");
        return Ok(InitDbOutcome::AlreadyInitialized);
    }
    let initial = source.migrations.first().ok_or(ConfigError::Missing("migrations"))?;
    let id = initial.id();
    let started = Instant::now();

    let mut tx = conn.begin().await?;
    sqlx::query(CREATE_BOOKKEEPING).execute(&mut *tx).await?;
    apply_in(&mut tx, &source.app, initial).await?;
    tx.commit()
        .await
        .map_err(|source| MigrationError::Apply { id: id.clone(), source })?;

    tracing::info!(migration = %id, elapsed_ms = started.elapsed().as_millis() as u64, "initial schema applied");
    Ok(InitDbOutcome::Initialized { applied: id })
}

async fn upgrade_locked(conn: &mut PgConnection, source: &MigrationSource) -> Result<Vec<String>, MigrationError> {
    if !bookkeeping_exists(conn).await? {
        return Err(MigrationError::NotInitialized);
    }
    let applied = applied_rows(conn, &source.app).await?;
    let done = verify_applied(&source.migrations, &applied)?;

    let mut newly_applied = Vec::new();
    for m in &source.migrations[done..] {
        let id = m.id();
        let started = Instant::now();
        let mut tx = conn.begin().await?;
        apply_in(&mut tx, &source.app, m).await?;
        tx.commit()
            .await
            .map_err(|source| MigrationError::Apply { id: id.clone(), source })?;
        tracing::info!(
            version = m.version,
            name = %m.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "applied migration"
        );
        newly_applied.push(id);
    }
    if newly_applied.is_empty() {
        tracing::info!("schema is up to date");
    }
    Ok(newly_applied)
}

/// Run every statement of `m` and record it. Dropping `tx` on error rolls everything back.
async fn apply_in(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    app: &str,
    m: &Migration,
) -> Result<(), MigrationError> {
    let id = m.id();
    for stmt in m.statements() {
        tracing::debug!(migration = %id, sql = %stmt, "executing");
        sqlx::query(&stmt)
            .execute(&mut **tx)
            .await
            .map_err(|source| MigrationError::Apply { id: id.clone(), source })?;
    }
    sqlx::query("INSERT INTO schema_migrations (version, name, checksum, app) VALUES ($1, $2, $3, $4)")
        .bind(m.version)
        .bind(&m.name)
        .bind(m.checksum())
        .bind(app)
        .execute(&mut **tx)
        .await
        .map_err(|source| MigrationError::Apply { id, source })?;
    Ok(())
}

async fn bookkeeping_exists(conn: &mut PgConnection) -> Result<bool, MigrationError> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1)",
    )
    .bind(BOOKKEEPING_TABLE)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

async fn applied_rows(conn: &mut PgConnection, app: &str) -> Result<Vec<AppliedMigration>, MigrationError> {
    let rows: Vec<(i64, String, String, DateTime<Utc>)> = sqlx::query_as(
        "SELECT version, name, checksum, applied_at FROM schema_migrations WHERE app = $1 ORDER BY version",
    )
    .bind(app)
    .fetch_all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(version, name, checksum, applied_at)| AppliedMigration {
            version,
            name,
            checksum,
            applied_at,
        })
        .collect())
}
