//! Typed errors for each lifecycle stage and HTTP mapping for request errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::bootstrap::Phase;

/// Settings or model description is missing or malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("invalid primary key: table {table} column {column}")]
    InvalidPrimaryKey { table: String, column: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("no migration source registered, run init first")]
    NotRegistered,
    #[error("a different migration source is already registered for app '{0}'")]
    SourceMismatch(String),
    #[error("database has no migration bookkeeping table, run init-db first")]
    NotInitialized,
    #[error("malformed migration source: {0}")]
    Config(#[from] ConfigError),
    #[error("migration {id} conflicts with the schema built so far: {reason}")]
    Conflict { id: String, reason: String },
    #[error("declared models diverge from the migrations: {0}")]
    ModelDrift(String),
    #[error("database records migration {version} which is not defined")]
    UnknownApplied { version: i64 },
    #[error("applied migrations are not a prefix of the defined ones: {id} is applied but an earlier migration is not")]
    OutOfOrder { id: String },
    #[error("checksum mismatch for applied migration {id}: recorded {recorded}, defined {defined}")]
    ChecksumMismatch {
        id: String,
        recorded: String,
        defined: String,
    },
    #[error("migration {id} failed: {source}")]
    Apply {
        id: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// Fatal startup errors. Any of these moves the bootstrap to `Failed`.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("database unreachable at {target} after {attempts} attempt(s): {source}")]
    Connectivity {
        target: String,
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
    #[error("migration: {0}")]
    Migration(#[from] MigrationError),
    #[error("illegal bootstrap transition {from:?} -> {to:?}")]
    IllegalTransition { from: Phase, to: Phase },
    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request failure, rendered as an HTTP error response.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// PostgreSQL SQLSTATE codes the API maps to client errors.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const INVALID_DATETIME_FORMAT: &str = "22007";
const DATETIME_FIELD_OVERFLOW: &str = "22008";

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Db(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Db(sqlx::Error::Database(db)) => match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) | Some(FOREIGN_KEY_VIOLATION) => {
                    (StatusCode::CONFLICT, "conflict")
                }
                Some(INVALID_TEXT_REPRESENTATION)
                | Some(INVALID_DATETIME_FORMAT)
                | Some(DATETIME_FIELD_OVERFLOW) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "validation_error")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "an internal error occurred".to_string()
        } else if let AppError::Db(sqlx::Error::Database(db)) = &self {
            db.message().to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
