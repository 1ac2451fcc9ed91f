//! Generic entity handlers: list, read, create, replace, patch, delete.
//! Each resource module stamps out the routes it exposes with `entity_handlers!`.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::response::{PageMeta, SuccessMany, SuccessOne};
use crate::service::{column_filters, parse_id, writable_body, CrudService, ListParams, RequestValidator};
use crate::state::AppState;
use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

pub(crate) fn row_not_found(entity: &ResolvedEntity, id: &str) -> AppError {
    AppError::NotFound(format!("{} {} not found", entity.table_name, id))
}

/// One page of `entity` under `filters`, with links built from the request URI.
/// An empty page is a 404.
pub(crate) async fn page_response(
    state: &AppState,
    entity: &ResolvedEntity,
    filters: &[(String, Value)],
    uri: &Uri,
    query: &HashMap<String, String>,
) -> Result<Response, AppError> {
    let params = ListParams::from_query(entity, query)?;
    let page = CrudService::list(&state.pool, entity, filters, &params).await?;
    if page.rows.is_empty() {
        return Err(AppError::NotFound("Not Found".into()));
    }
    let meta = PageMeta::new(
        uri.path(),
        uri.query(),
        page.rows.len() as u64,
        page.total,
        params.limit,
        params.offset,
    );
    Ok(Json(SuccessMany { data: page.rows, meta }).into_response())
}

/// Every row matched, without pagination. An empty result is a 404.
pub(crate) fn unpaged_response(rows: Vec<Value>) -> Result<Response, AppError> {
    if rows.is_empty() {
        return Err(AppError::NotFound("Not Found".into()));
    }
    let meta = PageMeta::unpaged(rows.len() as u64);
    Ok(Json(SuccessMany { data: rows, meta }).into_response())
}

pub async fn list_rows(
    state: &AppState,
    path: &str,
    uri: &Uri,
    query: &HashMap<String, String>,
) -> Result<Response, AppError> {
    let entity = state.entity(path, "list")?;
    let filters = column_filters(entity, query);
    page_response(state, entity, &filters, uri, query).await
}

pub async fn read_row(state: &AppState, path: &str, raw_id: &str) -> Result<Response, AppError> {
    let entity = state.entity(path, "read")?;
    let id = parse_id(raw_id)?;
    let row = CrudService::read(&state.pool, entity, &id)
        .await?
        .ok_or_else(|| row_not_found(entity, raw_id))?;
    Ok(Json(SuccessOne::new(row)).into_response())
}

pub async fn create_row(state: &AppState, path: &str, body: Value) -> Result<Response, AppError> {
    let entity = state.entity(path, "create")?;
    let body = writable_body(entity, body)?;
    RequestValidator::validate(&body, &entity.validation)?;
    let row = CrudService::create(&state.pool, entity, &body).await?;
    let created_id = row.get(&entity.pk_column).cloned().unwrap_or(Value::Null);
    tracing::info!(entity = %entity.table_name, id = %created_id, "created");
    Ok((StatusCode::CREATED, Json(SuccessOne::new(row))).into_response())
}

/// PUT validates the whole body and resets omitted optional columns. PATCH only touches the fields present.
pub async fn update_row(
    state: &AppState,
    path: &str,
    raw_id: &str,
    body: Value,
    partial: bool,
) -> Result<Response, AppError> {
    let entity = state.entity(path, "update")?;
    let id = parse_id(raw_id)?;
    let body = writable_body(entity, body)?;
    if partial {
        RequestValidator::validate_partial(&body, &entity.validation)?;
    } else {
        RequestValidator::validate(&body, &entity.validation)?;
    }
    let row = CrudService::update(&state.pool, entity, &id, &body, partial)
        .await?
        .ok_or_else(|| row_not_found(entity, raw_id))?;
    Ok((StatusCode::ACCEPTED, Json(SuccessOne::new(row))).into_response())
}

/// Returns the deleted row.
pub async fn delete_row(state: &AppState, path: &str, raw_id: &str) -> Result<Response, AppError> {
    let entity = state.entity(path, "delete")?;
    let id = parse_id(raw_id)?;
    let row = CrudService::delete(&state.pool, entity, &id)
        .await?
        .ok_or_else(|| row_not_found(entity, raw_id))?;
    tracing::info!(entity = %entity.table_name, id = raw_id, "deleted");
    Ok((StatusCode::ACCEPTED, Json(SuccessOne::new(row))).into_response())
}

/// `entity_handlers!("users"; list, read, create, replace, patch, delete);`
macro_rules! entity_handlers {
    ($path:literal; $($op:ident),+ $(,)?) => {
        $( $crate::handlers::entity::entity_handlers!(@op $path, $op); )+
    };
    (@op $path:literal, list) => {
        pub async fn list(
            axum::extract::State(state): axum::extract::State<$crate::state::AppState>,
            axum::extract::OriginalUri(uri): axum::extract::OriginalUri,
            axum::extract::Query(query): axum::extract::Query<std::collections::HashMap<String, String>>,
        ) -> Result<axum::response::Response, $crate::error::AppError> {
            $crate::handlers::entity::list_rows(&state, $path, &uri, &query).await
        }
    };
    (@op $path:literal, read) => {
        pub async fn read(
            axum::extract::State(state): axum::extract::State<$crate::state::AppState>,
            axum::extract::Path(id): axum::extract::Path<String>,
        ) -> Result<axum::response::Response, $crate::error::AppError> {
            $crate::handlers::entity::read_row(&state, $path, &id).await
        }
    };
    (@op $path:literal, create) => {
        pub async fn create(
            axum::extract::State(state): axum::extract::State<$crate::state::AppState>,
            axum::Json(body): axum::Json<serde_json::Value>,
        ) -> Result<axum::response::Response, $crate::error::AppError> {
            $crate::handlers::entity::create_row(&state, $path, body).await
        }
    };
    (@op $path:literal, replace) => {
        pub async fn replace(
            axum::extract::State(state): axum::extract::State<$crate::state::AppState>,
            axum::extract::Path(id): axum::extract::Path<String>,
            axum::Json(body): axum::Json<serde_json::Value>,
        ) -> Result<axum::response::Response, $crate::error::AppError> {
            $crate::handlers::entity::update_row(&state, $path, &id, body, false).await
        }
    };
    (@op $path:literal, patch) => {
        pub async fn patch(
            axum::extract::State(state): axum::extract::State<$crate::state::AppState>,
            axum::extract::Path(id): axum::extract::Path<String>,
            axum::Json(body): axum::Json<serde_json::Value>,
        ) -> Result<axum::response::Response, $crate::error::AppError> {
            $crate::handlers::entity::update_row(&state, $path, &id, body, true).await
        }
    };
    (@op $path:literal, delete) => {
        pub async fn delete(
            axum::extract::State(state): axum::extract::State<$crate::state::AppState>,
            axum::extract::Path(id): axum::extract::Path<String>,
        ) -> Result<axum::response::Response, $crate::error::AppError> {
            $crate::handlers::entity::delete_row(&state, $path, &id).await
        }
    };
}

pub(crate) use entity_handlers;
