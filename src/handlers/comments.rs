//! `/comments`: creation checks the owner and parent, plus per-user listing and reply threads.

use crate::error::AppError;
use crate::handlers::entity::{entity_handlers, page_response, unpaged_response};
use crate::response::SuccessOne;
use crate::service::{column_filters, parse_id, writable_body, CrudService, ForumService, RequestValidator};
use crate::state::AppState;
use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

entity_handlers!("comments"; list, read, patch, delete);

pub async fn create(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Response, AppError> {
    let entity = state.entity("comments", "create")?;
    let body = writable_body(entity, body)?;
    RequestValidator::validate(&body, &entity.validation)?;
    let row = ForumService::create_comment(&state.pool, &state.model, body).await?;
    Ok((StatusCode::CREATED, Json(SuccessOne::new(row))).into_response())
}

pub async fn by_user(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(user_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let comments = state.entity("comments", "list")?;
    let persons = state.entity("users", "read")?;
    let id = parse_id(&user_id)?;
    if !CrudService::exists(&state.pool, persons, &id).await? {
        return Err(AppError::NotFound(format!("User {} doesn't exist", user_id)));
    }
    let mut filters = column_filters(comments, &query);
    filters.retain(|(k, _)| k != "user_id");
    filters.push(("user_id".into(), id));
    page_response(&state, comments, &filters, &uri, &query).await
}

/// `?forward=true` (default) returns the whole thread below the comment, `false` only direct replies.
pub async fn replies(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    state.entity("comments", "read")?;
    let forward = match query.get("forward").map(|v| v.to_lowercase()) {
        None => true,
        Some(v) if v == "true" || v == "1" => true,
        Some(v) if v == "false" || v == "0" => false,
        Some(v) => return Err(AppError::BadRequest(format!("invalid forward {:?}: expected true or false", v))),
    };
    let id = parse_id(&comment_id)?;
    let rows = ForumService::replies(&state.pool, &state.model, &id, forward).await?;
    unpaged_response(rows)
}
