//! `/votes`: listing by comment or user, and the vote/unvote toggle.

use crate::error::AppError;
use crate::handlers::entity::{entity_handlers, page_response};
use crate::response::SuccessOne;
use crate::service::{column_filters, parse_id, writable_body, CrudService, ForumService, RequestValidator, VoteAction};
use crate::state::AppState;
use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

entity_handlers!("votes"; list, read, delete);

async fn votes_referencing(
    state: &AppState,
    target_path: &str,
    column: &str,
    raw_id: &str,
    uri: &Uri,
    query: &HashMap<String, String>,
) -> Result<Response, AppError> {
    let votes = state.entity("votes", "list")?;
    let target = state.entity(target_path, "read")?;
    let id = parse_id(raw_id)?;
    if !CrudService::exists(&state.pool, target, &id).await? {
        return Err(AppError::NotFound(format!("{} {} doesn't exist", target.table_name, raw_id)));
    }
    let mut filters = column_filters(votes, query);
    filters.retain(|(k, _)| k != column);
    filters.push((column.to_string(), id));
    page_response(state, votes, &filters, uri, query).await
}

pub async fn by_comment(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(comment_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    votes_referencing(&state, "comments", "comment_id", &comment_id, &uri, &query).await
}

pub async fn by_user(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(user_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    votes_referencing(&state, "users", "user_id", &user_id, &uri, &query).await
}

/// 201 when the vote is created, 202 when an existing vote is removed.
pub async fn toggle(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Response, AppError> {
    let entity = state.entity("votes", "create")?;
    let body = writable_body(entity, body)?;
    RequestValidator::validate(&body, &entity.validation)?;
    let user_id = parse_id(&id_text(body.get("user_id")))?;
    let comment_id = parse_id(&id_text(body.get("comment_id")))?;
    let outcome = ForumService::toggle_vote(&state.pool, &state.model, &user_id, &comment_id).await?;
    let status = match outcome.action {
        VoteAction::Created => StatusCode::CREATED,
        VoteAction::Removed => StatusCode::ACCEPTED,
    };
    let response = SuccessOne {
        data: outcome.vote,
        meta: Some(json!({ "action": outcome.action, "votes": outcome.votes })),
    };
    Ok((status, Json(response)).into_response())
}

/// Ids may arrive as JSON numbers or numeric strings.
fn id_text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
