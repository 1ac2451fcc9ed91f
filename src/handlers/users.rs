//! `/users`: persons, plus case-insensitive lookup on one or more attributes.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::handlers::entity::{entity_handlers, unpaged_response};
use crate::service::CrudService;
use crate::sql::Combinator;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::Response,
};

entity_handlers!("users"; list, read, create, replace, patch, delete);

/// Split `first_nameOrlast_name` / `first_nameAndlast_name` into columns.
/// Matching ignores case. Mixing both separators is rejected.
pub fn split_attribute(entity: &ResolvedEntity, attribute: &str) -> Result<(Vec<String>, Combinator), AppError> {
    let attribute = attribute.to_lowercase();
    let has_or = attribute.contains("or");
    let has_and = attribute.contains("and");
    if has_or && has_and {
        return Err(AppError::BadRequest(
            "attribute may combine columns with Or or with And, not both".into(),
        ));
    }
    let (separator, combinator) = if has_and {
        ("and", Combinator::And)
    } else {
        ("or", Combinator::Or)
    };
    let columns: Vec<String> = attribute.split(separator).map(str::to_string).collect();
    for column in &columns {
        if entity.column(column).is_none() {
            return Err(AppError::BadRequest(format!("unknown attribute {:?}", column)));
        }
    }
    Ok((columns, combinator))
}

pub async fn filter(
    State(state): State<AppState>,
    Path((attribute, value)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let entity = state.entity("users", "list")?;
    let (columns, combinator) = split_attribute(entity, &attribute)?;
    let rows = CrudService::find_matching(&state.pool, entity, &columns, combinator, &value).await?;
    unpaged_response(rows)
}
