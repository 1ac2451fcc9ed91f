//! `/data`: loads generated rows into the forum tables.

use crate::error::AppError;
use crate::response::SuccessOne;
use crate::service::seed::{self, parse_quantity, SeedTable};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

/// `?table=users|comments|votes&quantity=N`. Without `table` every table is seeded.
pub async fn load(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let table = query.get("table").map(|t| t.parse::<SeedTable>()).transpose()?;
    let quantity = parse_quantity(query.get("quantity").map(String::as_str))?;
    let mut rng = StdRng::from_entropy();
    let report = seed::seed(&state.pool, &state.model, table, quantity, &mut rng).await?;
    Ok(Json(SuccessOne::new(report)).into_response())
}
