//! Router assembly: root routes, `/api/v1` resources and the middleware stack.

mod api;
mod common;

pub use api::api_routes;
pub use common::common_routes;

use crate::openapi::API_PREFIX;
use crate::settings::CorsOrigins;
use crate::state::AppState;
use axum::http::{HeaderValue, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Credentials are only allowed with an explicit origin list.
pub fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::PUT,
        Method::DELETE,
    ]);
    match origins {
        CorsOrigins::Any => layer.allow_origin(Any).allow_headers(Any),
        CorsOrigins::List(list) => {
            let allowed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer
                .allow_origin(allowed)
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true)
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);
    Router::new()
        .merge(common_routes(state.clone()))
        .nest(API_PREFIX, api_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(cors),
        )
}
