//! Resource routes, mounted under `/api/v1`.
//! Static segments (`filter`, `user`, `comment`) are registered next to `:id` so they win over it.

use crate::handlers::{comments, users, votes};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/users", get(users::list).post(users::create))
        .route("/users/filter/:attribute/:value", get(users::filter))
        .route(
            "/users/:id",
            get(users::read).put(users::replace).patch(users::patch).delete(users::delete),
        )
        .route("/comments", get(comments::list).post(comments::create))
        .route("/comments/user/:user_id", get(comments::by_user))
        .route(
            "/comments/:id",
            get(comments::read).patch(comments::patch).delete(comments::delete),
        )
        .route("/comments/:id/replies", get(comments::replies))
        .route("/votes", get(votes::list).post(votes::toggle))
        .route("/votes/comment/:comment_id", get(votes::by_comment))
        .route("/votes/user/:user_id", get(votes::by_user))
        .route("/votes/:id", get(votes::read).delete(votes::delete))
        .with_state(state)
}
