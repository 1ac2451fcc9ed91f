mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use forum_api::migration::{MigrationSource, Migrator};
use forum_api::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

fn valid_user(first_name: &str) -> Value {
    json!({
        "first_name": first_name,
        "last_name": "Doe",
        "email": "someone@example.com",
        "gender": "Female",
        "avatar": "https://robohash.org/x.png",
        "date_of_birth": "1970-01-01",
        "country_of_birth": "Canada"
    })
}

// Routes that answer without a database.

#[tokio::test]
async fn health_version_and_root() {
    let app = common::offline_router();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(&app, "/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "forum-api");
    assert_eq!(body["environment"], "test");

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    let endpoints = body["endpoints"].as_array().unwrap();
    assert!(endpoints.iter().any(|e| e == "POST /api/v1/votes"));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = common::offline_router();
    let (status, body) = get(&app, "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/users/{id}"]["put"].is_object());
}

#[tokio::test]
async fn bad_list_parameters_are_400() {
    let app = common::offline_router();
    for uri in [
        "/api/v1/users?limit=0",
        "/api/v1/users?limit=abc",
        "/api/v1/comments?offset=-3",
        "/api/v1/votes?sort=id:sideways",
        "/api/v1/users?sort=nickname:asc",
    ] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn non_integer_ids_are_400() {
    let app = common::offline_router();
    let (status, _) = get(&app, "/api/v1/users/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::DELETE, "/api/v1/votes/1.5", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_bodies_are_422() {
    let app = common::offline_router();
    let mut user = valid_user("Jane");
    user["first_name"] = json!("Jo");
    let (status, body) = send(&app, Method::POST, "/api/v1/users", Some(user)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = send(&app, Method::POST, "/api/v1/comments", Some(json!({"user_id": 1, "content": "  "}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, Method::POST, "/api/v1/votes", Some(json!({"user_id": 1}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn filter_attribute_errors_are_400() {
    let app = common::offline_router();
    let (status, _) = get(&app, "/api/v1/users/filter/first_nameOrlast_nameAndjob/x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/api/v1/users/filter/nickname/x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn data_loader_rejects_bad_arguments() {
    let app = common::offline_router();
    let (status, _) = send(&app, Method::POST, "/data?table=tags", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/data?quantity=1000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let app = common::offline_router();
    let (status, _) = get(&app, "/api/v1/tags").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::PUT, "/api/v1/votes/1", Some(json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let app = common::offline_router();
    let big = "x".repeat(2 * 1024 * 1024);
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/comments")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, big.len())
        .body(Body::from(big))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_by_default() {
    let app = common::offline_router();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/users")
        .header(header::ORIGIN, "https://example.org")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn readiness_reports_unavailable_database() {
    let app = common::offline_router();
    let (status, body) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["database"], "unavailable");
}

// Database-backed.

async fn migrated_app(max_connections: u32) -> (Router, PgPool) {
    let (settings, pool) = common::fresh_database(max_connections).await;
    let mut migrator = Migrator::new();
    migrator.init(MigrationSource::forum()).unwrap();
    migrator.init_db(&pool).await.unwrap();
    migrator.upgrade(&pool).await.unwrap();
    let app = build_router(AppState::new(pool.clone(), settings, common::model()));
    (app, pool)
}

fn total(report: &Value, table: &str) -> u64 {
    report["data"]["totals"][table].as_u64().unwrap()
}

#[tokio::test]
#[ignore = "requires database"]
async fn seeding_accumulates_rows() {
    let (app, _) = migrated_app(5).await;

    let (status, first) = send(&app, Method::POST, "/data?quantity=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(total(&first, "person"), 5);
    assert_eq!(total(&first, "comment"), 5);
    assert!(total(&first, "vote") <= 5);

    let (status, second) = get(&app, "/data?quantity=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(total(&second, "person"), 10);
    assert_eq!(total(&second, "comment"), 10);
    assert!(total(&second, "vote") >= total(&first, "vote"));
}

#[tokio::test]
#[ignore = "requires database"]
async fn seeding_dependents_first_is_a_conflict() {
    let (app, _) = migrated_app(5).await;
    let (status, body) = send(&app, Method::POST, "/data?table=comments", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
#[ignore = "requires database"]
async fn users_crud_and_filter() {
    let (app, _) = migrated_app(5).await;

    let (status, _) = get(&app, "/api/v1/users").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, created) = send(&app, Method::POST, "/api/v1/users", Some(valid_user("Jane"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["gender"], "Female");
    assert_eq!(created["data"]["is_admin"], false);

    let (status, patched) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/users/{}", id),
        Some(json!({"company": "Edgetag", "id": 999})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(patched["data"]["company"], "Edgetag");
    assert_eq!(patched["data"]["id"], id);

    let (status, found) = get(&app, "/api/v1/users/filter/first_nameOrlast_name/JANE").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["meta"]["count"], 1);
    let (status, _) = get(&app, "/api/v1/users/filter/first_nameAndlast_name/jane").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, deleted) = send(&app, Method::DELETE, &format!("/api/v1/users/{}", id), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(deleted["data"]["id"], id);
    let (status, _) = get(&app, &format!("/api/v1/users/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires database"]
async fn put_resets_omitted_fields() {
    let (app, _) = migrated_app(5).await;
    let mut body = valid_user("Jane");
    body["job"] = json!("Engineer");
    body["company"] = json!("Edgetag");
    body["is_admin"] = json!(true);
    let (status, created) = send(&app, Method::POST, "/api/v1/users", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["job"], "Engineer");
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, replaced) = send(&app, Method::PUT, &format!("/api/v1/users/{}", id), Some(valid_user("Janet"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(replaced["data"]["first_name"], "Janet");
    assert_eq!(replaced["data"]["job"], Value::Null);
    assert_eq!(replaced["data"]["company"], Value::Null);
    assert_eq!(replaced["data"]["is_admin"], false);
    assert_eq!(replaced["data"]["email"], "someone@example.com");

    let (status, _) = send(&app, Method::PUT, "/api/v1/users/4242", Some(valid_user("Nobody"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires database"]
async fn pagination_links() {
    let (app, _) = migrated_app(5).await;
    send(&app, Method::POST, "/data?table=users&quantity=25", None).await;

    let (status, page) = get(&app, "/api/v1/users?limit=10&offset=10&sort=id:desc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["count"], 10);
    assert_eq!(page["meta"]["total"], 25);
    assert_eq!(page["meta"]["next"], "/api/v1/users?limit=10&offset=20&sort=id:desc");
    assert_eq!(page["meta"]["previous"], "/api/v1/users?limit=10&offset=0&sort=id:desc");
    let ids: Vec<i64> = page["data"].as_array().unwrap().iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
#[ignore = "requires database"]
async fn comment_threads_and_vote_toggle() {
    let (app, _) = migrated_app(5).await;
    let (_, user) = send(&app, Method::POST, "/api/v1/users", Some(valid_user("Jane"))).await;
    let user_id = user["data"]["id"].as_i64().unwrap();

    let (status, _) = send(&app, Method::POST, "/api/v1/comments", Some(json!({"user_id": 9999, "content": "hi"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, root) = send(&app, Method::POST, "/api/v1/comments", Some(json!({"user_id": user_id, "content": "root"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let root_id = root["data"]["id"].as_i64().unwrap();

    let (status, reply) = send(
        &app,
        Method::POST,
        "/api/v1/comments",
        Some(json!({"user_id": user_id, "content": "reply", "parent_id": root_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let reply_id = reply["data"]["id"].as_i64().unwrap();
    assert_eq!(reply["data"]["top_parent_id"], root_id);

    let (_, nested) = send(
        &app,
        Method::POST,
        "/api/v1/comments",
        Some(json!({"user_id": user_id, "content": "nested", "parent_id": reply_id})),
    )
    .await;
    assert_eq!(nested["data"]["top_parent_id"], root_id);

    let (status, thread) = get(&app, &format!("/api/v1/comments/{}/replies", root_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["meta"]["count"], 2);
    assert_eq!(thread["data"][0]["owner_fullname"], "Jane Doe");
    assert_eq!(thread["data"][0]["votes"], 0);
    let (_, direct) = get(&app, &format!("/api/v1/comments/{}/replies?forward=false", root_id)).await;
    assert_eq!(direct["meta"]["count"], 1);

    let (status, _) = get(&app, "/api/v1/comments/user/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, mine) = get(&app, &format!("/api/v1/comments/user/{}", user_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["meta"]["total"], 3);

    let vote = json!({"user_id": user_id, "comment_id": root_id});
    let (status, voted) = send(&app, Method::POST, "/api/v1/votes", Some(vote.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(voted["meta"]["votes"], 1);
    let (status, _) = get(&app, &format!("/api/v1/votes/comment/{}", root_id)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, unvoted) = send(&app, Method::POST, "/api/v1/votes", Some(vote)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(unvoted["meta"]["votes"], 0);
    let (status, _) = get(&app, &format!("/api/v1/votes/user/{}", user_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, edited) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/comments/{}", root_id),
        Some(json!({"content": "edited root"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(edited["data"]["content"], "edited root");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/comments/{}", root_id), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = get(&app, &format!("/api/v1/comments/{}", reply_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires database"]
async fn missing_parents_and_vote_targets_are_404() {
    let (app, _) = migrated_app(5).await;
    let (_, user) = send(&app, Method::POST, "/api/v1/users", Some(valid_user("Jane"))).await;
    let user_id = user["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/comments",
        Some(json!({"user_id": user_id, "content": "orphan", "parent_id": 4242})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Parent comment 4242 doesn't exist");

    let (status, _) = send(&app, Method::POST, "/api/v1/votes", Some(json!({"user_id": user_id, "comment_id": 4242}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(&app, "/api/v1/votes").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires database"]
async fn concurrent_vote_toggles_alternate() {
    let (app, pool) = migrated_app(5).await;
    let (_, user) = send(&app, Method::POST, "/api/v1/users", Some(valid_user("Jane"))).await;
    let user_id = user["data"]["id"].as_i64().unwrap();
    let (_, comment) = send(&app, Method::POST, "/api/v1/comments", Some(json!({"user_id": user_id, "content": "hot"}))).await;
    let comment_id = comment["data"]["id"].as_i64().unwrap();

    let vote = json!({"user_id": user_id, "comment_id": comment_id});
    let mut requests = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        let vote = vote.clone();
        requests.push(tokio::spawn(async move { send(&app, Method::POST, "/api/v1/votes", Some(vote)).await.0 }));
    }
    let mut statuses = Vec::new();
    for r in requests {
        statuses.push(r.await.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 4, "{:?}", statuses);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::ACCEPTED).count(), 4, "{:?}", statuses);

    let (left,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vote").fetch_one(&pool).await.unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
#[ignore = "requires database"]
async fn concurrent_requests_stay_within_pool_size() {
    const POOL_SIZE: u32 = 2;
    let (app, pool) = migrated_app(POOL_SIZE).await;
    send(&app, Method::POST, "/data?table=users&quantity=20", None).await;

    let peak = Arc::new(AtomicU32::new(0));
    let sampler = {
        let pool = pool.clone();
        let peak = peak.clone();
        tokio::spawn(async move {
            loop {
                peak.fetch_max(pool.size(), Ordering::Relaxed);
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        })
    };

    let mut requests = Vec::new();
    for i in 0..40 {
        let app = app.clone();
        requests.push(tokio::spawn(async move {
            let uri = format!("/api/v1/users?limit=5&offset={}", i % 4 * 5);
            get(&app, &uri).await.0
        }));
    }
    for r in requests {
        assert_eq!(r.await.unwrap(), StatusCode::OK);
    }
    sampler.abort();

    assert!(peak.load(Ordering::Relaxed) <= POOL_SIZE);
    assert!(pool.size() <= POOL_SIZE);
}
