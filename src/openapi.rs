//! OpenAPI document and the endpoint table it is generated from.

use crate::response::PageMeta;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, PathItemBuilder};
use utoipa::openapi::{ComponentsBuilder, InfoBuilder, OpenApi, OpenApiBuilder, PathsBuilder, ResponseBuilder};
use utoipa::PartialSchema;

pub const API_PREFIX: &str = "/api/v1";

pub struct Endpoint {
    pub method: &'static str,
    pub path: &'static str,
    pub tag: &'static str,
    pub summary: &'static str,
    /// Status code of a successful response.
    pub status: &'static str,
}

const fn ep(
    method: &'static str,
    path: &'static str,
    tag: &'static str,
    summary: &'static str,
    status: &'static str,
) -> Endpoint {
    Endpoint {
        method,
        path,
        tag,
        summary,
        status,
    }
}

/// Every route under `/api/v1`, in OpenAPI path syntax.
pub const ENDPOINTS: &[Endpoint] = &[
    ep("GET", "/users", "users", "List users", "200"),
    ep("POST", "/users", "users", "Create a user", "201"),
    ep("GET", "/users/{id}", "users", "Read a user", "200"),
    ep("PUT", "/users/{id}", "users", "Replace a user", "202"),
    ep("PATCH", "/users/{id}", "users", "Update some fields of a user", "202"),
    ep("DELETE", "/users/{id}", "users", "Delete a user and everything they own", "202"),
    ep("GET", "/users/filter/{attribute}/{value}", "users", "Find users by one or more attributes", "200"),
    ep("GET", "/comments", "comments", "List comments", "200"),
    ep("POST", "/comments", "comments", "Create a comment or a reply", "201"),
    ep("GET", "/comments/{id}", "comments", "Read a comment", "200"),
    ep("PATCH", "/comments/{id}", "comments", "Edit a comment", "202"),
    ep("DELETE", "/comments/{id}", "comments", "Delete a comment and its replies", "202"),
    ep("GET", "/comments/user/{user_id}", "comments", "List comments of a user", "200"),
    ep("GET", "/comments/{id}/replies", "comments", "Replies to a comment", "200"),
    ep("GET", "/votes", "votes", "List votes", "200"),
    ep("POST", "/votes", "votes", "Vote for a comment, or remove the vote", "201"),
    ep("GET", "/votes/{id}", "votes", "Read a vote", "200"),
    ep("DELETE", "/votes/{id}", "votes", "Delete a vote", "202"),
    ep("GET", "/votes/comment/{comment_id}", "votes", "List votes for a comment", "200"),
    ep("GET", "/votes/user/{user_id}", "votes", "List votes of a user", "200"),
];

fn http_method(method: &str) -> HttpMethod {
    match method {
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        _ => HttpMethod::Get,
    }
}

pub fn document() -> OpenApi {
    let mut paths = PathsBuilder::new();
    let mut grouped: Vec<(String, PathItemBuilder)> = Vec::new();
    for e in ENDPOINTS {
        let operation = OperationBuilder::new()
            .tag(e.tag)
            .summary(Some(e.summary))
            .response(e.status, ResponseBuilder::new().description(e.summary).build())
            .response("400", ResponseBuilder::new().description("Bad request").build())
            .response("404", ResponseBuilder::new().description("Not found").build())
            .build();
        let full = format!("{}{}", API_PREFIX, e.path);
        match grouped.iter().position(|(p, _)| *p == full) {
            Some(i) => {
                let (path, item) = grouped.remove(i);
                grouped.insert(i, (path, item.operation(http_method(e.method), operation)));
            }
            None => grouped.push((full, PathItemBuilder::new().operation(http_method(e.method), operation))),
        }
    }
    for (path, item) in grouped {
        paths = paths.path(path, item.build());
    }
    let data = OperationBuilder::new()
        .tag("data")
        .summary(Some("Load generated persons, comments and votes"))
        .response("200", ResponseBuilder::new().description("Rows inserted and table totals").build())
        .response("409", ResponseBuilder::new().description("Referenced rows do not exist yet").build())
        .build();
    paths = paths.path(
        "/data",
        PathItemBuilder::new()
            .operation(HttpMethod::Get, data.clone())
            .operation(HttpMethod::Post, data)
            .build(),
    );

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(env!("CARGO_PKG_NAME"))
                .version(env!("CARGO_PKG_VERSION"))
                .description(Some(env!("CARGO_PKG_DESCRIPTION")))
                .build(),
        )
        .paths(paths.build())
        .components(Some(ComponentsBuilder::new().schema("PageMeta", PageMeta::schema()).build()))
        .build()
}
