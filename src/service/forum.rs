//! Comment threads and vote toggling on top of the generic CRUD layer.

use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::{AppError, ConfigError};
use crate::service::crud::{fetch_many, fetch_optional, CrudService};
use crate::sql::QueryBuf;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;

pub(crate) fn entity<'a>(model: &'a ResolvedModel, table: &str) -> Result<&'a ResolvedEntity, AppError> {
    model.entity_by_table(table).ok_or_else(|| {
        AppError::Config(ConfigError::MissingReference {
            kind: "table",
            id: table.to_string(),
        })
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteAction {
    Created,
    Removed,
}

#[derive(Debug, Serialize)]
pub struct VoteToggle {
    pub action: VoteAction,
    pub vote: Value,
    /// Votes remaining for this (user, comment) pair: 1 after a vote, 0 after an unvote.
    pub votes: i64,
}

pub struct ForumService;

impl ForumService {
    /// Create a comment. The owner and, when given, the parent must exist.
    /// A reply without an explicit thread root inherits it from its parent.
    pub async fn create_comment(
        pool: &PgPool,
        model: &ResolvedModel,
        mut body: Map<String, Value>,
    ) -> Result<Value, AppError> {
        let persons = entity(model, "person")?;
        let comments = entity(model, "comment")?;

        let owner = body.get("user_id").cloned().unwrap_or(Value::Null);
        if !CrudService::exists(pool, persons, &owner).await? {
            return Err(AppError::NotFound("Comment owner doesn't exist".into()));
        }

        if let Some(parent_id) = body.get("parent_id").filter(|v| !v.is_null()).cloned() {
            let parent = CrudService::read(pool, comments, &parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Parent comment {} doesn't exist", parent_id)))?;
            if body.get("top_parent_id").map_or(true, Value::is_null) {
                let root = match parent.get("top_parent_id") {
                    Some(v) if !v.is_null() => v.clone(),
                    _ => parent_id,
                };
                body.insert("top_parent_id".into(), root);
            }
        }

        CrudService::create(pool, comments, &body).await
    }

    /// Replies to a comment with their vote count and owner's full name.
    /// `forward` walks the whole thread (`top_parent_id`), otherwise only direct replies (`parent_id`).
    pub async fn replies(
        pool: &PgPool,
        model: &ResolvedModel,
        comment_id: &Value,
        forward: bool,
    ) -> Result<Vec<Value>, AppError> {
        let comments = entity(model, "comment")?;
        if !CrudService::exists(pool, comments, comment_id).await? {
            return Err(AppError::NotFound(format!("Comment {} doesn't exist", comment_id)));
        }
        let key = if forward { "top_parent_id" } else { "parent_id" };
        let q = QueryBuf {
            sql: format!(
                r#"SELECT c."id", c."user_id", c."parent_id", c."top_parent_id", c."added", c."edited", c."content",
       (SELECT COUNT(*) FROM "vote" v WHERE v."comment_id" = c."id") AS "votes",
       p."first_name" || ' ' || p."last_name" AS "owner_fullname"
FROM "comment" c JOIN "person" p ON p."id" = c."user_id"
WHERE c."{}" = $1::integer
ORDER BY c."id""#,
                key
            ),
            params: vec![comment_id.clone()],
        };
        fetch_many(pool, &q).await
    }

    /// Vote for a comment, or remove the vote when this user already voted for it.
    pub async fn toggle_vote(
        pool: &PgPool,
        model: &ResolvedModel,
        user_id: &Value,
        comment_id: &Value,
    ) -> Result<VoteToggle, AppError> {
        if !CrudService::exists(pool, entity(model, "person")?, user_id).await? {
            return Err(AppError::NotFound("Vote owner doesn't exist".into()));
        }
        if !CrudService::exists(pool, entity(model, "comment")?, comment_id).await? {
            return Err(AppError::NotFound("Vote comment doesn't exist".into()));
        }

        let pair = vec![comment_id.clone(), user_id.clone()];
        let mut tx = pool.begin().await?;
        // Toggles of the same (comment, user) pair run one at a time until commit.
        crate::sql::bind_params(
            sqlx::query("SELECT pg_advisory_xact_lock($1::integer, $2::integer)"),
            &pair,
        )
        .execute(&mut *tx)
        .await?;
        let removed = fetch_optional(
            &mut *tx,
            &QueryBuf {
                sql: r#"DELETE FROM "vote" WHERE "comment_id" = $1::integer AND "user_id" = $2::integer
RETURNING "id", "comment_id", "user_id""#
                    .into(),
                params: pair.clone(),
            },
        )
        .await?;
        let (action, vote) = match removed {
            Some(row) => (VoteAction::Removed, row),
            None => {
                let row = fetch_optional(
                    &mut *tx,
                    &QueryBuf {
                        sql: r#"INSERT INTO "vote" ("comment_id", "user_id") VALUES ($1::integer, $2::integer)
RETURNING "id", "comment_id", "user_id""#
                            .into(),
                        params: pair.clone(),
                    },
                )
                .await?
                .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
                (VoteAction::Created, row)
            }
        };
        let (votes,): (i64,) = crate::service::crud::bind_as::<(i64,)>(&QueryBuf {
            sql: r#"SELECT COUNT(*) FROM "vote" WHERE "comment_id" = $1::integer AND "user_id" = $2::integer"#.into(),
            params: pair,
        })
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(?action, votes, "vote toggled");
        Ok(VoteToggle { action, vote, votes })
    }
}
