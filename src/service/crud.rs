//! Generic CRUD execution against PostgreSQL.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::sql::{self, bind_params, Combinator, QueryBuf, Sort, SortDirection};
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 1000;
const DEFAULT_SORT: &str = "id:asc";

/// Pagination and ordering parsed from the query string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListParams {
    pub limit: u32,
    pub offset: u32,
    pub sort: Sort,
}

impl ListParams {
    pub fn from_query(entity: &ResolvedEntity, query: &HashMap<String, String>) -> Result<Self, AppError> {
        let limit = match query.get("limit") {
            Some(v) => v.parse::<u32>().ok().filter(|n| (1..=MAX_LIMIT).contains(n)).ok_or_else(|| {
                AppError::BadRequest(format!("invalid limit {:?}: expected 1..={}", v, MAX_LIMIT))
            })?,
            None => DEFAULT_LIMIT,
        };
        let offset = match query.get("offset") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| AppError::BadRequest(format!("invalid offset {:?}: expected >= 0", v)))?,
            None => 0,
        };
        let sort = parse_sort(entity, query.get("sort").map(String::as_str).unwrap_or(DEFAULT_SORT))?;
        Ok(ListParams { limit, offset, sort })
    }
}

/// `attribute:asc|desc`, attribute must be a column.
pub fn parse_sort(entity: &ResolvedEntity, raw: &str) -> Result<Sort, AppError> {
    let invalid = || {
        AppError::BadRequest(format!(
            "invalid sort {:?}: must match attribute:order, e.g. id:asc or id:desc",
            raw
        ))
    };
    let lowered = raw.to_lowercase();
    let (attr, order) = lowered.split_once(':').ok_or_else(invalid)?;
    let column = entity.column(attr).ok_or_else(invalid)?;
    let direction = match order {
        "asc" => SortDirection::Asc,
        "desc" => SortDirection::Desc,
        _ => return Err(invalid()),
    };
    Ok(Sort {
        column: column.name.clone(),
        direction,
    })
}

/// Query-string keys naming a column become exact-match filters.
pub fn column_filters(entity: &ResolvedEntity, query: &HashMap<String, String>) -> Vec<(String, Value)> {
    let mut filters: Vec<(String, Value)> = query
        .iter()
        .filter(|(k, _)| entity.column(k).is_some())
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    filters.sort_by(|a, b| a.0.cmp(&b.0));
    filters
}

/// Parse a path id for an integer primary key.
pub fn parse_id(raw: &str) -> Result<Value, AppError> {
    let n: i64 = raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id {:?}", raw)))?;
    Ok(Value::Number(n.into()))
}

pub struct Page {
    pub rows: Vec<Value>,
    pub total: u64,
}

pub struct CrudService;

impl CrudService {
    /// One page of rows plus the total row count under the same filters.
    pub async fn list(
        pool: &PgPool,
        entity: &ResolvedEntity,
        filters: &[(String, Value)],
        params: &ListParams,
    ) -> Result<Page, AppError> {
        let q = sql::select_list(entity, filters, &params.sort, params.limit, params.offset);
        let rows = fetch_many(pool, &q).await?;
        let total = Self::count(pool, entity, filters).await?;
        Ok(Page { rows, total })
    }

    pub async fn count(pool: &PgPool, entity: &ResolvedEntity, filters: &[(String, Value)]) -> Result<u64, AppError> {
        let q = sql::count(entity, filters);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let (n,): (i64,) = bind_as::<(i64,)>(&q).fetch_one(pool).await?;
        Ok(n.max(0) as u64)
    }

    /// Fetch one row by primary key.
    pub async fn read(pool: &PgPool, entity: &ResolvedEntity, id: &Value) -> Result<Option<Value>, AppError> {
        let mut q = sql::select_by_id(entity);
        q.params.push(id.clone());
        fetch_optional(pool, &q).await
    }

    pub async fn exists(pool: &PgPool, entity: &ResolvedEntity, id: &Value) -> Result<bool, AppError> {
        let mut q = sql::exists(entity);
        q.params.push(id.clone());
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let (found,): (bool,) = bind_as::<(bool,)>(&q).fetch_one(pool).await?;
        Ok(found)
    }

    /// Insert one row. Returns the created row.
    pub async fn create(pool: &PgPool, entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<Value, AppError> {
        let q = sql::insert(entity, body);
        fetch_optional(pool, &q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    /// Update one row by id. Returns the updated row, or None when it does not exist.
    /// A non-partial update resets the writable columns missing from `body`.
    pub async fn update(
        pool: &PgPool,
        entity: &ResolvedEntity,
        id: &Value,
        body: &Map<String, Value>,
        partial: bool,
    ) -> Result<Option<Value>, AppError> {
        let q = if partial {
            sql::update(entity, id, body)
        } else {
            sql::replace(entity, id, body)
        };
        fetch_optional(pool, &q).await
    }

    /// Delete one row by id. Returns the deleted row.
    pub async fn delete(pool: &PgPool, entity: &ResolvedEntity, id: &Value) -> Result<Option<Value>, AppError> {
        let mut q = sql::delete(entity);
        q.params.push(id.clone());
        fetch_optional(pool, &q).await
    }

    /// Rows whose columns equal `value` case-insensitively, combined with AND or OR.
    pub async fn find_matching(
        pool: &PgPool,
        entity: &ResolvedEntity,
        columns: &[String],
        combinator: Combinator,
        value: &str,
    ) -> Result<Vec<Value>, AppError> {
        let q = sql::select_matching(entity, columns, combinator, value);
        fetch_many(pool, &q).await
    }
}

pub(crate) fn bind_as<'q, T>(q: &'q QueryBuf) -> sqlx::query::QueryAs<'q, Postgres, T, sqlx::postgres::PgArguments>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow>,
{
    let mut query = sqlx::query_as::<_, T>(&q.sql);
    for p in &q.params {
        query = query.bind(crate::sql::to_text(p));
    }
    query
}

pub(crate) async fn fetch_many<'e, E>(exec: E, q: &QueryBuf) -> Result<Vec<Value>, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let rows = bind_params(sqlx::query(&q.sql), &q.params).fetch_all(exec).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

pub(crate) async fn fetch_optional<'e, E>(exec: E, q: &QueryBuf) -> Result<Option<Value>, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = bind_params(sqlx::query(&q.sql), &q.params).fetch_optional(exec).await?;
    Ok(row.map(|r| row_to_json(&r)))
}

pub(crate) fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve;
    use crate::models::{api_entities, model_graph};

    fn users() -> ResolvedEntity {
        resolve(&model_graph(), &api_entities())
            .unwrap()
            .entity_by_path("users")
            .unwrap()
            .clone()
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn list_params_default() {
        let p = ListParams::from_query(&users(), &HashMap::new()).unwrap();
        assert_eq!(p.limit, DEFAULT_LIMIT);
        assert_eq!(p.offset, 0);
        assert_eq!(p.sort, Sort::by_id());
    }

    #[test]
    fn list_params_parse_sort_case_insensitively() {
        let p = ListParams::from_query(&users(), &query(&[("sort", "First_Name:DESC"), ("limit", "5")])).unwrap();
        assert_eq!(p.limit, 5);
        assert_eq!(p.sort.column, "first_name");
        assert_eq!(p.sort.direction, SortDirection::Desc);
    }

    #[test]
    fn list_params_reject_bad_values() {
        let entity = users();
        for pairs in [
            [("limit", "0")],
            [("limit", "1001")],
            [("offset", "-1")],
            [("sort", "id")],
            [("sort", "password:asc")],
            [("sort", "id:up")],
        ] {
            assert!(
                matches!(ListParams::from_query(&entity, &query(&pairs)), Err(AppError::BadRequest(_))),
                "{:?}",
                pairs
            );
        }
    }

    #[test]
    fn only_column_keys_become_filters() {
        let filters = column_filters(&users(), &query(&[("gender", "Male"), ("limit", "3")]));
        assert_eq!(filters, vec![("gender".to_string(), Value::String("Male".into()))]);
    }

    #[test]
    fn ids_must_be_integers() {
        assert_eq!(parse_id("42").unwrap(), Value::from(42));
        assert!(matches!(parse_id("abc"), Err(AppError::BadRequest(_))));
    }
}
