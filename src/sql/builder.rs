//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a resolved entity.
//! Identifiers come from the model only; every value is a `$n::type` parameter.

use crate::config::{quote_ident, ColumnInfo, ResolvedEntity};
use serde_json::{Map, Value};

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a value and return its typed placeholder.
    fn push_param(&mut self, column: &ColumnInfo, v: Value) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), column.ty.cast())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn by_id() -> Self {
        Sort {
            column: "id".into(),
            direction: SortDirection::Asc,
        }
    }
}

/// How multiple columns of an attribute filter combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

fn select_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns
        .iter()
        .map(|c| c.select_expr())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Exact-match filters on known columns; unknown columns are skipped.
fn where_clause(q: &mut QueryBuf, entity: &ResolvedEntity, filters: &[(String, Value)]) -> String {
    let mut parts = Vec::new();
    for (col, val) in filters {
        let Some(c) = entity.column(col) else { continue };
        let ph = q.push_param(c, val.clone());
        parts.push(format!("{} = {}", quote_ident(&c.name), ph));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT page with optional filters, ORDER BY the sort column then pk.
pub fn select_list(
    entity: &ResolvedEntity,
    filters: &[(String, Value)],
    sort: &Sort,
    limit: u32,
    offset: u32,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filters);
    let mut order = format!("{} {}", quote_ident(&sort.column), sort.direction.sql());
    if sort.column != entity.pk_column {
        order.push_str(&format!(", {}", quote_ident(&entity.pk_column)));
    }
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        select_column_list(entity),
        quote_ident(&entity.table_name),
        where_sql,
        order,
        limit,
        offset
    );
    q
}

/// COUNT(*) with the same filters as `select_list`.
pub fn count(entity: &ResolvedEntity, filters: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filters);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", quote_ident(&entity.table_name), where_sql);
    q
}

/// SELECT by primary key. Caller pushes the id as the sole param.
pub fn select_by_id(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = $1::{}",
        select_column_list(entity),
        quote_ident(&entity.table_name),
        quote_ident(&entity.pk_column),
        pk_cast(entity)
    );
    q
}

/// SELECT EXISTS by primary key. Caller pushes the id.
pub fn exists(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1::{})",
        quote_ident(&entity.table_name),
        quote_ident(&entity.pk_column),
        pk_cast(entity)
    );
    q
}

/// Case-insensitive match of `value` against several columns, joined by AND or OR.
pub fn select_matching(entity: &ResolvedEntity, columns: &[String], combinator: Combinator, value: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.params.push(Value::String(value.to_string()));
    let parts: Vec<String> = columns
        .iter()
        .filter_map(|col| entity.column(col))
        .map(|c| format!("LOWER({}::text) = LOWER($1::text)", quote_ident(&c.name)))
        .collect();
    let joiner = match combinator {
        Combinator::And => " AND ",
        Combinator::Or => " OR ",
    };
    let where_sql = if parts.is_empty() {
        " WHERE FALSE".to_string()
    } else {
        format!(" WHERE {}", parts.join(joiner))
    };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        select_column_list(entity),
        quote_ident(&entity.table_name),
        where_sql,
        quote_ident(&entity.pk_column)
    );
    q
}

/// INSERT the writable columns present in `body`. Absent columns take their DB default or NULL.
pub fn insert(entity: &ResolvedEntity, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in entity.columns.iter().filter(|c| !c.read_only) {
        let Some(val) = body.get(&c.name) else { continue };
        placeholders.push(q.push_param(c, val.clone()));
        cols.push(quote_ident(&c.name));
    }
    let table = quote_ident(&entity.table_name);
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET the writable columns present in `body`, plus the touch column.
/// With nothing to set this degrades to a SELECT by id.
pub fn update(entity: &ResolvedEntity, id: &Value, body: &Map<String, Value>) -> QueryBuf {
    update_sets(entity, id, body, false)
}

/// UPDATE by id replacing every writable column. Columns absent from `body` go back
/// to their DB default, or NULL when nullable.
pub fn replace(entity: &ResolvedEntity, id: &Value, body: &Map<String, Value>) -> QueryBuf {
    update_sets(entity, id, body, true)
}

fn update_sets(entity: &ResolvedEntity, id: &Value, body: &Map<String, Value>, reset_absent: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in entity.columns.iter().filter(|c| !c.read_only) {
        let rhs = match body.get(&c.name) {
            Some(val) => q.push_param(c, val.clone()),
            None if reset_absent && c.has_default => "DEFAULT".to_string(),
            None if reset_absent && c.nullable => "NULL".to_string(),
            None => continue,
        };
        sets.push(format!("{} = {}", quote_ident(&c.name), rhs));
    }
    if sets.is_empty() {
        let mut q = select_by_id(entity);
        q.params.push(id.clone());
        return q;
    }
    if let Some(touch) = &entity.touch_column {
        sets.push(format!("{} = NOW()", quote_ident(touch)));
    }
    q.params.push(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}::{} RETURNING {}",
        quote_ident(&entity.table_name),
        sets.join(", "),
        quote_ident(&entity.pk_column),
        q.params.len(),
        pk_cast(entity),
        select_column_list(entity)
    );
    q
}

/// DELETE by id, returning the removed row. Caller pushes the id.
pub fn delete(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "DELETE FROM {} WHERE {} = $1::{} RETURNING {}",
        quote_ident(&entity.table_name),
        quote_ident(&entity.pk_column),
        pk_cast(entity),
        select_column_list(entity)
    );
    q
}

fn pk_cast(entity: &ResolvedEntity) -> String {
    entity
        .column(&entity.pk_column)
        .map(|c| c.ty.cast())
        .unwrap_or_else(|| "integer".into())
}
