//! Fake-data loader. Each call adds rows; nothing is overwritten.

use crate::config::{quote_ident, ResolvedModel};
use crate::error::AppError;
use crate::models::GENDERS;
use crate::service::crud::{fetch_optional, row_to_json};
use crate::service::forum::entity;
use crate::sql::{self, QueryBuf};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const DEFAULT_QUANTITY: u32 = 10;
pub const MAX_QUANTITY: u32 = 100;

/// Sampled ids per table when picking authors, parents and vote targets.
const ID_SAMPLE: i64 = 1000;

const FIRST_NAMES: &[&str] = &[
    "John", "Jane", "Amelia", "Oliver", "Isla", "Noah", "Maya", "Lucas", "Chloe", "Ethan", "Zoe", "Hugo",
];
const LAST_NAMES: &[&str] = &[
    "Doe", "Smith", "Lotonga", "Garcia", "Nguyen", "Martin", "Kowalski", "Okafor", "Larsen", "Moreau",
];
const JOBS: &[&str] = &[
    "Compensation Analyst", "Civil Engineer", "Nurse Practicioner", "Data Coordinator", "Web Designer",
    "Account Executive", "Research Assistant",
];
const COMPANIES: &[&str] = &["Edgetag", "Skiba", "Jabbertype", "Voonyx", "Quimba", "Thoughtbridge", "Zoomzone"];
const COUNTRIES: &[&str] = &["France", "Congo", "Canada", "Japan", "Brazil", "Norway", "Kenya", "Peru"];
const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipisicing", "elit", "ratione", "omnis", "alias",
    "magnam", "quia", "tempora",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeedTable {
    Users,
    Comments,
    Votes,
}

impl SeedTable {
    pub const ALL: [SeedTable; 3] = [SeedTable::Users, SeedTable::Comments, SeedTable::Votes];

    pub fn table(&self) -> &'static str {
        match self {
            SeedTable::Users => "person",
            SeedTable::Comments => "comment",
            SeedTable::Votes => "vote",
        }
    }
}

impl FromStr for SeedTable {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "users" | "user" | "persons" | "person" => Ok(SeedTable::Users),
            "comments" | "comment" => Ok(SeedTable::Comments),
            "votes" | "vote" => Ok(SeedTable::Votes),
            other => Err(AppError::BadRequest(format!(
                "unknown table {:?}: expected users, comments or votes",
                other
            ))),
        }
    }
}

pub fn parse_quantity(raw: Option<&str>) -> Result<u32, AppError> {
    match raw {
        None => Ok(DEFAULT_QUANTITY),
        Some(v) => v
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=MAX_QUANTITY).contains(n))
            .ok_or_else(|| AppError::BadRequest(format!("invalid quantity {:?}: expected 1..={}", v, MAX_QUANTITY))),
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SeedReport {
    pub inserted: BTreeMap<&'static str, u64>,
    pub totals: BTreeMap<&'static str, u64>,
}

/// A person that passes the users validation rules.
pub fn fake_person(rng: &mut StdRng) -> Map<String, Value> {
    let first = *FIRST_NAMES.choose(rng).unwrap_or(&"John");
    let last = *LAST_NAMES.choose(rng).unwrap_or(&"Doe");
    let tag: u32 = rng.gen_range(1..100_000);
    let earliest = NaiveDate::from_ymd_opt(1950, 1, 1).unwrap_or_default();
    let birth = earliest + Duration::days(rng.gen_range(0..20_000));
    let mut person = json!({
        "is_admin": rng.gen_bool(0.05),
        "first_name": first,
        "last_name": last,
        "email": format!("{}.{}{}@example.com", first.to_lowercase(), last.to_lowercase(), tag),
        "gender": *GENDERS.choose(rng).unwrap_or(&"Other"),
        "avatar": format!("https://robohash.org/{}{}.png?size=150x150&set=set1", first.to_lowercase(), tag),
        "date_of_birth": birth.format("%Y-%m-%d").to_string(),
        "country_of_birth": *COUNTRIES.choose(rng).unwrap_or(&"France"),
    });
    if rng.gen_bool(0.8) {
        person["job"] = json!(*JOBS.choose(rng).unwrap_or(&"Web Designer"));
        person["company"] = json!(*COMPANIES.choose(rng).unwrap_or(&"Edgetag"));
    }
    match person {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// One to three lorem sentences.
pub fn fake_content(rng: &mut StdRng) -> String {
    let sentences = rng.gen_range(1..=3);
    (0..sentences)
        .map(|_| {
            let len = rng.gen_range(4..=12);
            let words: Vec<&str> = (0..len).map(|_| *WORDS.choose(rng).unwrap_or(&"lorem")).collect();
            let mut s = words.join(" ");
            if let Some(first) = s.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            s.push('.');
            s
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Insert `quantity` rows into `table`, or into every table in dependency order, in one transaction.
pub async fn seed(
    pool: &PgPool,
    model: &ResolvedModel,
    table: Option<SeedTable>,
    quantity: u32,
    rng: &mut StdRng,
) -> Result<SeedReport, AppError> {
    let tables: Vec<SeedTable> = match table {
        Some(t) => vec![t],
        None => SeedTable::ALL.to_vec(),
    };
    let mut report = SeedReport::default();
    let mut tx = pool.begin().await?;
    for t in &tables {
        let n = match t {
            SeedTable::Users => seed_persons(&mut tx, model, quantity, rng).await?,
            SeedTable::Comments => seed_comments(&mut tx, model, quantity, rng).await?,
            SeedTable::Votes => seed_votes(&mut tx, quantity, rng).await?,
        };
        report.inserted.insert(t.table(), n);
    }
    for t in SeedTable::ALL {
        report.totals.insert(t.table(), count(&mut tx, t.table()).await?);
    }
    tx.commit().await?;
    tracing::info!(inserted = ?report.inserted, totals = ?report.totals, "fake data loaded");
    Ok(report)
}

async fn seed_persons(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    quantity: u32,
    rng: &mut StdRng,
) -> Result<u64, AppError> {
    let persons = entity(model, "person")?;
    for _ in 0..quantity {
        let q = sql::insert(persons, &fake_person(rng));
        fetch_optional(&mut *conn, &q).await?;
    }
    Ok(u64::from(quantity))
}

async fn seed_comments(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    quantity: u32,
    rng: &mut StdRng,
) -> Result<u64, AppError> {
    let comments = entity(model, "comment")?;
    let authors = sample_ids(conn, "person").await?;
    if authors.is_empty() {
        return Err(AppError::Conflict("no persons exist, seed users first".into()));
    }
    let mut threads: Vec<(i64, Option<i64>)> = sqlx::query_as::<_, (i32, Option<i32>)>(&format!(
        "SELECT id, top_parent_id FROM comment ORDER BY random() LIMIT {}",
        ID_SAMPLE
    ))
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(id, top)| (i64::from(id), top.map(i64::from)))
    .collect();

    for _ in 0..quantity {
        let author = *authors.choose(rng).unwrap_or(&authors[0]);
        let mut body = Map::new();
        body.insert("user_id".into(), json!(author));
        body.insert("content".into(), json!(fake_content(rng)));
        let reply_to = if rng.gen_bool(0.3) { threads.choose(rng).copied() } else { None };
        if let Some((parent, top)) = reply_to {
            body.insert("parent_id".into(), json!(parent));
            body.insert("top_parent_id".into(), json!(top.unwrap_or(parent)));
        }
        let row = fetch_optional(&mut *conn, &sql::insert(comments, &body))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        if let Some(id) = row.get("id").and_then(Value::as_i64) {
            let top = reply_to.map(|(parent, top)| top.unwrap_or(parent));
            threads.push((id, top));
        }
    }
    Ok(u64::from(quantity))
}

async fn seed_votes(conn: &mut PgConnection, quantity: u32, rng: &mut StdRng) -> Result<u64, AppError> {
    let voters = sample_ids(conn, "person").await?;
    let targets = sample_ids(conn, "comment").await?;
    if voters.is_empty() || targets.is_empty() {
        return Err(AppError::Conflict("votes need existing persons and comments".into()));
    }
    let mut inserted = 0;
    for _ in 0..quantity {
        let q = QueryBuf {
            sql: r#"INSERT INTO "vote" ("comment_id", "user_id") VALUES ($1::integer, $2::integer)
ON CONFLICT ("comment_id", "user_id") DO NOTHING"#
                .into(),
            params: vec![
                json!(*targets.choose(rng).unwrap_or(&targets[0])),
                json!(*voters.choose(rng).unwrap_or(&voters[0])),
            ],
        };
        let result = crate::sql::bind_params(sqlx::query(&q.sql), &q.params)
            .execute(&mut *conn)
            .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

async fn sample_ids(conn: &mut PgConnection, table: &str) -> Result<Vec<i64>, AppError> {
    let rows = sqlx::query(&format!(
        "SELECT id FROM {} ORDER BY random() LIMIT {}",
        quote_ident(table),
        ID_SAMPLE
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows
        .iter()
        .filter_map(|r| row_to_json(r).get("id").and_then(Value::as_i64))
        .collect())
}

async fn count(conn: &mut PgConnection, table: &str) -> Result<u64, AppError> {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
        .fetch_one(&mut *conn)
        .await?;
    Ok(n.max(0) as u64)
}
