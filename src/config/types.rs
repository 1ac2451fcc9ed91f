//! Schema description types: tables, columns, enums and constraints as plain data.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semantic column type. Rendered to PostgreSQL by the migration layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "arg")]
pub enum ColumnType {
    Serial,
    Integer,
    BigInt,
    Boolean,
    Varchar(u32),
    Text,
    Date,
    Timestamptz,
    /// Named enum type declared in the same graph.
    Enum(String),
}

impl ColumnType {
    /// Type used in DDL column definitions.
    pub fn ddl(&self) -> String {
        match self {
            ColumnType::Serial => "SERIAL".into(),
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInt => "BIGINT".into(),
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::Varchar(n) => format!("VARCHAR({})", n),
            ColumnType::Text => "TEXT".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::Timestamptz => "TIMESTAMPTZ".into(),
            ColumnType::Enum(name) => quote_ident(name),
        }
    }

    /// Type used to cast text parameters (`$1::integer`). Serial columns are plain integers at runtime.
    pub fn cast(&self) -> String {
        match self {
            ColumnType::Serial | ColumnType::Integer => "integer".into(),
            ColumnType::BigInt => "bigint".into(),
            ColumnType::Boolean => "boolean".into(),
            ColumnType::Varchar(_) => "varchar".into(),
            ColumnType::Text => "text".into(),
            ColumnType::Date => "date".into(),
            ColumnType::Timestamptz => "timestamptz".into(),
            ColumnType::Enum(name) => quote_ident(name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    Literal(String),
    Now,
    Expression(String),
}

impl ColumnDefault {
    pub fn ddl(&self) -> String {
        match self {
            ColumnDefault::Literal(s) => format!("'{}'", s.replace('\'', "''")),
            ColumnDefault::Now => "NOW()".into(),
            ColumnDefault::Expression(e) => e.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefault>,
}

impl ColumnDef {
    pub fn new(name: &str, ty: ColumnType) -> Self {
        ColumnDef {
            name: name.to_string(),
            ty,
            nullable: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Serial columns and explicit defaults are filled in by the database.
    pub fn has_default(&self) -> bool {
        self.default.is_some() || matches!(self.ty, ColumnType::Serial)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub unique: Vec<UniqueDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueDef {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

impl ReferentialAction {
    pub fn sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::Restrict => "RESTRICT",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub name: String,
    pub table: String,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    pub on_delete: ReferentialAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// The full declared schema: what the database must look like once every migration is applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelGraph {
    pub enums: Vec<EnumDef>,
    pub tables: Vec<TableDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub indexes: Vec<IndexDef>,
}

impl ModelGraph {
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.name == name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    /// Length bounds are measured after trimming and collapsing inner whitespace.
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

impl ValidationRule {
    pub fn required() -> Self {
        ValidationRule {
            required: Some(true),
            ..Default::default()
        }
    }

    pub fn length(mut self, min: u32, max: u32) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| serde_json::Value::from(*v)).collect());
        self
    }
}

/// How a table is exposed over HTTP.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEntityConfig {
    pub table: String,
    pub path_segment: String,
    pub operations: Vec<String>,
    /// Columns clients may not write (timestamps, keys).
    #[serde(default)]
    pub read_only: Vec<String>,
    /// Column touched with NOW() on every update.
    #[serde(default)]
    pub touch_column: Option<String>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
