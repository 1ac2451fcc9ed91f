//! Resolved entity model: graph and API config flattened for runtime use.

use crate::config::{ColumnType, ValidationRule};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: ColumnType,
    /// A full replace writes NULL here when the body omits the column.
    pub nullable: bool,
    /// Whether the column has a DB default (serial, NOW(), literal).
    pub has_default: bool,
    /// Clients may not set this column.
    pub read_only: bool,
}

impl ColumnInfo {
    /// Enum columns are selected as text so they decode like strings.
    pub fn select_expr(&self) -> String {
        let q = crate::config::quote_ident(&self.name);
        match self.ty {
            ColumnType::Enum(_) => format!("{}::text AS {}", q, q),
            _ => q,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub table_name: String,
    pub path_segment: String,
    pub pk_column: String,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<String>,
    pub touch_column: Option<String>,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }

    pub fn entity_by_table(&self, table: &str) -> Option<&ResolvedEntity> {
        self.entities.iter().find(|e| e.table_name == table)
    }
}
