//! Render migration steps to PostgreSQL DDL.
//! Statements carry no IF NOT EXISTS: the bookkeeping table decides what runs.

use crate::config::types::*;
use serde::{Deserialize, Serialize};

/// One forward schema operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum MigrationStep {
    CreateEnum(EnumDef),
    CreateTable(TableDef),
    AddColumn { table: String, column: ColumnDef },
    AddForeignKey(ForeignKeyDef),
    CreateIndex(IndexDef),
    AddUnique { table: String, unique: UniqueDef },
}

impl MigrationStep {
    pub fn to_sql(&self) -> String {
        match self {
            MigrationStep::CreateEnum(e) => {
                let values: Vec<String> = e.values.iter().map(|v| literal(v)).collect();
                format!("CREATE TYPE {} AS ENUM ({})", quote_ident(&e.name), values.join(", "))
            }
            MigrationStep::CreateTable(t) => {
                let mut defs: Vec<String> = t.columns.iter().map(column_def).collect();
                defs.push(format!("PRIMARY KEY ({})", quote_ident(&t.primary_key)));
                for u in &t.unique {
                    defs.push(unique_constraint(u));
                }
                format!("CREATE TABLE {} (\n  {}\n)", quote_ident(&t.name), defs.join(",\n  "))
            }
            MigrationStep::AddColumn { table, column } => {
                format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(table), column_def(column))
            }
            MigrationStep::AddForeignKey(fk) => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                quote_ident(&fk.table),
                quote_ident(&fk.name),
                quote_ident(&fk.column),
                quote_ident(&fk.references_table),
                quote_ident(&fk.references_column),
                fk.on_delete.sql()
            ),
            MigrationStep::CreateIndex(idx) => format!(
                "CREATE {}INDEX {} ON {} ({})",
                if idx.unique { "UNIQUE " } else { "" },
                quote_ident(&idx.name),
                quote_ident(&idx.table),
                ident_list(&idx.columns)
            ),
            MigrationStep::AddUnique { table, unique } => {
                format!("ALTER TABLE {} ADD {}", quote_ident(table), unique_constraint(unique))
            }
        }
    }

    /// Short label for logs and plan output.
    pub fn describe(&self) -> String {
        match self {
            MigrationStep::CreateEnum(e) => format!("create enum {}", e.name),
            MigrationStep::CreateTable(t) => format!("create table {}", t.name),
            MigrationStep::AddColumn { table, column } => format!("add column {}.{}", table, column.name),
            MigrationStep::AddForeignKey(fk) => format!("add foreign key {}", fk.name),
            MigrationStep::CreateIndex(idx) => format!("create index {}", idx.name),
            MigrationStep::AddUnique { table, unique } => format!("add unique {} on {}", unique.name, table),
        }
    }
}

fn column_def(c: &ColumnDef) -> String {
    let mut def = format!("{} {}", quote_ident(&c.name), c.ty.ddl());
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(ref d) = c.default {
        def.push_str(" DEFAULT ");
        def.push_str(&d.ddl());
    }
    def
}

fn unique_constraint(u: &UniqueDef) -> String {
    format!("CONSTRAINT {} UNIQUE ({})", quote_ident(&u.name), ident_list(&u.columns))
}

fn ident_list(cols: &[String]) -> String {
    cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{comment_table, foreign_keys, gender_enum, lookup_indexes, vote_unique};

    #[test]
    fn renders_enum() {
        assert_eq!(
            MigrationStep::CreateEnum(gender_enum()).to_sql(),
            r#"CREATE TYPE "gender" AS ENUM ('Male', 'Female', 'Other')"#
        );
    }

    #[test]
    fn renders_table_with_defaults_and_nullability() {
        let sql = MigrationStep::CreateTable(comment_table()).to_sql();
        assert!(sql.starts_with("CREATE TABLE \"comment\" ("));
        assert!(sql.contains("\"id\" SERIAL NOT NULL"));
        assert!(sql.contains("\"parent_id\" INTEGER,"));
        assert!(sql.contains("\"added\" TIMESTAMPTZ NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn renders_foreign_key() {
        let fk = foreign_keys().remove(0);
        assert_eq!(
            MigrationStep::AddForeignKey(fk).to_sql(),
            "ALTER TABLE \"comment\" ADD CONSTRAINT \"comment_user_id_fkey\" FOREIGN KEY (\"user_id\") \
             REFERENCES \"person\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn renders_index_and_unique() {
        let idx = lookup_indexes().remove(0);
        assert_eq!(
            MigrationStep::CreateIndex(idx).to_sql(),
            "CREATE INDEX \"idx_comment_user_id\" ON \"comment\" (\"user_id\")"
        );
        let unique = MigrationStep::AddUnique {
            table: "vote".into(),
            unique: vote_unique(),
        };
        assert_eq!(
            unique.to_sql(),
            "ALTER TABLE \"vote\" ADD CONSTRAINT \"vote_comment_id_user_id_key\" UNIQUE (\"comment_id\", \"user_id\")"
        );
    }

    #[test]
    fn literal_defaults_are_escaped() {
        let step = MigrationStep::AddColumn {
            table: "person".into(),
            column: ColumnDef::new("nickname", ColumnType::Text).default(ColumnDefault::Literal("it's".into())),
        };
        assert_eq!(
            step.to_sql(),
            "ALTER TABLE \"person\" ADD COLUMN \"nickname\" TEXT NOT NULL DEFAULT 'it''s'"
        );
    }
}
