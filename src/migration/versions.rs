//! Versioned migration list. Append only: applied migrations are checksummed.

use crate::migration::ddl::MigrationStep;
use crate::models;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub steps: Vec<MigrationStep>,
}

impl Migration {
    pub fn new(version: i64, name: &str, steps: Vec<MigrationStep>) -> Self {
        Migration {
            version,
            name: name.to_string(),
            steps,
        }
    }

    /// Identifier such as `0001_initial`.
    pub fn id(&self) -> String {
        format!("{:04}_{}", self.version, self.name)
    }

    pub fn statements(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.to_sql()).collect()
    }

    /// SHA-256 over the rendered DDL, one statement per line.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for stmt in self.statements() {
            hasher.update(stmt.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

fn initial() -> Migration {
    let mut steps = vec![
        MigrationStep::CreateEnum(models::gender_enum()),
        MigrationStep::CreateTable(models::person_table()),
        MigrationStep::CreateTable(models::comment_table()),
        MigrationStep::CreateTable(models::vote_table()),
    ];
    steps.extend(models::foreign_keys().into_iter().map(MigrationStep::AddForeignKey));
    Migration::new(1, "initial", steps)
}

fn lookup_indexes() -> Migration {
    let mut steps: Vec<MigrationStep> = models::lookup_indexes()
        .into_iter()
        .map(MigrationStep::CreateIndex)
        .collect();
    steps.push(MigrationStep::AddUnique {
        table: "vote".into(),
        unique: models::vote_unique(),
    });
    Migration::new(2, "lookup_indexes", steps)
}

/// Every defined migration, in application order.
pub fn all() -> Vec<Migration> {
    vec![initial(), lookup_indexes()]
}
