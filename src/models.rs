//! Domain schema: persons, comments and votes, plus how each is exposed over HTTP.

use crate::config::{
    ApiEntityConfig, ColumnDef, ColumnDefault, ColumnType, EnumDef, ForeignKeyDef, IndexDef, ModelGraph,
    ReferentialAction, TableDef, UniqueDef, ValidationRule,
};
use std::collections::HashMap;

pub const APP_NAME: &str = "forum";

pub const GENDERS: [&str; 3] = ["Male", "Female", "Other"];

pub fn gender_enum() -> EnumDef {
    EnumDef {
        name: "gender".into(),
        values: GENDERS.iter().map(|g| g.to_string()).collect(),
    }
}

pub fn person_table() -> TableDef {
    TableDef {
        name: "person".into(),
        primary_key: "id".into(),
        columns: vec![
            ColumnDef::new("id", ColumnType::Serial),
            ColumnDef::new("is_admin", ColumnType::Boolean).default(ColumnDefault::Literal("false".into())),
            ColumnDef::new("first_name", ColumnType::Varchar(50)),
            ColumnDef::new("last_name", ColumnType::Varchar(50)),
            ColumnDef::new("email", ColumnType::Varchar(150)).nullable(),
            ColumnDef::new("gender", ColumnType::Enum("gender".into())),
            ColumnDef::new("avatar", ColumnType::Varchar(255)).nullable(),
            ColumnDef::new("job", ColumnType::Varchar(50)).nullable(),
            ColumnDef::new("company", ColumnType::Varchar(50)).nullable(),
            ColumnDef::new("date_of_birth", ColumnType::Date),
            ColumnDef::new("country_of_birth", ColumnType::Varchar(50)),
        ],
        unique: vec![],
    }
}

pub fn comment_table() -> TableDef {
    TableDef {
        name: "comment".into(),
        primary_key: "id".into(),
        columns: vec![
            ColumnDef::new("id", ColumnType::Serial),
            ColumnDef::new("user_id", ColumnType::Integer),
            ColumnDef::new("parent_id", ColumnType::Integer).nullable(),
            ColumnDef::new("top_parent_id", ColumnType::Integer).nullable(),
            ColumnDef::new("added", ColumnType::Timestamptz).default(ColumnDefault::Now),
            ColumnDef::new("edited", ColumnType::Timestamptz).default(ColumnDefault::Now),
            ColumnDef::new("content", ColumnType::Text),
        ],
        unique: vec![],
    }
}

pub fn vote_table() -> TableDef {
    TableDef {
        name: "vote".into(),
        primary_key: "id".into(),
        columns: vec![
            ColumnDef::new("id", ColumnType::Serial),
            ColumnDef::new("comment_id", ColumnType::Integer),
            ColumnDef::new("user_id", ColumnType::Integer),
        ],
        unique: vec![],
    }
}

pub fn foreign_keys() -> Vec<ForeignKeyDef> {
    let fk = |name: &str, table: &str, column: &str, target: &str| ForeignKeyDef {
        name: name.into(),
        table: table.into(),
        column: column.into(),
        references_table: target.into(),
        references_column: "id".into(),
        on_delete: ReferentialAction::Cascade,
    };
    vec![
        fk("comment_user_id_fkey", "comment", "user_id", "person"),
        fk("comment_parent_id_fkey", "comment", "parent_id", "comment"),
        fk("comment_top_parent_id_fkey", "comment", "top_parent_id", "comment"),
        fk("vote_comment_id_fkey", "vote", "comment_id", "comment"),
        fk("vote_user_id_fkey", "vote", "user_id", "person"),
    ]
}

pub fn lookup_indexes() -> Vec<IndexDef> {
    let idx = |name: &str, table: &str, column: &str| IndexDef {
        name: name.into(),
        table: table.into(),
        columns: vec![column.into()],
        unique: false,
    };
    vec![
        idx("idx_comment_user_id", "comment", "user_id"),
        idx("idx_comment_top_parent_id", "comment", "top_parent_id"),
        idx("idx_vote_user_id", "vote", "user_id"),
    ]
}

pub fn vote_unique() -> UniqueDef {
    UniqueDef {
        name: "vote_comment_id_user_id_key".into(),
        columns: vec!["comment_id".into(), "user_id".into()],
    }
}

/// The schema every migration together must produce.
pub fn model_graph() -> ModelGraph {
    let mut vote = vote_table();
    vote.unique.push(vote_unique());
    ModelGraph {
        enums: vec![gender_enum()],
        tables: vec![person_table(), comment_table(), vote],
        foreign_keys: foreign_keys(),
        indexes: lookup_indexes(),
    }
}

fn name_rule() -> ValidationRule {
    ValidationRule::required().length(3, 50)
}

fn optional_name_rule() -> ValidationRule {
    ValidationRule::default().length(3, 50)
}

pub fn api_entities() -> Vec<ApiEntityConfig> {
    let all_ops: Vec<String> = ["create", "read", "list", "update", "delete"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut user_rules = HashMap::new();
    user_rules.insert("first_name".to_string(), name_rule());
    user_rules.insert("last_name".to_string(), name_rule());
    user_rules.insert("country_of_birth".to_string(), name_rule());
    user_rules.insert("job".to_string(), optional_name_rule());
    user_rules.insert("company".to_string(), optional_name_rule());
    user_rules.insert("email".to_string(), ValidationRule::default().format("email"));
    user_rules.insert("avatar".to_string(), ValidationRule::default().format("url"));
    user_rules.insert("gender".to_string(), ValidationRule::required().one_of(&GENDERS));
    user_rules.insert("date_of_birth".to_string(), ValidationRule::required().format("date"));
    user_rules.insert("is_admin".to_string(), ValidationRule::default().format("boolean"));

    let mut comment_rules = HashMap::new();
    comment_rules.insert("user_id".to_string(), ValidationRule::required().format("integer"));
    comment_rules.insert("parent_id".to_string(), ValidationRule::default().format("integer"));
    comment_rules.insert("top_parent_id".to_string(), ValidationRule::default().format("integer"));
    comment_rules.insert(
        "content".to_string(),
        ValidationRule {
            required: Some(true),
            min_length: Some(1),
            ..Default::default()
        },
    );

    let mut vote_rules = HashMap::new();
    vote_rules.insert("comment_id".to_string(), ValidationRule::required().format("integer"));
    vote_rules.insert("user_id".to_string(), ValidationRule::required().format("integer"));

    vec![
        ApiEntityConfig {
            table: "person".into(),
            path_segment: "users".into(),
            operations: all_ops.clone(),
            read_only: vec![],
            touch_column: None,
            validation: user_rules,
        },
        ApiEntityConfig {
            table: "comment".into(),
            path_segment: "comments".into(),
            operations: all_ops,
            read_only: vec!["added".into(), "edited".into()],
            touch_column: Some("edited".into()),
            validation: comment_rules,
        },
        ApiEntityConfig {
            table: "vote".into(),
            path_segment: "votes".into(),
            operations: vec!["create".into(), "read".into(), "list".into(), "delete".into()],
            read_only: vec![],
            touch_column: None,
            validation: vote_rules,
        },
    ]
}
