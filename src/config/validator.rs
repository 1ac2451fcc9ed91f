//! Model graph validation: referential integrity and API consistency.

use crate::config::{ApiEntityConfig, ColumnType, ModelGraph};
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate_graph(graph: &ModelGraph) -> Result<(), ConfigError> {
    let mut enum_names = HashSet::new();
    for e in &graph.enums {
        if !enum_names.insert(e.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "enum",
                name: e.name.clone(),
            });
        }
    }

    let mut table_names = HashSet::new();
    for t in &graph.tables {
        if !table_names.insert(t.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "table",
                name: t.name.clone(),
            });
        }
        let mut column_names = HashSet::new();
        for c in &t.columns {
            if !column_names.insert(c.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "column",
                    name: format!("{}.{}", t.name, c.name),
                });
            }
            if let ColumnType::Enum(name) = &c.ty {
                if !enum_names.contains(name.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "enum",
                        id: name.clone(),
                    });
                }
            }
        }
        if !column_names.contains(t.primary_key.as_str()) {
            return Err(ConfigError::InvalidPrimaryKey {
                table: t.name.clone(),
                column: t.primary_key.clone(),
            });
        }
        for u in &t.unique {
            for col in &u.columns {
                if !column_names.contains(col.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "column",
                        id: format!("{}.{}", t.name, col),
                    });
                }
            }
        }
    }

    for fk in &graph.foreign_keys {
        require_column(graph, &fk.table, &fk.column)?;
        require_column(graph, &fk.references_table, &fk.references_column)?;
    }

    for idx in &graph.indexes {
        for col in &idx.columns {
            require_column(graph, &idx.table, col)?;
        }
    }

    Ok(())
}

/// API entities must point at declared tables and use distinct path segments.
pub fn validate_api_entities(graph: &ModelGraph, api_entities: &[ApiEntityConfig]) -> Result<(), ConfigError> {
    let mut path_segments = HashSet::new();
    for api in api_entities {
        let table = graph.table(&api.table).ok_or_else(|| ConfigError::MissingReference {
            kind: "table",
            id: api.table.clone(),
        })?;
        if !path_segments.insert(api.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(api.path_segment.clone()));
        }
        for col in api.validation.keys().chain(api.read_only.iter()).chain(api.touch_column.iter()) {
            if table.column(col).is_none() {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", api.table, col),
                });
            }
        }
    }
    Ok(())
}

fn require_column(graph: &ModelGraph, table: &str, column: &str) -> Result<(), ConfigError> {
    let t = graph.table(table).ok_or_else(|| ConfigError::MissingReference {
        kind: "table",
        id: table.to_string(),
    })?;
    if t.column(column).is_none() {
        return Err(ConfigError::MissingReference {
            kind: "column",
            id: format!("{}.{}", table, column),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDef, ForeignKeyDef, ReferentialAction, TableDef};
    use crate::models::{api_entities, model_graph};

    fn table(name: &str, cols: &[&str]) -> TableDef {
        TableDef {
            name: name.into(),
            primary_key: "id".into(),
            columns: cols.iter().map(|c| ColumnDef::new(c, ColumnType::Integer)).collect(),
            unique: vec![],
        }
    }

    #[test]
    fn domain_graph_is_valid() {
        let graph = model_graph();
        validate_graph(&graph).unwrap();
        validate_api_entities(&graph, &api_entities()).unwrap();
    }

    #[test]
    fn missing_primary_key_column() {
        let graph = ModelGraph {
            tables: vec![table("person", &["name"])],
            ..Default::default()
        };
        assert!(matches!(
            validate_graph(&graph),
            Err(ConfigError::InvalidPrimaryKey { .. })
        ));
    }

    #[test]
    fn foreign_key_to_unknown_table() {
        let graph = ModelGraph {
            tables: vec![table("comment", &["id", "user_id"])],
            foreign_keys: vec![ForeignKeyDef {
                name: "fk_comment_user".into(),
                table: "comment".into(),
                column: "user_id".into(),
                references_table: "person".into(),
                references_column: "id".into(),
                on_delete: ReferentialAction::Cascade,
            }],
            ..Default::default()
        };
        assert_eq!(
            validate_graph(&graph),
            Err(ConfigError::MissingReference {
                kind: "table",
                id: "person".into()
            })
        );
    }

    #[test]
    fn unknown_enum_type() {
        let mut t = table("person", &["id"]);
        t.columns.push(ColumnDef::new("gender", ColumnType::Enum("gender".into())));
        let graph = ModelGraph {
            tables: vec![t],
            ..Default::default()
        };
        assert!(matches!(
            validate_graph(&graph),
            Err(ConfigError::MissingReference { kind: "enum", .. })
        ));
    }

    #[test]
    fn duplicate_path_segments_are_rejected() {
        let graph = model_graph();
        let mut apis = api_entities();
        let mut dup = apis[0].clone();
        dup.table = "vote".into();
        apis.push(dup);
        assert!(matches!(
            validate_api_entities(&graph, &apis),
            Err(ConfigError::DuplicatePathSegment(_))
        ));
    }
}
