//! Build the runtime model from the declared graph and API exposure config.

use crate::config::resolved::{ColumnInfo, ResolvedEntity, ResolvedModel};
use crate::config::{validate_api_entities, validate_graph, ApiEntityConfig, ModelGraph};
use crate::error::ConfigError;
use std::collections::HashMap;

/// Validate the graph, then resolve one entity per API config entry.
pub fn resolve(graph: &ModelGraph, api_entities: &[ApiEntityConfig]) -> Result<ResolvedModel, ConfigError> {
    validate_graph(graph)?;
    validate_api_entities(graph, api_entities)?;

    let mut entities = Vec::new();
    let mut entity_by_path = HashMap::new();

    for api in api_entities {
        let table = graph.table(&api.table).ok_or_else(|| ConfigError::MissingReference {
            kind: "table",
            id: api.table.clone(),
        })?;

        let columns: Vec<ColumnInfo> = table
            .columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                ty: c.ty.clone(),
                nullable: c.nullable,
                has_default: c.has_default(),
                read_only: c.name == table.primary_key || api.read_only.contains(&c.name),
            })
            .collect();

        let entity = ResolvedEntity {
            table_name: table.name.clone(),
            path_segment: api.path_segment.clone(),
            pk_column: table.primary_key.clone(),
            columns,
            operations: api.operations.clone(),
            touch_column: api.touch_column.clone(),
            validation: api.validation.clone(),
        };
        entity_by_path.insert(api.path_segment.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_path,
    })
}
