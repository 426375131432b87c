//! Row <-> domain-type conversions, and the small JSON (de)serialize
//! helpers every table with a JSON column needs.

use chrono::{DateTime, Utc};
use kg_core::errors::StorageError;
use kg_core::types::{Edge, EdgeRef, Event, Note, Schema, Statistic, Node};
use rusqlite::Row;
use serde_json::Value as Json;

pub fn parse_json(column: &str, raw: &str) -> Result<Json, StorageError> {
    serde_json::from_str(raw).map_err(|source| StorageError::MalformedJson { column: column.to_string(), source })
}

pub fn parse_string_list(column: &str, raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(|source| StorageError::MalformedJson { column: column.to_string(), source })
}

pub fn to_json_text(value: &Json) -> String {
    value.to_string()
}

pub fn node_from_row(row: &Row) -> rusqlite::Result<Result<Node, StorageError>> {
    let id: String = row.get("id")?;
    let node_type: String = row.get("type")?;
    let name: String = row.get("name")?;
    let env: Option<String> = row.get("env")?;
    let properties_raw: String = row.get("properties")?;
    let created_at: DateTime<Utc> = row.get("created_at")?;
    let updated_at: DateTime<Utc> = row.get("updated_at")?;

    Ok(parse_json("nodes.properties", &properties_raw).map(|properties| Node {
        id,
        node_type,
        name,
        env,
        properties,
        created_at,
        updated_at,
    }))
}

pub fn edge_from_row(row: &Row) -> rusqlite::Result<Result<Edge, StorageError>> {
    let source_id: String = row.get("source_id")?;
    let target_id: String = row.get("target_id")?;
    let relation: String = row.get("relation")?;
    let properties_raw: String = row.get("properties")?;
    let updated_at: DateTime<Utc> = row.get("updated_at")?;

    Ok(parse_json("edges.properties", &properties_raw).map(|properties| Edge {
        source_id,
        target_id,
        relation,
        properties,
        updated_at,
    }))
}

pub fn statistic_from_row(row: &Row) -> rusqlite::Result<Statistic> {
    Ok(Statistic {
        node_id: row.get("node_id")?,
        metric_name: row.get("metric_name")?,
        value: row.get("value")?,
        unit: row.get("unit")?,
        timestamp: row.get("timestamp")?,
    })
}

pub fn event_from_row(row: &Row) -> rusqlite::Result<Result<Event, StorageError>> {
    let source_id: String = row.get("source_id")?;
    let target_id: Option<String> = row.get("target_id")?;
    let event_type: String = row.get("type")?;
    let status: String = row.get("status")?;
    let severity: String = row.get("severity")?;
    let window_start: DateTime<Utc> = row.get("window_start")?;
    let window_end: DateTime<Utc> = row.get("window_end")?;
    let recent_timestamp: DateTime<Utc> = row.get("recent_timestamp")?;
    let count: i64 = row.get("count")?;
    let metadata_raw: String = row.get("metadata")?;

    Ok(parse_json("events.metadata", &metadata_raw).map(|metadata| Event {
        source_id,
        target_id,
        event_type,
        status,
        severity,
        window_start,
        window_end,
        recent_timestamp,
        count,
        metadata,
    }))
}

pub fn note_from_row(row: &Row) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get("id")?,
        title: row.get("title")?,
        body: row.get("body")?,
        created_at: row.get("created_at")?,
        node_ids: Vec::new(),
        edge_refs: Vec::new(),
    })
}

pub fn edge_ref_from_row(row: &Row) -> rusqlite::Result<EdgeRef> {
    Ok(EdgeRef {
        source_id: row.get("edge_source")?,
        target_id: row.get("edge_target")?,
        relation: row.get("edge_relation")?,
    })
}

pub fn schema_from_row(row: &Row) -> rusqlite::Result<Result<Schema, StorageError>> {
    let name: String = row.get("name")?;
    let definition_raw: String = row.get("definition")?;
    let scope_environments_raw: String = row.get("scope_environments")?;
    let scope_services_raw: String = row.get("scope_services")?;
    let description: Option<String> = row.get("description")?;
    let builtin: i64 = row.get("builtin")?;
    let created_at: DateTime<Utc> = row.get("created_at")?;

    Ok((|| {
        let blueprint = serde_json::from_str(&definition_raw).map_err(|source| StorageError::MalformedJson { column: "schemas.definition".to_string(), source })?;
        let environments = parse_string_list("schemas.scope_environments", &scope_environments_raw)?;
        let services = parse_string_list("schemas.scope_services", &scope_services_raw)?;
        Ok(Schema {
            name,
            blueprint,
            description,
            builtin: builtin != 0,
            environments,
            services,
            created_at,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_properties_surfaces_as_storage_error() {
        let err = parse_json("nodes.properties", "not json").unwrap_err();
        assert!(matches!(err, StorageError::MalformedJson { column, .. } if column == "nodes.properties"));
    }
}
