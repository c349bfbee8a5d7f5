//! Batch orchestrator (`spec.md` §4.F) — drives one batch end to end
//! inside a single transaction: normalize, denest, reconcile, stage,
//! merge, commit.

use std::collections::{BTreeMap, BTreeSet};

use postgres::{Client, Transaction};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::buffer::StreamBuffer;
use crate::config::{self, TargetConfig};
use crate::consts::{self, BATCHED_AT, PRIMARY_KEY, RECEIVED_AT, SEPARATOR, SEQUENCE, TABLE_VERSION};
use crate::error::{LoaderError, Result};
use crate::record::{self, RecordsMap};
use crate::remote_schema::{self, RemoteTableSchema};
use crate::schema::{self, SqlType};
use crate::{bulk_loader, reconcile};

/// Write one batch from `buffer` to `config.schema` over `client`.
///
/// No-op if the buffer is empty. On any error the transaction rolls back
/// (via `Transaction`'s drop) and the buffer is left unflushed, so the
/// same messages remain available for the caller to retry.
pub fn write_batch(config: &TargetConfig, client: &mut Client, buffer: &mut dyn StreamBuffer) -> Result<()> {
    if buffer.count() == 0 {
        return Ok(());
    }

    let mut tx = client.transaction()?;
    config::apply_statement_timeout(&mut tx, config.statement_timeout_ms)?;
    write_batch_in_tx(&config.schema, &mut tx, buffer)?;
    tx.commit()?;
    buffer.flush_buffer();
    Ok(())
}

fn write_batch_in_tx(pg_schema: &str, tx: &mut Transaction<'_>, buffer: &mut dyn StreamBuffer) -> Result<()> {
    let stream = buffer.stream().to_string();
    let key_properties = buffer.key_properties().to_vec();
    let use_uuid_pk = buffer.use_uuid_pk();
    let root_properties = buffer.schema_properties().clone();
    let batched_at = crate::timestamp::now();

    let mut versions: BTreeSet<Option<i64>> = BTreeSet::new();
    let mut max_version: Option<i64> = None;
    let mut processed = Vec::with_capacity(buffer.count());
    for msg in buffer.peek_buffer() {
        let row = record::normalize_record(msg, use_uuid_pk, &batched_at);
        let version = row.get(TABLE_VERSION).and_then(Value::as_i64);
        if let Some(v) = version {
            max_version = Some(max_version.map_or(v, |m| m.max(v)));
        }
        versions.insert(version);
        processed.push(row);
    }

    let remote_root = remote_schema::get_table_schema(tx, pg_schema, &stream)?;
    let current_version = remote_root.as_ref().and_then(|r| r.version);

    if let Some(remote) = &remote_root {
        check_key_properties_unchanged(&stream, remote, &key_properties)?;
        check_key_column_types_unchanged(&stream, remote, &key_properties, &root_properties)?;
    }

    if let Some(current) = current_version {
        if let Some(min_version) = versions.iter().copied().flatten().min() {
            if min_version < current {
                warn!(stream, min_version, current, "records from an earlier table version detected");
            }
        }
    }
    if versions.len() > 1 {
        warn!(stream, versions = ?versions, "multiple table versions in batch, using only the latest");
    }

    let target_version = max_version;
    let root_table_name = match (current_version, target_version) {
        (Some(current), Some(target)) if target > current => format!("{stream}{SEPARATOR}{target}"),
        _ => stream.clone(),
    };

    let records: Vec<Map<String, Value>> = match target_version {
        Some(target) => processed
            .into_iter()
            .filter(|r| r.get(TABLE_VERSION).and_then(Value::as_i64) == Some(target))
            .collect(),
        None => processed,
    };

    let mut records_map = RecordsMap::new();
    record::denest_records(&root_table_name, records, &mut records_map, &key_properties, None, -1);

    let mut table_properties: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    flatten_schema_properties(
        &root_table_name,
        None,
        &root_properties,
        -1,
        &key_properties,
        &root_properties,
        use_uuid_pk,
        target_version,
        &mut table_properties,
    );

    for (table_name, properties) in &table_properties {
        let rows = match records_map.remove(table_name) {
            Some(rows) if !rows.is_empty() => rows,
            _ => continue,
        };

        let mut remote = remote_schema::get_table_schema(tx, pg_schema, table_name)?;
        match &mut remote {
            None => {
                bulk_loader::create_table(tx, pg_schema, table_name, properties, &key_properties, target_version)?;
                remote = remote_schema::get_table_schema(tx, pg_schema, table_name)?;
            }
            Some(existing) => {
                reconcile::reconcile_schema(tx, pg_schema, table_name, existing, properties)?;
            }
        }
        let remote = remote.ok_or_else(|| {
            LoaderError::internal(format!("table `{table_name}` missing immediately after creation"))
        })?;

        let temp_table = bulk_loader::temp_table_name(table_name);
        let temp_properties = remote_structural_properties(&remote);
        bulk_loader::create_table(tx, pg_schema, &temp_table, &temp_properties, &key_properties, target_version)?;
        bulk_loader::persist_rows(tx, pg_schema, table_name, &temp_table, &remote, properties, &key_properties, &rows)?;
    }

    Ok(())
}

fn check_key_properties_unchanged(stream: &str, remote: &RemoteTableSchema, key_properties: &[String]) -> Result<()> {
    let remote_keys: BTreeSet<&String> = remote.key_properties.iter().collect();
    let incoming_keys: BTreeSet<&String> = key_properties.iter().collect();
    if remote_keys != incoming_keys {
        return Err(LoaderError::schema_incompatible(
            stream,
            format!(
                "key_properties changed: existing values are {:?}, streamed values are {:?}",
                remote.key_properties, key_properties
            ),
        ));
    }
    Ok(())
}

fn check_key_column_types_unchanged(
    stream: &str,
    remote: &RemoteTableSchema,
    key_properties: &[String],
    root_properties: &Map<String, Value>,
) -> Result<()> {
    for key in key_properties {
        let (Some(col), Some(incoming_schema)) = (remote.column(key), root_properties.get(key)) else {
            continue;
        };
        let remote_type = schema::get_type(&schema::from_sql(&col.sql_type, col.nullable));
        let incoming_type = schema::get_type(incoming_schema);
        if remote_type != incoming_type {
            return Err(LoaderError::schema_incompatible(
                stream,
                format!(
                    "key_properties type change detected for \"{key}\": existing values are {remote_type:?}, streamed values are {incoming_type:?}"
                ),
            ));
        }
    }
    Ok(())
}

fn remote_structural_properties(remote: &RemoteTableSchema) -> Map<String, Value> {
    remote
        .columns
        .iter()
        .map(|(name, col)| (name.clone(), schema::from_sql(&col.sql_type, col.nullable)))
        .collect()
}

/// Walk an incoming structural schema the same way [`record::denest_records`]
/// walks the records it describes, so every table the batch will write rows
/// into has its full column set (user-declared + system columns) known
/// before reconciliation runs.
#[allow(clippy::too_many_arguments)]
fn flatten_schema_properties(
    table_name: &str,
    current_path: Option<&str>,
    fields: &Map<String, Value>,
    level: i32,
    key_properties: &[String],
    root_properties: &Map<String, Value>,
    use_uuid_pk: bool,
    target_version: Option<i64>,
    tables: &mut BTreeMap<String, Map<String, Value>>,
) {
    tables.entry(table_name.to_string()).or_insert_with(|| {
        system_columns_for_table(level, key_properties, root_properties, use_uuid_pk, target_version)
    });

    for (prop, field_schema) in fields {
        let next_path = match current_path {
            Some(parent) => format!("{parent}{SEPARATOR}{prop}"),
            None => prop.clone(),
        };

        let nested_properties = (schema::get_type(field_schema) == SqlType::Object)
            .then(|| field_schema.get("properties").and_then(Value::as_object))
            .flatten();

        if let Some(inner) = nested_properties {
            let inner = inner.clone();
            flatten_schema_properties(
                table_name,
                Some(&next_path),
                &inner,
                level,
                key_properties,
                root_properties,
                use_uuid_pk,
                target_version,
                tables,
            );
            continue;
        }

        if schema::get_type(field_schema) == SqlType::Array {
            let child_table = format!("{table_name}{SEPARATOR}{next_path}");
            let item_properties = field_schema
                .get("items")
                .and_then(|items| items.get("properties"))
                .and_then(Value::as_object)
                .cloned();
            let item_fields = item_properties.unwrap_or_else(|| {
                let item_schema = field_schema.get("items").cloned().unwrap_or_else(|| json!({"type": "string"}));
                let mut m = Map::new();
                m.insert("value".to_string(), item_schema);
                m
            });
            flatten_schema_properties(
                &child_table,
                None,
                &item_fields,
                level + 1,
                key_properties,
                root_properties,
                use_uuid_pk,
                target_version,
                tables,
            );
            continue;
        }

        tables.get_mut(table_name).unwrap().insert(next_path, field_schema.clone());
    }
}

fn system_columns_for_table(
    level: i32,
    key_properties: &[String],
    root_properties: &Map<String, Value>,
    use_uuid_pk: bool,
    target_version: Option<i64>,
) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert(SEQUENCE.to_string(), integer_schema(false));

    if level < 0 {
        out.insert(RECEIVED_AT.to_string(), datetime_schema(true));
        out.insert(BATCHED_AT.to_string(), datetime_schema(false));
        if target_version.is_some() {
            out.insert(TABLE_VERSION.to_string(), integer_schema(true));
        }
        if use_uuid_pk {
            out.insert(PRIMARY_KEY.to_string(), string_schema(true));
        }
    } else {
        for key in key_properties {
            let key_schema = root_properties.get(key).cloned().unwrap_or_else(|| string_schema(false));
            out.insert(consts::source_key_column(key), key_schema);
        }
        for lvl in 0..=level {
            out.insert(consts::level_id_column(lvl), integer_schema(false));
        }
    }

    out
}

fn integer_schema(nullable: bool) -> Value {
    if nullable { json!({"type": ["integer", "null"]}) } else { json!({"type": "integer"}) }
}

fn string_schema(nullable: bool) -> Value {
    if nullable { json!({"type": ["string", "null"]}) } else { json!({"type": "string"}) }
}

fn datetime_schema(nullable: bool) -> Value {
    let mut tokens = vec!["string".to_string()];
    if nullable {
        tokens.push("null".to_string());
    }
    json!({"type": tokens, "format": "date-time"})
}
