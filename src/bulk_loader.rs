//! Bulk loading: temp table creation, COPY-streamed staging, and the
//! versioned merge into the live table (`spec.md` §4.E).

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use postgres::Transaction;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::consts::{self, NULL_SENTINEL, SEPARATOR, SEQUENCE};
use crate::error::Result;
use crate::ident::Ident;
use crate::remote_schema::{self, RemoteTableSchema};
use crate::schema;

/// A temp/versioned staging table name: `<stream>__<uuid-without-dashes>`,
/// collision-proof without needing a lock.
pub fn temp_table_name(stream_name: &str) -> String {
    format!("{stream_name}{SEPARATOR}{}", Uuid::new_v4().simple())
}

/// Create an empty table with the given structural properties, optionally
/// stamping sidecar metadata when the stream declares key properties.
pub fn create_table(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table_name: &str,
    properties: &Map<String, Value>,
    key_properties: &[String],
    table_version: Option<i64>,
) -> Result<()> {
    let sql = format!("CREATE TABLE {} ()", Ident::schema_qualified(pg_schema, table_name));
    tx.execute(&sql, &[])?;

    if !key_properties.is_empty() {
        remote_schema::set_table_metadata(
            tx,
            pg_schema,
            table_name,
            key_properties,
            table_version,
            &BTreeMap::new(),
        )?;
    }

    for (prop, column_schema) in properties {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            Ident::schema_qualified(pg_schema, table_name),
            Ident::new(prop),
            schema::to_sql(column_schema),
        );
        tx.execute(&sql, &[])?;
    }

    Ok(())
}

/// Stream `records` into `temp_table_name` via `COPY ... FROM STDIN`, then
/// merge them into `target_table_name` and drop the temp table.
pub fn persist_rows(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    target_table_name: &str,
    temp_table_name: &str,
    remote_schema: &RemoteTableSchema,
    streamed_properties: &Map<String, Value>,
    key_properties: &[String],
    records: &[Map<String, Value>],
) -> Result<()> {
    let headers: Vec<String> = remote_schema.columns.keys().cloned().collect();

    let datetime_fields: BTreeSet<&str> = streamed_properties
        .iter()
        .filter(|(_, v)| v.get("format").and_then(Value::as_str) == Some("date-time"))
        .map(|(k, _)| k.as_str())
        .collect();

    let default_fields: BTreeMap<&str, &Value> = streamed_properties
        .iter()
        .filter_map(|(k, v)| v.get("default").filter(|d| !d.is_null()).map(|d| (k.as_str(), d)))
        .collect();

    let mut fields: BTreeSet<String> = headers.iter().cloned().collect();
    fields.extend(remote_schema.mappings.values().map(|m| m.from.clone()));

    let copy_sql = format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, NULL '{NULL_SENTINEL}')",
        Ident::schema_qualified(pg_schema, temp_table_name),
        headers.iter().map(|h| Ident::new(h).as_sql().to_string()).collect::<Vec<_>>().join(", "),
    );

    {
        let writer = tx.copy_in(&copy_sql)?;
        let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

        for record in records {
            let row = build_row(record, &fields, &datetime_fields, &default_fields, remote_schema, streamed_properties);
            let values: Vec<&str> = headers
                .iter()
                .map(|h| row.get(h).map(String::as_str).unwrap_or(NULL_SENTINEL))
                .collect();
            csv_writer.write_record(&values).map_err(csv_io_error)?;
        }
        let mut writer = csv_writer
            .into_inner()
            .map_err(|e| crate::error::LoaderError::internal(format!("failed flushing CSV writer for COPY: {e}")))?;
        writer.flush()?;
        writer.finish()?;
    }

    let subkeys: Vec<String> = headers.iter().filter(|h| consts::is_level_id_column(h)).cloned().collect();
    let merge_sql = build_merge_sql(pg_schema, target_table_name, temp_table_name, key_properties, &subkeys);
    tx.batch_execute(&merge_sql)?;

    Ok(())
}

/// Build one CSV row, keyed by final (post-mapping) column name, applying
/// the default/date-time/sentinel transforms and first-writer-wins
/// (non-null preferred) precedence on a mapping collision.
fn build_row(
    record: &Map<String, Value>,
    fields: &BTreeSet<String>,
    datetime_fields: &BTreeSet<&str>,
    default_fields: &BTreeMap<&str, &Value>,
    remote_schema: &RemoteTableSchema,
    streamed_properties: &Map<String, Value>,
) -> BTreeMap<String, String> {
    let mut row: BTreeMap<String, String> = BTreeMap::new();

    for field in fields {
        let mut value = record.get(field).cloned();

        if value.as_ref().is_none_or(Value::is_null) {
            if let Some(default) = default_fields.get(field.as_str()) {
                value = Some((*default).clone());
            }
        }

        if datetime_fields.contains(field.as_str()) {
            if let Some(v) = value.as_ref().filter(|v| !v.is_null()) {
                if let Some(formatted) = crate::timestamp::format_any(v) {
                    value = Some(Value::String(formatted));
                }
            }
        }

        if matches!(&value, Some(Value::String(s)) if s == NULL_SENTINEL) {
            warn!(field, "reserved NULL sentinel found in source value, coercing to literal null");
        }

        let text = value_to_csv_text(value.as_ref());

        let field_name = match streamed_properties.get(field) {
            Some(field_schema) => mapped_name(remote_schema, field, field_schema),
            None => field.clone(),
        };

        let should_write = match row.get(&field_name) {
            None => true,
            Some(existing) => existing == NULL_SENTINEL,
        };
        if should_write {
            row.insert(field_name, text);
        }
    }

    row
}

fn mapped_name(remote_schema: &RemoteTableSchema, field: &str, field_schema: &Value) -> String {
    let typed_field = format!("{field}{SEPARATOR}{}", schema::sql_shorthand(field_schema));
    if remote_schema.has_mapping(&typed_field, field) {
        typed_field
    } else {
        field.to_string()
    }
}

fn value_to_csv_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NULL_SENTINEL.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn csv_io_error(err: csv::Error) -> crate::error::LoaderError {
    crate::error::LoaderError::internal(format!("failed writing CSV row for COPY: {err}"))
}

/// Port of `get_update_sql`: stage the latest-per-key row from the temp
/// table, delete any row it supersedes, then insert fresh.
fn build_merge_sql(
    pg_schema: &str,
    target_table_name: &str,
    temp_table_name: &str,
    key_properties: &[String],
    subkeys: &[String],
) -> String {
    let table = Ident::schema_qualified(pg_schema, target_table_name).as_sql().to_string();
    let temp_table = Ident::schema_qualified(pg_schema, temp_table_name).as_sql().to_string();
    let seq = Ident::new(SEQUENCE).as_sql().to_string();

    let pk_idents: Vec<String> = key_properties.iter().map(|pk| Ident::new(pk).as_sql().to_string()).collect();

    let pk_temp_select = pk_idents
        .iter()
        .map(|pk| format!("{temp_table}.{pk}"))
        .collect::<Vec<_>>()
        .join(", ");
    let pk_where = pk_idents
        .iter()
        .map(|pk| format!("{table}.{pk} = {temp_table}.{pk}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let pk_null = pk_idents
        .iter()
        .map(|pk| format!("{table}.{pk} IS NULL"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let cxt_where = pk_idents
        .iter()
        .map(|pk| format!("{table}.{pk} = \"pks\".{pk}"))
        .collect::<Vec<_>>()
        .join(" AND ");

    let sequence_join = format!(" AND {temp_table}.{seq} >= {table}.{seq}");
    let distinct_order_by = format!(" ORDER BY {pk_temp_select}, {temp_table}.{seq} DESC");

    let (insert_distinct_on, insert_distinct_order_by) = if subkeys.is_empty() {
        (pk_temp_select.clone(), distinct_order_by.clone())
    } else {
        let combined: Vec<String> = key_properties.iter().chain(subkeys.iter()).cloned().collect();
        let combined_select = combined
            .iter()
            .map(|pk| format!("{temp_table}.{}", Ident::new(pk).as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        let order_by = format!(" ORDER BY {combined_select}, {temp_table}.{seq} DESC");
        (combined_select, order_by)
    };

    format!(
        r#"
        WITH "pks" AS (
            SELECT DISTINCT ON ({pk_temp_select}) {pk_temp_select}
            FROM {temp_table}
            JOIN {table} ON {pk_where}{sequence_join}{distinct_order_by}
        )
        DELETE FROM {table} USING "pks" WHERE {cxt_where};
        INSERT INTO {table} (
            SELECT DISTINCT ON ({insert_distinct_on}) {temp_table}.*
            FROM {temp_table}
            LEFT JOIN {table} ON {pk_where}
            WHERE {pk_null}
            {insert_distinct_order_by}
        );
        DROP TABLE {temp_table};
        "#
    )
}
