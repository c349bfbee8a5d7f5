//! Schema reconciliation (`spec.md` §4.D).
//!
//! Merges an incoming stream's JSON-schema properties into a live table's
//! structural schema, dispatching each property through the six cases
//! ported from `original_source`'s `merge_put_schemas`: already-mapped,
//! new, widen-to-nullable, compatible, type-split, and conflict.

use std::collections::BTreeMap;

use postgres::Transaction;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{LoaderError, Result};
use crate::ident::Ident;
use crate::remote_schema::{self, ColumnDef, ColumnMapping, RemoteTableSchema};
use crate::schema;

fn mapping_name(field: &str, column_schema: &Value) -> String {
    format!("{field}{}{}", crate::consts::SEPARATOR, schema::sql_shorthand(column_schema))
}

/// Merge `incoming_properties` into `remote`, issuing whatever DDL and
/// mapping updates are needed, and leaving `remote` up to date in memory.
pub fn reconcile_schema(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table_name: &str,
    remote: &mut RemoteTableSchema,
    incoming_properties: &Map<String, Value>,
) -> Result<()> {
    let mut properties: BTreeMap<String, Value> = remote
        .columns
        .iter()
        .map(|(name, col)| (name.clone(), schema::from_sql(&col.sql_type, col.nullable)))
        .collect();

    let table_empty = remote_schema::is_table_empty(tx, pg_schema, table_name)?;

    for (name, incoming_schema) in incoming_properties {
        reconcile_column(
            tx,
            pg_schema,
            table_name,
            remote,
            &mut properties,
            table_empty,
            name,
            incoming_schema,
        )?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn reconcile_column(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table_name: &str,
    remote: &mut RemoteTableSchema,
    properties: &mut BTreeMap<String, Value>,
    table_empty: bool,
    name: &str,
    incoming_schema: &Value,
) -> Result<()> {
    let typed_field = mapping_name(name, incoming_schema);
    if remote.has_mapping(&typed_field, name) {
        return Ok(());
    }

    let Some(existing) = properties.get(name).cloned() else {
        properties.insert(name.to_string(), incoming_schema.clone());
        add_column(tx, pg_schema, table_name, remote, name, incoming_schema, table_empty)?;
        return Ok(());
    };

    let existing_nullable_type = schema::get_type(&schema::make_nullable(&existing));
    if !schema::is_nullable(&existing) && schema::get_type(incoming_schema) == existing_nullable_type {
        let widened = schema::make_nullable(&existing);
        properties.insert(name.to_string(), widened);
        make_column_nullable(tx, pg_schema, table_name, name)?;
        if let Some(col) = remote.columns.get_mut(name) {
            col.nullable = true;
        }
        return Ok(());
    }

    if schema::to_sql(&schema::make_nullable(incoming_schema)) == schema::to_sql(&schema::make_nullable(&existing)) {
        return Ok(());
    }

    let existing_mapping = mapping_name(name, &existing);
    let new_mapping = mapping_name(name, incoming_schema);
    if !properties.contains_key(&existing_mapping) && !properties.contains_key(&new_mapping) {
        return split_column(tx, pg_schema, table_name, remote, properties, name, incoming_schema, &existing);
    }

    Err(LoaderError::schema_incompatible(
        table_name,
        format!(
            "cannot change type of column `{name}`: split target `{new_mapping}` already names an existing column"
        ),
    ))
}

fn add_column(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table_name: &str,
    remote: &mut RemoteTableSchema,
    column_name: &str,
    column_schema: &Value,
    table_empty: bool,
) -> Result<()> {
    let mut effective_schema = column_schema.clone();
    if !schema::is_nullable(column_schema) && !table_empty {
        warn!(
            schema = pg_schema,
            table = table_name,
            column = column_name,
            "forcing new column to be nullable: table is not empty"
        );
        effective_schema = schema::make_nullable(column_schema);
    }
    let data_type = schema::to_sql(&effective_schema);

    let sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {data_type}",
        Ident::schema_qualified(pg_schema, table_name),
        Ident::new(column_name),
    );
    tx.execute(&sql, &[])?;

    remote.columns.insert(
        column_name.to_string(),
        ColumnDef {
            sql_type: schema::catalog_type_name(&effective_schema),
            nullable: schema::is_nullable(&effective_schema),
        },
    );
    Ok(())
}

fn make_column_nullable(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table_name: &str,
    column_name: &str,
) -> Result<()> {
    let sql = format!(
        "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
        Ident::schema_qualified(pg_schema, table_name),
        Ident::new(column_name),
    );
    tx.execute(&sql, &[])?;
    Ok(())
}

fn migrate_column(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table_name: &str,
    column_name: &str,
    mapped_name: &str,
) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET {} = {}",
        Ident::schema_qualified(pg_schema, table_name),
        Ident::new(mapped_name),
        Ident::new(column_name),
    );
    tx.execute(&sql, &[])?;
    Ok(())
}

fn drop_column(tx: &mut Transaction<'_>, pg_schema: &str, table_name: &str, column_name: &str) -> Result<()> {
    let sql = format!(
        "ALTER TABLE {} DROP COLUMN {}",
        Ident::schema_qualified(pg_schema, table_name),
        Ident::new(column_name),
    );
    tx.execute(&sql, &[])?;
    Ok(())
}

fn add_column_mapping(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table_name: &str,
    remote: &mut RemoteTableSchema,
    column_name: &str,
    mapped_name: &str,
    mapped_schema: &Value,
) -> Result<()> {
    remote.mappings.insert(
        mapped_name.to_string(),
        ColumnMapping {
            from: column_name.to_string(),
            type_tag: schema::sql_shorthand(mapped_schema),
        },
    );
    remote_schema::set_table_metadata(
        tx,
        pg_schema,
        table_name,
        &remote.key_properties,
        remote.version,
        &remote.mappings,
    )
}

/// Split `column_name` into two new, permanently-nullable columns tagged
/// by type: the data already on disk moves to `<column>__<old-type>` and
/// the incoming type lands in `<column>__<new-type>`.
#[allow(clippy::too_many_arguments)]
fn split_column(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table_name: &str,
    remote: &mut RemoteTableSchema,
    properties: &mut BTreeMap<String, Value>,
    column_name: &str,
    column_schema: &Value,
    existing_schema: &Value,
) -> Result<()> {
    let existing_mapping = mapping_name(column_name, existing_schema);
    let new_mapping = mapping_name(column_name, column_schema);

    let existing_nullable = schema::make_nullable(existing_schema);
    let new_nullable = schema::make_nullable(column_schema);

    properties.insert(existing_mapping.clone(), existing_nullable.clone());
    properties.insert(new_mapping.clone(), new_nullable.clone());

    add_column_mapping(tx, pg_schema, table_name, remote, column_name, &existing_mapping, &existing_nullable)?;
    add_column_mapping(tx, pg_schema, table_name, remote, column_name, &new_mapping, &new_nullable)?;

    add_column(tx, pg_schema, table_name, remote, &existing_mapping, &existing_nullable, true)?;
    add_column(tx, pg_schema, table_name, remote, &new_mapping, &new_nullable, true)?;

    migrate_column(tx, pg_schema, table_name, column_name, &existing_mapping)?;
    drop_column(tx, pg_schema, table_name, column_name)?;

    properties.remove(column_name);
    remote.columns.remove(column_name);
    Ok(())
}
