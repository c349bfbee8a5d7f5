//! Remote-schema reader/writer (`spec.md` §4.C).
//!
//! Reads and writes a live table's structure two ways: the catalog
//! (`information_schema.columns`, for the actual column list/types) and
//! the sidecar metadata stored as the table's comment (for
//! `key_properties`, `version`, and column `mappings` — information the
//! catalog alone cannot express). The sidecar is the *only* source of
//! truth for those three keys; ported from `original_source`'s
//! `get_table_schema` / `set_table_metadata` / `get_table_metadata`.

use std::collections::BTreeMap;

use postgres::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LoaderError, Result};
use crate::ident::Ident;

/// A structural column: its SQL type and nullability, as read from the
/// catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub sql_type: String,
    pub nullable: bool,
}

/// A recorded rename from an original column to a type-tagged synthetic
/// column produced by a type split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub from: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

/// The sidecar metadata JSON schema from `spec.md` §6 — the only three
/// keys ever read from or written to a table's comment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SidecarMetadata {
    #[serde(default)]
    key_properties: Vec<String>,
    #[serde(default)]
    version: Option<i64>,
    #[serde(default)]
    mappings: BTreeMap<String, ColumnMapping>,
}

/// The union of a live table's catalog structure and its sidecar metadata.
#[derive(Debug, Clone)]
pub struct RemoteTableSchema {
    pub name: String,
    pub columns: BTreeMap<String, ColumnDef>,
    pub key_properties: Vec<String>,
    pub version: Option<i64>,
    pub mappings: BTreeMap<String, ColumnMapping>,
}

impl RemoteTableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    /// Find an existing mapping whose `from` is `field` and whose key is
    /// `mapped_name`, i.e. `mapping_name(field, schema)` already recorded.
    pub fn has_mapping(&self, mapped_name: &str, field: &str) -> bool {
        self.mappings
            .get(mapped_name)
            .is_some_and(|m| m.from == field)
    }
}

/// Read the union of catalog structure and sidecar metadata for
/// `schema.table`. Returns `Ok(None)` only when both are absent — a table
/// that has never been created.
pub fn get_table_schema(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table: &str,
) -> Result<Option<RemoteTableSchema>> {
    let column_rows = tx.query(
        "SELECT column_name, data_type, is_nullable \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2",
        &[&pg_schema, &table],
    )?;

    let mut columns = BTreeMap::new();
    for row in &column_rows {
        let name: String = row.try_get(0)?;
        let data_type: String = row.try_get(1)?;
        let is_nullable: String = row.try_get(2)?;
        columns.insert(
            name,
            ColumnDef {
                sql_type: data_type,
                nullable: is_nullable == "YES",
            },
        );
    }

    let sidecar = get_sidecar_metadata(tx, pg_schema, table)?;

    if columns.is_empty() && sidecar.is_none() {
        return Ok(None);
    }
    let sidecar = sidecar.unwrap_or_default();

    Ok(Some(RemoteTableSchema {
        name: table.to_string(),
        columns,
        key_properties: sidecar.key_properties,
        version: sidecar.version,
        mappings: sidecar.mappings,
    }))
}

fn get_sidecar_metadata(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table: &str,
) -> Result<Option<SidecarMetadata>> {
    let qualified = format!("{pg_schema}.{table}");
    let row = tx.query_one(
        "SELECT obj_description(to_regclass($1))",
        &[&qualified],
    )?;
    let comment: Option<String> = row.try_get(0)?;

    match comment {
        None => Ok(None),
        Some(json_text) => serde_json::from_str(&json_text)
            .map(Some)
            .map_err(|source| LoaderError::SidecarParse {
                table: table.to_string(),
                source,
            }),
    }
}

/// Overwrite `schema.table`'s sidecar metadata. Only `key_properties`,
/// `version`, and `mappings` are persisted — any other key a caller might
/// pass is dropped by construction (the type doesn't have room for one).
pub fn set_table_metadata(
    tx: &mut Transaction<'_>,
    pg_schema: &str,
    table: &str,
    key_properties: &[String],
    version: Option<i64>,
    mappings: &BTreeMap<String, ColumnMapping>,
) -> Result<()> {
    let sidecar = SidecarMetadata {
        key_properties: key_properties.to_vec(),
        version,
        mappings: mappings.clone(),
    };
    let json_text = serde_json::to_string(&sidecar)
        .map_err(|source| LoaderError::SidecarParse {
            table: table.to_string(),
            source,
        })?;

    let sql = format!(
        "COMMENT ON TABLE {} IS $1",
        Ident::schema_qualified(pg_schema, table)
    );
    tx.execute(&sql, &[&json_text])?;
    Ok(())
}

pub fn is_table_empty(tx: &mut Transaction<'_>, pg_schema: &str, table: &str) -> Result<bool> {
    let sql = format!(
        "SELECT NOT EXISTS (SELECT 1 FROM {})",
        Ident::schema_qualified(pg_schema, table)
    );
    let row = tx.query_one(&sql, &[])?;
    Ok(row.try_get(0)?)
}

/// Not `Value`-based: sidecar JSON can only ever hold these three keys, so
/// there's no need for a general JSON merge here. Exposed for callers that
/// just want to inspect the raw JSON (e.g. diagnostics/tests).
pub fn sidecar_json(schema: &RemoteTableSchema) -> Value {
    serde_json::json!({
        "key_properties": schema.key_properties,
        "version": schema.version,
        "mappings": schema.mappings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_mapping_checks_both_key_and_from() {
        let mut mappings = BTreeMap::new();
        mappings.insert(
            "x__i".to_string(),
            ColumnMapping {
                from: "x".to_string(),
                type_tag: "i".to_string(),
            },
        );
        let schema = RemoteTableSchema {
            name: "t".to_string(),
            columns: BTreeMap::new(),
            key_properties: vec![],
            version: None,
            mappings,
        };
        assert!(schema.has_mapping("x__i", "x"));
        assert!(!schema.has_mapping("x__i", "y"));
        assert!(!schema.has_mapping("missing", "x"));
    }
}
