//! Record normalization and denesting (`spec.md` §4.B).
//!
//! Records are represented directly as `serde_json::Value` / `Map` — a
//! scalar, an object, an array, or null — and denested by pattern-matching
//! that shape rather than reflecting on a concrete Rust type, per the
//! "Dynamic record shape" design note.
//!
//! The recursive descent threads `records_map` explicitly through every
//! call and clones the inherited-PK bag on each descent into a nested
//! list, resolving the source's `denest_subrecord` parameter-threading bug
//! (Open Question (a)): there is no position where `records_map` can be
//! silently dropped, and siblings of the same parent list never share a
//! mutated bag.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::consts::{self, BATCHED_AT, PRIMARY_KEY, RECEIVED_AT, SEPARATOR, SEQUENCE, TABLE_VERSION};

/// An input record message, matching `spec.md` §3's record message shape.
#[derive(Debug, Clone)]
pub struct RecordMessage {
    pub record: Map<String, Value>,
    pub version: Option<i64>,
    pub time_extracted: Option<String>,
    pub sequence: Option<i64>,
}

/// `table_name → denested rows`, in traversal order (depth-first over
/// parents, then list order within each parent). Order matters: it is the
/// tie-break the merge uses when sequence numbers collide.
pub type RecordsMap = BTreeMap<String, Vec<Map<String, Value>>>;

fn current_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Normalize one record message: stamp system columns, generate a UUID
/// primary key if requested, and default `_sdc_sequence` to wall-clock time.
pub fn normalize_record(msg: RecordMessage, use_uuid_pk: bool, batched_at: &str) -> Map<String, Value> {
    let RecordMessage {
        mut record,
        version,
        time_extracted,
        sequence,
    } = msg;

    if let Some(v) = version {
        record.insert(TABLE_VERSION.to_string(), Value::from(v));
    }

    if let Some(extracted) = time_extracted {
        let absent = record.get(RECEIVED_AT).is_none_or(Value::is_null);
        if absent {
            record.insert(RECEIVED_AT.to_string(), Value::String(extracted));
        }
    }

    if use_uuid_pk && record.get(PRIMARY_KEY).is_none_or(Value::is_null) {
        record.insert(PRIMARY_KEY.to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
    }

    record.insert(BATCHED_AT.to_string(), Value::String(batched_at.to_string()));

    let seq = sequence.unwrap_or_else(current_epoch_seconds);
    record.insert(SEQUENCE.to_string(), Value::from(seq));

    record
}

/// Denest `records` into `root_table`'s rows, recursing into synthetic
/// child tables for every nested list, and accumulate the results into
/// `records_map`.
///
/// This is the public entry point; callers always start at `level = -1`
/// with `pk_fks = None`.
pub fn denest_records(
    table_name: &str,
    records: Vec<Map<String, Value>>,
    records_map: &mut RecordsMap,
    key_properties: &[String],
    pk_fks: Option<&Map<String, Value>>,
    level: i32,
) {
    let mut row_index: i64 = 0;
    for record in records {
        let record_pk_fks = match pk_fks {
            Some(parent_bag) => {
                let mut bag = parent_bag.clone();
                bag.insert(consts::level_id_column(level), Value::from(row_index));
                row_index += 1;
                bag
            }
            None => {
                let mut bag = Map::new();
                for key in key_properties {
                    if let Some(value) = record.get(key) {
                        bag.insert(consts::source_key_column(key), value.clone());
                    }
                }
                if let Some(seq) = record.get(SEQUENCE) {
                    bag.insert(SEQUENCE.to_string(), seq.clone());
                }
                bag
            }
        };
        denest_record(table_name, record, records_map, &record_pk_fks, level);
    }
}

/// Denest one record into a single flat row for `table_name`, spawning
/// child tables for any nested lists found directly in its fields or
/// inlined from nested objects.
fn denest_record(
    table_name: &str,
    record: Map<String, Value>,
    records_map: &mut RecordsMap,
    pk_fks: &Map<String, Value>,
    level: i32,
) {
    let mut row = pk_fks.clone();
    flatten_fields(table_name, None, record, &mut row, records_map, pk_fks, level);
    records_map.entry(table_name.to_string()).or_default().push(row);
}

/// Inline a field map's scalar leaves into `row` under `current_path`-
/// prefixed compound names, spawning child tables for any nested lists
/// (directly present, or found while recursing into nested objects).
///
/// A `null` leaf is dropped entirely rather than materializing a column —
/// this applies uniformly at every depth (`spec.md` §4.B / §9's resolution
/// of the null-inside-nested-object case).
fn flatten_fields(
    table_name: &str,
    current_path: Option<&str>,
    fields: Map<String, Value>,
    row: &mut Map<String, Value>,
    records_map: &mut RecordsMap,
    pk_fks: &Map<String, Value>,
    level: i32,
) {
    for (prop, value) in fields {
        let next_path = match current_path {
            Some(parent) => format!("{parent}{SEPARATOR}{prop}"),
            None => prop,
        };
        match value {
            Value::Object(inner) => {
                flatten_fields(table_name, Some(&next_path), inner, row, records_map, pk_fks, level);
            }
            Value::Array(items) => {
                let child_table = format!("{table_name}{SEPARATOR}{next_path}");
                let child_rows = coerce_array_to_rows(items);
                denest_records(&child_table, child_rows, records_map, &[], Some(pk_fks), level + 1);
            }
            Value::Null => {}
            scalar => {
                row.insert(next_path, scalar);
            }
        }
    }
}

/// A nested list's elements are ordinarily objects (Singer schemas model
/// every repeated element as a record); a list of bare scalars is
/// represented as a one-column row under a synthetic `value` field so it
/// still lands somewhere instead of being silently dropped.
fn coerce_array_to_rows(items: Vec<Value>) -> Vec<Map<String, Value>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(m) => m,
            other => {
                let mut m = Map::new();
                m.insert("value".to_string(), other);
                m
            }
        })
        .collect()
}
