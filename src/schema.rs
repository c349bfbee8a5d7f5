//! JSON-schema-fragment helpers.
//!
//! This stands in for the pure "schema helper" module referenced as an
//! external collaborator in `spec.md` §6 (`to_sql`, `from_sql`, `get_type`,
//! `is_nullable`, `make_nullable`, `sql_shorthand`). A schema fragment is a
//! `serde_json::Value` of the shape `{"type": "integer"}`,
//! `{"type": ["string", "null"]}`, or `{"type": "string", "format":
//! "date-time"}`, optionally carrying a `"default"` key.

use serde_json::{Value, json};

/// The underlying SQL-relevant type of a schema fragment, ignoring
/// nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Number,
    Boolean,
    DateTime,
    String,
    Object,
    Array,
}

impl SqlType {
    /// Single-letter (or short) mnemonic used to build type-split column
    /// suffixes, e.g. `x__i` / `x__s`.
    fn shorthand(self) -> &'static str {
        match self {
            SqlType::Integer => "i",
            SqlType::Number => "f",
            SqlType::Boolean => "b",
            SqlType::DateTime => "t",
            SqlType::String => "s",
            SqlType::Object => "j",
            SqlType::Array => "a",
        }
    }

    fn sql_name(self) -> &'static str {
        match self {
            SqlType::Integer => "bigint",
            SqlType::Number => "double precision",
            SqlType::Boolean => "boolean",
            SqlType::DateTime => "timestamp with time zone",
            SqlType::String => "text",
            SqlType::Object => "jsonb",
            SqlType::Array => "jsonb",
        }
    }
}

/// The raw `"type"` value(s) of a schema fragment, e.g. `["string", "null"]`.
fn type_tokens(schema: &Value) -> Vec<String> {
    match schema.get("type") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

/// The primary (non-null) SQL type named by a schema fragment.
///
/// Falls back to [`SqlType::String`] for an absent or unrecognized `"type"`
/// so every call site gets a total function.
pub fn get_type(schema: &Value) -> SqlType {
    let is_date_time = schema.get("format").and_then(Value::as_str) == Some("date-time");
    for token in type_tokens(schema) {
        match token.as_str() {
            "null" => continue,
            "integer" => return SqlType::Integer,
            "number" => return SqlType::Number,
            "boolean" => return SqlType::Boolean,
            "string" if is_date_time => return SqlType::DateTime,
            "string" => return SqlType::String,
            "object" => return SqlType::Object,
            "array" => return SqlType::Array,
            _ => return SqlType::String,
        }
    }
    SqlType::String
}

/// Whether a schema fragment's `"type"` includes `"null"`.
pub fn is_nullable(schema: &Value) -> bool {
    type_tokens(schema).iter().any(|t| t == "null")
}

/// Returns a copy of `schema` with `"null"` added to its `"type"`, if it
/// isn't already present. Idempotent.
pub fn make_nullable(schema: &Value) -> Value {
    if is_nullable(schema) {
        return schema.clone();
    }
    let mut tokens = type_tokens(schema);
    if tokens.is_empty() {
        tokens.push("string".to_string());
    }
    tokens.push("null".to_string());

    let mut out = schema.clone();
    let obj = out.as_object_mut().expect("schema fragment is an object");
    obj.insert("type".to_string(), json!(tokens));
    out
}

/// The PostgreSQL column type for a schema fragment, including a trailing
/// `NOT NULL` when the fragment is not nullable.
///
/// Two fragments that only differ in nullability produce the same base
/// type name — callers compare `to_sql(make_nullable(a)) ==
/// to_sql(make_nullable(b))` to check type-compatibility ignoring
/// nullability, as `spec.md` §4.D's "compatible" case requires.
pub fn to_sql(schema: &Value) -> String {
    let base = get_type(schema).sql_name();
    if is_nullable(schema) {
        base.to_string()
    } else {
        format!("{base} NOT NULL")
    }
}

/// The catalog `data_type` name a column holding this schema would report
/// back through `information_schema.columns` — the inverse of the type
/// half of [`from_sql`], used to keep an in-memory [`RemoteTableSchema`]
/// (`crate::remote_schema`) in sync with DDL issued against it without a
/// round-trip through the catalog.
pub fn catalog_type_name(schema: &Value) -> String {
    get_type(schema).sql_name().to_string()
}

/// Reconstruct a schema fragment from an introspected PostgreSQL catalog
/// type name and nullability (the inverse direction of [`to_sql`], used
/// when reading the remote structural schema back from
/// `information_schema.columns`).
pub fn from_sql(pg_type: &str, nullable: bool) -> Value {
    let ty = match pg_type {
        "bigint" | "integer" | "smallint" | "numeric" => "integer",
        "double precision" | "real" => "number",
        "boolean" => "boolean",
        "timestamp with time zone" | "timestamp without time zone" => {
            return date_time_schema(nullable);
        }
        "text" | "character varying" | "character" => "string",
        "jsonb" | "json" => "object",
        _ => "string",
    };
    let mut tokens = vec![ty.to_string()];
    if nullable {
        tokens.push("null".to_string());
    }
    json!({ "type": tokens })
}

fn date_time_schema(nullable: bool) -> Value {
    let mut tokens = vec!["string".to_string()];
    if nullable {
        tokens.push("null".to_string());
    }
    json!({ "type": tokens, "format": "date-time" })
}

/// Short, stable, effectively-injective mnemonic for a schema fragment's
/// type, used to build type-split column names (`<col>__<shorthand>`).
///
/// Falls back to an 8-hex-digit `xxh64` digest of the canonicalized schema
/// for anything [`get_type`] can't name distinctly, so the function never
/// needs to be kept in lockstep with every exotic schema shape.
pub fn sql_shorthand(schema: &Value) -> String {
    let ty = get_type(schema);
    if matches!(ty, SqlType::Object | SqlType::Array) {
        format!("{}{:08x}", ty.shorthand(), canonical_hash(schema) as u32)
    } else {
        ty.shorthand().to_string()
    }
}

fn canonical_hash(schema: &Value) -> u64 {
    // BTreeMap gives a stable key order regardless of the source object's
    // insertion order, so two schemas differing only in key order hash equal.
    let canonical: std::collections::BTreeMap<&str, &Value> = schema
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.as_str(), v)).collect())
        .unwrap_or_default();
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    xxhash_rust::xxh64::xxh64(&bytes, 0x517cc1b727220a95)
}
