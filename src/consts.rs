//! Process-wide naming constants.
//!
//! These are the only pieces of global state in the core: the separator and
//! null sentinel are baked into every denested table/column name and every
//! staged CSV row, so they cannot vary per-connection without breaking
//! already-landed tables.

/// Joins path segments, version suffixes, and type-split suffixes.
///
/// Must not appear in a user field name; if it does, the resulting
/// collision is the caller's responsibility (`spec.md` §6).
pub const SEPARATOR: &str = "__";

/// CSV `NULL` token used by the bulk-copy `COPY ... WITH (NULL '...')` clause.
pub const NULL_SENTINEL: &str = "NULL";

pub const RECEIVED_AT: &str = "_sdc_received_at";
pub const BATCHED_AT: &str = "_sdc_batched_at";
pub const SEQUENCE: &str = "_sdc_sequence";
pub const PRIMARY_KEY: &str = "_sdc_primary_key";
pub const TABLE_VERSION: &str = "_sdc_table_version";
const SOURCE_KEY_PREFIX: &str = "_sdc_source_key_";

/// `_sdc_source_key_<k>` — the inherited parent primary-key column for a
/// given top-level key property `k`.
pub fn source_key_column(key: &str) -> String {
    format!("{SOURCE_KEY_PREFIX}{key}")
}

/// `_sdc_level_<level>_id` — the ordinal of a nested-list row within its
/// parent list, at nesting depth `level` (root's direct children are level 0).
pub fn level_id_column(level: i32) -> String {
    format!("_sdc_level_{level}_id")
}

/// Whether `name` matches the level-index column pattern `_sdc_level_[0-9]+_id`.
///
/// Used by the bulk loader to find the subkey columns that must be folded
/// into the merge's insert-side `DISTINCT ON` so that sibling elements of a
/// nested list (same parent key, different list position) are never
/// collapsed into one row.
pub fn is_level_id_column(name: &str) -> bool {
    const PREFIX: &str = "_sdc_level_";
    const SUFFIX: &str = "_id";
    name.strip_prefix(PREFIX)
        .and_then(|rest| rest.strip_suffix(SUFFIX))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}
