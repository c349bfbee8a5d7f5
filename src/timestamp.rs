//! PostgreSQL-compatible timestamp formatting (`spec.md` §4.B/§6).
//!
//! `_sdc_received_at` / `_sdc_batched_at` and any `date-time`-formatted
//! field are normalized to `YYYY-MM-DD HH:mm:ss.SSSSZZ` (four fractional
//! digits, colon-less UTC offset) before they're written — matching what
//! `original_source` produced via `arrow.format('YYYY-MM-DD HH:mm:ss.SSSSZZ')`.

use chrono::{DateTime, Utc};
use serde_json::Value;

const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.4f%z";

/// The current instant, formatted for a `_sdc_batched_at` stamp.
pub fn now() -> String {
    Utc::now().format(FORMAT).to_string()
}

/// Reformat a `date-time`-schema value to the PostgreSQL-compatible form.
/// Returns `None` (leaving the caller's original value untouched) if it
/// isn't a parseable RFC 3339 string.
pub fn format_any(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    let parsed = DateTime::parse_from_rfc3339(text).ok()?;
    Some(parsed.format(FORMAT).to_string())
}
