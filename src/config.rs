//! Target configuration.
//!
//! Connection establishment, credential handling, and CLI parsing are a
//! host concern (out of scope here), so this is deliberately small: just
//! the handful of knobs the core itself reads.

use postgres::Transaction;
use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_schema() -> String {
    "public".to_string()
}

/// Configuration for one [`crate::Target`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// PostgreSQL schema all tables are created/read/written in.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Optional `statement_timeout` (milliseconds) applied to each
    /// transaction opened by `write_batch` / `activate_version`.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            schema: default_schema(),
            statement_timeout_ms: None,
        }
    }
}

/// Scope `statement_timeout` to `tx` only (`SET LOCAL` resets automatically
/// at commit/rollback, unlike plain `SET`). No-op if unset.
pub(crate) fn apply_statement_timeout(tx: &mut Transaction<'_>, timeout_ms: Option<u64>) -> Result<()> {
    if let Some(ms) = timeout_ms {
        tx.batch_execute(&format!("SET LOCAL statement_timeout = {ms}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_public_schema() {
        let config = TargetConfig::default();
        assert_eq!(config.schema, "public");
        assert_eq!(config.statement_timeout_ms, None);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: TargetConfig = serde_json::from_str(r#"{"statement_timeout_ms": 5000}"#).unwrap();
        assert_eq!(config.schema, "public");
        assert_eq!(config.statement_timeout_ms, Some(5000));
    }
}
