//! Error types for the target-postgres core.
//!
//! All errors that can occur while reconciling schema or writing a batch
//! are represented by [`LoaderError`]. There is no partial-batch success:
//! the orchestrator converts any `Err` into a transaction rollback before
//! propagating it.
//!
//! # Error Classification
//!
//! - **SchemaIncompatible** — the incoming and remote schemas cannot be
//!   reconciled (key columns changed, or a type change collides with both
//!   possible split names). Never retried; the caller must fix the source.
//! - **Database** — any underlying driver/IO failure. The batch rolls back;
//!   a host may reasonably retry the whole batch.
//! - **SidecarParse** — a table's comment exists but is not valid JSON.
//!   Indicates the table's metadata was corrupted outside this core.
//! - **Internal** — an invariant this code relies on did not hold.

/// Primary error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The remote and incoming schemas cannot be reconciled without losing
    /// data or silently changing a key column.
    #[error("schema incompatible for table {table}: {reason}")]
    SchemaIncompatible { table: String, reason: String },

    /// A database/driver error occurred; the enclosing transaction has been
    /// (or will be) rolled back.
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),

    /// A table's comment was present but could not be parsed as the sidecar
    /// metadata JSON schema.
    #[error("sidecar metadata for table {table} is not valid JSON: {source}")]
    SidecarParse {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    /// An invariant this code depends on did not hold. Indicates a bug
    /// rather than bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LoaderError {
    pub fn schema_incompatible(table: impl Into<String>, reason: impl Into<String>) -> Self {
        LoaderError::SchemaIncompatible {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        LoaderError::Internal(reason.into())
    }

    /// Whether a host loop could reasonably retry the batch that produced
    /// this error, unmodified.
    ///
    /// Only [`LoaderError::Database`] is retryable: the other variants are
    /// deterministic given the same input and will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoaderError::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
