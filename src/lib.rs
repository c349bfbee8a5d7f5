//! sdc_target_postgres — the schema-reconciling, version-aware upsert
//! core of a streaming record loader.
//!
//! Consumes already-denested-or-not record messages through a
//! [`buffer::StreamBuffer`], reconciles each stream's structural schema
//! against the live PostgreSQL catalog, and lands rows via a staged
//! bulk-copy merge. Connection establishment, credential handling, wire
//! framing, and CLI plumbing are the host's concern; this crate starts at
//! "I have a `postgres::Client` and a batch of records."
//!
//! See [`Target::write_batch`] and [`Target::activate_version`] for the
//! two operations this crate surfaces.

#![allow(dead_code)]

pub mod activator;
pub mod buffer;
pub mod bulk_loader;
pub mod config;
pub mod consts;
pub mod error;
pub mod ident;
pub mod orchestrator;
pub mod reconcile;
pub mod record;
pub mod remote_schema;
pub mod schema;
pub mod timestamp;

pub use buffer::StreamBuffer;
pub use config::TargetConfig;
pub use error::{LoaderError, Result};
pub use record::RecordMessage;

use postgres::Client;

/// A handle bound to one PostgreSQL schema, surfacing the two operations
/// a host drives this core with.
#[derive(Debug, Clone)]
pub struct Target {
    config: TargetConfig,
}

impl Target {
    pub fn new(config: TargetConfig) -> Self {
        Target { config }
    }

    pub fn schema(&self) -> &str {
        &self.config.schema
    }

    /// Write one batch from `buffer` to this target's schema, inside a
    /// single transaction. No-op if the buffer is empty. On error, the
    /// transaction rolls back and `buffer` is left unflushed so the same
    /// messages can be retried.
    pub fn write_batch(&self, client: &mut Client, buffer: &mut dyn StreamBuffer) -> Result<()> {
        orchestrator::write_batch(&self.config, client, buffer)
    }

    /// Promote `version` of `stream` to live, per-table, atomically.
    pub fn activate_version(&self, client: &mut Client, stream: &str, version: i64) -> Result<()> {
        activator::activate_version(&self.config, client, stream, version)
    }
}
