//! Version activator (`spec.md` §4.G) — atomically swaps a versioned
//! table family over the live names, one table at a time.

use postgres::Client;
use tracing::warn;

use crate::config::{self, TargetConfig};
use crate::consts::SEPARATOR;
use crate::error::Result;
use crate::ident::Ident;
use crate::remote_schema;

/// Promote `version` of `stream` to live. Renames every table discovered
/// under the `<stream>__<version>` prefix (root and nested child tables)
/// over its corresponding live name.
///
/// Each table's rename-drop triplet runs in its own transaction: a crash
/// partway through leaves some tables promoted and others not, and a
/// second call resumes — the remaining source tables are still found by
/// the same `LIKE` scan, and already-promoted ones simply won't match it
/// anymore.
pub fn activate_version(config: &TargetConfig, client: &mut Client, stream: &str, version: i64) -> Result<()> {
    let pg_schema = config.schema.as_str();
    let versioned_root = format!("{stream}{SEPARATOR}{version}");

    let (metadata_present, already_active, discovered) = {
        let mut tx = client.transaction()?;
        config::apply_statement_timeout(&mut tx, config.statement_timeout_ms)?;
        let metadata = remote_schema::get_table_schema(&mut tx, pg_schema, stream)?;
        let metadata_present = metadata.is_some();
        let already_active = metadata.as_ref().and_then(|m| m.version) == Some(version);

        let pattern = format!("{versioned_root}%");
        let rows = tx.query(
            "SELECT tablename FROM pg_tables WHERE schemaname = $1 AND tablename LIKE $2",
            &[&pg_schema, &pattern],
        )?;
        let discovered: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
        tx.commit()?;
        (metadata_present, already_active, discovered)
    };

    if !metadata_present {
        warn!(stream, "table for stream does not exist, cannot activate version");
        return Ok(());
    }
    if already_active {
        warn!(stream, version, "table version already active");
        return Ok(());
    }

    for versioned_table_name in discovered {
        let live_name = live_table_name(stream, &versioned_root, &versioned_table_name);
        let live_old = format!("{live_name}{SEPARATOR}old");

        let mut tx = client.transaction()?;
        config::apply_statement_timeout(&mut tx, config.statement_timeout_ms)?;
        tx.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                Ident::schema_qualified(pg_schema, &live_name),
                Ident::new(&live_old),
            ),
            &[],
        )?;
        tx.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                Ident::schema_qualified(pg_schema, &versioned_table_name),
                Ident::new(&live_name),
            ),
            &[],
        )?;
        tx.execute(&format!("DROP TABLE {}", Ident::schema_qualified(pg_schema, &live_old)), &[])?;
        tx.commit()?;
    }

    Ok(())
}

/// Replace the `<stream>__<version>` prefix of a discovered table name
/// with `<stream>`, e.g. `orders__7__items` -> `orders__items`.
fn live_table_name(stream: &str, versioned_root: &str, versioned_table_name: &str) -> String {
    format!("{stream}{}", &versioned_table_name[versioned_root.len()..])
}
