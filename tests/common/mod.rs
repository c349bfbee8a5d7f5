//! Shared integration-test harness: a disposable PostgreSQL 18.1 container
//! with a blocking `postgres::Client` on top of it.
//!
//! The container is started async (Testcontainers' runner), but every
//! operation this crate exposes is synchronous, so tests drive it through
//! `postgres::Client` rather than an async driver.

use std::sync::Once;

use postgres::{Client, NoTls};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Surface this crate's `warn!` calls (stale metadata, reserved-sentinel
/// collisions) on the test output instead of silently dropping them.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

#[allow(dead_code)]
pub struct TestDb {
    pub client: Client,
    _container: ContainerAsync<Postgres>,
}

#[allow(dead_code)]
impl TestDb {
    /// Start a fresh PostgreSQL 18.1 container and open a blocking client.
    pub async fn new() -> Self {
        init_tracing();

        let container = Postgres::default()
            .with_tag("18.1-alpine")
            .start()
            .await
            .expect("failed to start postgres container");

        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("failed to get mapped port");

        let conn_str = format!("host=127.0.0.1 port={port} user=postgres password=postgres dbname=postgres");
        let client = Client::connect(&conn_str, NoTls).expect("failed to connect to test database");

        TestDb {
            client,
            _container: container,
        }
    }

    pub fn count(&mut self, schema: &str, table: &str) -> i64 {
        self.client
            .query_one(&format!("SELECT count(*) FROM \"{schema}\".\"{table}\""), &[])
            .expect("count query failed")
            .get(0)
    }

    pub fn table_exists_has_column(&mut self, schema: &str, table: &str, column: &str) -> bool {
        self.client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2 AND column_name = $3)",
                &[&schema, &table, &column],
            )
            .expect("column existence query failed")
            .get(0)
    }

    pub fn table_exists(&mut self, schema: &str, table: &str) -> bool {
        self.client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_tables WHERE schemaname = $1 AND tablename = $2)",
                &[&schema, &table],
            )
            .expect("existence query failed")
            .get(0)
    }
}
