//! A later record, by `_sdc_sequence`, replaces an earlier one sharing the
//! same primary key.

mod common;

use sdc_target_postgres::buffer::VecBuffer;
use sdc_target_postgres::config::TargetConfig;
use sdc_target_postgres::record::RecordMessage;
use sdc_target_postgres::Target;
use serde_json::json;

fn record(id: i64, name: &str, sequence: i64) -> RecordMessage {
    RecordMessage {
        record: json!({"id": id, "name": name}).as_object().unwrap().clone(),
        version: None,
        time_extracted: None,
        sequence: Some(sequence),
    }
}

#[tokio::test]
async fn newer_sequence_wins_over_older_within_the_same_batch() {
    let mut db = common::TestDb::new().await;
    let target = Target::new(TargetConfig {
        schema: "public".to_string(),
        statement_timeout_ms: None,
    });
    let schema_properties = json!({"id": {"type": "integer"}, "name": {"type": "string"}})
        .as_object()
        .unwrap()
        .clone();

    let mut buffer = VecBuffer::new("accounts", vec!["id".to_string()], schema_properties.clone(), false);
    buffer.push(record(1, "old-name", 1));
    buffer.push(record(1, "new-name", 2));
    target.write_batch(&mut db.client, &mut buffer).unwrap();

    let row = db
        .client
        .query_one("SELECT name FROM public.accounts WHERE id = 1", &[])
        .unwrap();
    let name: String = row.get(0);
    assert_eq!(name, "new-name");
    assert_eq!(db.count("public", "accounts"), 1);

    let mut buffer2 = VecBuffer::new("accounts", vec!["id".to_string()], schema_properties, false);
    buffer2.push(record(1, "later-still", 3));
    target.write_batch(&mut db.client, &mut buffer2).unwrap();

    let row = db
        .client
        .query_one("SELECT name FROM public.accounts WHERE id = 1", &[])
        .unwrap();
    let name: String = row.get(0);
    assert_eq!(name, "later-still");
}
