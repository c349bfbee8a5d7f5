//! A record with an older `_sdc_sequence` never overwrites an already-landed
//! newer row for the same key.

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
async fn an_older_sequence_arriving_later_does_not_overwrite_the_landed_row() {
    let mut db = common::TestDb::new().await;
    let target = Target::new(TargetConfig {
        schema: "public".to_string(),
        statement_timeout_ms: None,
    });
    let schema_properties = json!({"id": {"type": "integer"}, "name": {"type": "string"}})
        .as_object()
        .unwrap()
        .clone();

    let mut first = VecBuffer::new("widgets", vec!["id".to_string()], schema_properties.clone(), false);
    first.push(record(1, "current", 10));
    target.write_batch(&mut db.client, &mut first).unwrap();

    let mut stale = VecBuffer::new("widgets", vec!["id".to_string()], schema_properties, false);
    stale.push(record(1, "stale", 5));
    target.write_batch(&mut db.client, &mut stale).unwrap();

    let row = db
        .client
        .query_one("SELECT name FROM public.widgets WHERE id = 1", &[])
        .unwrap();
    let name: String = row.get(0);
    assert_eq!(name, "current");
    assert_eq!(db.count("public", "widgets"), 1);
}
