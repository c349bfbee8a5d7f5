//! A column declared required in the first batch is forced nullable once a
//! later batch's schema says it may be absent, instead of rejecting the
//! stream outright.

mod common;

use sdc_target_postgres::buffer::VecBuffer;
use sdc_target_postgres::config::TargetConfig;
use sdc_target_postgres::record::RecordMessage;
use sdc_target_postgres::Target;
use serde_json::json;

#[tokio::test]
async fn a_required_column_widens_to_nullable_instead_of_rejecting_the_batch() {
    let mut db = common::TestDb::new().await;
    let target = Target::new(TargetConfig {
        schema: "public".to_string(),
        statement_timeout_ms: None,
    });

    let required_schema = json!({"id": {"type": "integer"}, "name": {"type": "string"}})
        .as_object()
        .unwrap()
        .clone();
    let mut first = VecBuffer::new("people", vec!["id".to_string()], required_schema, false);
    first.push(RecordMessage {
        record: json!({"id": 1, "name": "ada"}).as_object().unwrap().clone(),
        version: None,
        time_extracted: None,
        sequence: Some(1),
    });
    target.write_batch(&mut db.client, &mut first).unwrap();

    let nullable_schema = json!({"id": {"type": "integer"}, "name": {"type": ["string", "null"]}})
        .as_object()
        .unwrap()
        .clone();
    let mut second = VecBuffer::new("people", vec!["id".to_string()], nullable_schema, false);
    second.push(RecordMessage {
        record: json!({"id": 2}).as_object().unwrap().clone(),
        version: None,
        time_extracted: None,
        sequence: Some(2),
    });
    target.write_batch(&mut db.client, &mut second).unwrap();

    assert_eq!(db.count("public", "people"), 2);

    let row = db
        .client
        .query_one("SELECT is_nullable FROM information_schema.columns WHERE table_name = 'people' AND column_name = 'name'", &[])
        .unwrap();
    let is_nullable: String = row.get(0);
    assert_eq!(is_nullable, "YES");
}
