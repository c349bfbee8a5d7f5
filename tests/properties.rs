//! Property-based tests for the pure schema and denesting helpers.
//!
//! These cover invariants that a handful of hand-picked unit tests can only
//! sample: the denesting round-trip, the `sql_shorthand`/`to_sql`/`from_sql`
//! conversions, and nullable-widen monotonicity.

use proptest::prelude::*;
use sdc_target_postgres::record::{RecordsMap, denest_records};
use sdc_target_postgres::schema::{
    SqlType, catalog_type_name, from_sql, get_type, is_nullable, make_nullable, sql_shorthand, to_sql,
};
use serde_json::{Map, Value, json};

fn arb_scalar_type() -> impl Strategy<Value = SqlType> {
    prop_oneof![
        Just(SqlType::Integer),
        Just(SqlType::Number),
        Just(SqlType::Boolean),
        Just(SqlType::DateTime),
        Just(SqlType::String),
    ]
}

fn schema_fragment(ty: SqlType, nullable: bool) -> Value {
    let base = match ty {
        SqlType::Integer => "integer",
        SqlType::Number => "number",
        SqlType::Boolean => "boolean",
        SqlType::DateTime | SqlType::String => "string",
        SqlType::Object => "object",
        SqlType::Array => "array",
    };
    let tokens: Vec<&str> = if nullable { vec![base, "null"] } else { vec![base] };
    if ty == SqlType::DateTime {
        json!({"type": tokens, "format": "date-time"})
    } else {
        json!({"type": tokens})
    }
}

proptest! {
    // ── sql_shorthand / to_sql / from_sql roundtrips ───────────────

    #[test]
    fn prop_get_type_roundtrips_through_from_sql(ty in arb_scalar_type(), nullable in any::<bool>()) {
        let fragment = schema_fragment(ty, nullable);
        let catalog_name = catalog_type_name(&fragment);
        let reconstructed = from_sql(&catalog_name, nullable);
        prop_assert_eq!(get_type(&reconstructed), ty);
        prop_assert_eq!(is_nullable(&reconstructed), nullable);
    }

    #[test]
    fn prop_to_sql_nullable_equality_is_type_only(ty in arb_scalar_type(), a_nullable in any::<bool>(), b_nullable in any::<bool>()) {
        let a = schema_fragment(ty, a_nullable);
        let b = schema_fragment(ty, b_nullable);
        // `spec.md`'s "compatible" merge case: two fragments that only differ
        // in nullability must compare type-equal once both are widened.
        prop_assert_eq!(to_sql(&make_nullable(&a)), to_sql(&make_nullable(&b)));
    }

    #[test]
    fn prop_sql_shorthand_is_stable_under_nullability(ty in arb_scalar_type(), nullable in any::<bool>()) {
        let required = schema_fragment(ty, false);
        let fragment = schema_fragment(ty, nullable);
        prop_assert_eq!(sql_shorthand(&fragment), sql_shorthand(&required));
    }

    #[test]
    fn prop_sql_shorthand_distinguishes_scalar_types(a in arb_scalar_type(), b in arb_scalar_type()) {
        if a != b {
            let shorthand_a = sql_shorthand(&schema_fragment(a, false));
            let shorthand_b = sql_shorthand(&schema_fragment(b, false));
            prop_assert_ne!(shorthand_a, shorthand_b);
        }
    }

    // ── nullable-widen monotonicity ─────────────────────────────────

    #[test]
    fn prop_make_nullable_is_monotonic(ty in arb_scalar_type(), nullable in any::<bool>()) {
        let fragment = schema_fragment(ty, nullable);
        let widened = make_nullable(&fragment);
        // Widening never removes nullability, and is idempotent once applied.
        prop_assert!(is_nullable(&widened));
        prop_assert_eq!(make_nullable(&widened), widened);
    }

    #[test]
    fn prop_make_nullable_preserves_base_type(ty in arb_scalar_type(), nullable in any::<bool>()) {
        let fragment = schema_fragment(ty, nullable);
        prop_assert_eq!(get_type(&make_nullable(&fragment)), ty);
    }

    // ── denesting round-trip ─────────────────────────────────────────

    #[test]
    fn prop_flat_scalar_fields_all_land_in_the_root_row(
        ints in prop::collection::vec((("[a-z]{1,8}"), any::<i64>()), 0..6),
    ) {
        let mut record = Map::new();
        for (key, value) in &ints {
            record.insert(key.clone(), Value::from(*value));
        }
        // Later duplicate keys in the generated vec simply overwrite earlier
        // ones in the source map itself, same as any JSON object would.
        let expected: Map<String, Value> = record.clone();

        let mut map = RecordsMap::new();
        denest_records("s", vec![record], &mut map, &[], None, -1);

        prop_assert_eq!(map.len(), 1);
        let row = &map["s"][0];
        for (key, value) in &expected {
            prop_assert_eq!(row.get(key), Some(value));
        }
    }

    #[test]
    fn prop_nested_list_round_trips_every_element_in_order(
        values in prop::collection::vec("[a-z]{1,8}", 0..6),
    ) {
        let items: Vec<Value> = values.iter().map(|v| json!({"v": v})).collect();
        let mut record = Map::new();
        record.insert("id".to_string(), Value::from(1));
        record.insert("items".to_string(), Value::Array(items));

        let mut map = RecordsMap::new();
        denest_records("s", vec![record], &mut map, &["id".to_string()], None, -1);

        let rows = map.get("s__items").cloned().unwrap_or_default();
        prop_assert_eq!(rows.len(), values.len());
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(rows[i].get("v"), Some(&Value::String(value.clone())));
            prop_assert_eq!(rows[i].get("_sdc_level_0_id"), Some(&Value::from(i as i64)));
        }
    }

    #[test]
    fn prop_null_leaves_never_materialize_a_column(
        key in "[a-z]{1,8}",
        other_key in "[a-z]{1,8}",
        other_value in any::<i64>(),
    ) {
        let mut record = Map::new();
        record.insert(key.clone(), Value::Null);
        if other_key != key {
            record.insert(other_key.clone(), Value::from(other_value));
        }

        let mut map = RecordsMap::new();
        denest_records("s", vec![record], &mut map, &[], None, -1);

        let row = &map["s"][0];
        prop_assert_eq!(row.get(&key), None);
    }
}
