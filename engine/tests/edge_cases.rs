//! Edge case tests for dynadoc-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use dynadoc_engine::codec::{decode, decode_item, encode, encode_document, NULL_SENTINEL};
use dynadoc_engine::query::UpdateParts;
use dynadoc_engine::{
    AttributeValue, Document, Error, ErrorKind, FieldSpec, PointLookup, Projection, QueryBuilder,
    Schema, WriteKind, BATCH_LIMIT,
};
use serde_json::{json, Value};

fn create_test_schema() -> Schema {
    Schema::new([
        ("name", FieldSpec::string().required()),
        ("count", FieldSpec::number().default(5)),
        ("data", FieldSpec::map()),
        ("owner", FieldSpec::string().default(Value::Null)),
    ])
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn empty_string_never_reaches_the_wire() {
    assert_eq!(encode(&json!("")), None);

    let validated = create_test_schema()
        .validate(doc(json!({"_id": "a", "name": "A", "data": {"note": ""}})))
        .unwrap();
    let item = encode_document(&validated);
    assert_eq!(item["data"], AttributeValue::Map(Default::default()));
}

#[test]
fn empty_required_string_is_missing() {
    let err = create_test_schema()
        .validate(doc(json!({"name": ""})))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataFormat);
    assert_eq!(err.path(), Some("name"));
}

#[test]
fn unicode_strings() {
    let names = vec![
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];

    for name in names {
        let encoded = encode(&json!(name)).unwrap();
        assert_eq!(decode(&encoded).unwrap(), json!(name), "Failed for: {}", name);
    }
}

#[test]
fn sentinel_string_round_trips_to_null() {
    let encoded = encode(&Value::Null).unwrap();
    assert_eq!(encoded, AttributeValue::String(NULL_SENTINEL.into()));
    assert_eq!(decode(&encoded).unwrap(), Value::Null);
}

#[test]
fn sentinel_string_rejected_on_null_default_field() {
    let err = create_test_schema()
        .validate(doc(json!({"name": "A", "owner": "null"})))
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref path, .. } if path == "owner"));
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn extreme_numbers() {
    for value in [json!(i64::MIN), json!(u64::MAX), json!(0), json!(1.0e-10), json!(-2.5e300)] {
        let encoded = encode(&value).unwrap();
        assert_eq!(decode(&encoded).unwrap(), value, "Failed for: {}", value);
    }
}

// ============================================================================
// Nesting Edge Cases
// ============================================================================

#[test]
fn deeply_nested_maps_and_lists() {
    let mut value = json!({"leaf": [1, "two", null, true]});
    for i in 0..20 {
        let mut level = Document::new();
        level.insert(format!("level{}", i), value);
        level.insert("list".to_string(), json!([i, "x"]));
        value = Value::Object(level);
    }
    let encoded = encode(&value).unwrap();
    assert_eq!(decode(&encoded).unwrap(), value);
}

#[test]
fn item_round_trip_preserves_every_field() {
    let original = doc(json!({
        "_id": "x",
        "name": "Widget",
        "tags": ["a", "b"],
        "scores": [3, 1, 2],
        "nested": {"a": {"b": {"c": null}}}
    }));
    let decoded = decode_item(&encode_document(&original)).unwrap();
    assert_eq!(decoded, original);
}

// ============================================================================
// Query Edge Cases
// ============================================================================

#[test]
fn reserved_words_are_always_aliased() {
    let schema = Schema::new([
        ("name", FieldSpec::string()),
        ("size", FieldSpec::number()),
        ("status", FieldSpec::string()),
    ]);
    let mut query = QueryBuilder::new("items", &schema);
    let input = query
        .scan(&doc(json!({"size": 1, "status": "open", "name": "n"})))
        .unwrap();
    let expression = input.filter_expression.unwrap();
    assert_eq!(expression, "#size = :v0 AND #status = :v1 AND #name = :v2");
    assert!(input
        .expression_attribute_names
        .keys()
        .all(|alias| alias.starts_with('#')));
}

#[test]
fn point_lookup_requires_id_only() {
    assert!(PointLookup::from_filter(&doc(json!({"_id": "a"}))).is_some());
    assert!(PointLookup::from_filter(&doc(json!({"name": "a"}))).is_none());
    assert!(PointLookup::from_filter(&doc(json!({"_id": 5}))).is_none());
    assert!(PointLookup::from_filter(&doc(json!({"_id": {"$in": ["a", 1]}}))).is_none());
}

#[test]
fn batch_boundaries() {
    let schema = create_test_schema();
    let query = QueryBuilder::new("items", &schema);

    for n in [0, 1, BATCH_LIMIT - 1, BATCH_LIMIT, BATCH_LIMIT + 1, 3 * BATCH_LIMIT] {
        let docs: Vec<Document> = (0..n)
            .map(|i| doc(json!({"_id": format!("d{}", i), "name": "n"})))
            .collect();
        let requests = query.batch_write(&docs, WriteKind::Put).unwrap();
        assert_eq!(requests.len(), n.div_ceil(BATCH_LIMIT), "n = {}", n);
        let total: usize = requests.iter().map(|r| r.request_items["items"].len()).sum();
        assert_eq!(total, n);
    }
}

#[test]
fn update_with_only_id_is_empty() {
    let schema = create_test_schema();
    let parts = UpdateParts::parse(&doc(json!({"_id": "a", "$set": {"_id": "b"}}))).unwrap();
    assert!(parts.is_empty());
    let mut query = QueryBuilder::new("items", &schema);
    assert_eq!(query.update_item("a", &parts).update_expression, "");
}

#[test]
fn empty_in_matches_nothing() {
    let schema = create_test_schema();
    let mut query = QueryBuilder::new("items", &schema);
    let input = query.scan(&doc(json!({"name": {"$in": []}}))).unwrap();
    assert_eq!(
        input.filter_expression.as_deref(),
        Some("attribute_not_exists(#id)")
    );
}

// ============================================================================
// Projection Edge Cases
// ============================================================================

#[test]
fn projection_of_missing_fields() {
    let projected = Projection::parse("missing other").apply(doc(json!({"_id": "a", "x": 1})));
    assert_eq!(Value::Object(projected), json!({"_id": "a"}));

    let projected = Projection::parse("   ").apply(doc(json!({"_id": "a", "x": 1})));
    assert_eq!(Value::Object(projected), json!({"_id": "a", "x": 1}));
}
