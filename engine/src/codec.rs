//! Wire codec: native JSON values ⇄ tagged attribute values.
//!
//! The mapping is lossless except for the empty string, which has no wire
//! form: encoding drops it and decoding never produces it. `null` travels as
//! the reserved string [`NULL_SENTINEL`].

use crate::{error::Result, AttributeValue, Document, Error, Item};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashSet};

/// Reserved string standing in for `null` on the wire.
pub const NULL_SENTINEL: &str = "null";

/// Encode a native value.
///
/// Returns `None` for values with no legal wire form: the empty string and
/// empty arrays (empty sets are rejected by the store).
pub fn encode(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::Null => Some(AttributeValue::String(NULL_SENTINEL.to_string())),
        Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
        Value::Number(n) => Some(AttributeValue::Number(n.to_string())),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(AttributeValue::String(s.clone())),
        Value::Array(items) => encode_array(items),
        Value::Object(map) => Some(AttributeValue::Map(encode_map(map))),
    }
}

fn encode_array(items: &[Value]) -> Option<AttributeValue> {
    if items.is_empty() {
        return None;
    }

    // Sets must hold distinct members; anything else stays an ordered list.
    if let Some(strings) = all_strings(items) {
        if is_distinct(strings.iter().copied()) {
            return Some(AttributeValue::StringSet(
                strings.into_iter().map(str::to_string).collect(),
            ));
        }
    } else if let Some(numbers) = all_numbers(items) {
        if numerically_distinct(&numbers) {
            return Some(AttributeValue::NumberSet(
                numbers.iter().map(|n| n.to_string()).collect(),
            ));
        }
    }

    Some(AttributeValue::List(items.iter().filter_map(encode).collect()))
}

fn all_strings(items: &[Value]) -> Option<Vec<&str>> {
    items
        .iter()
        .map(|v| v.as_str().filter(|s| !s.is_empty()))
        .collect()
}

fn all_numbers(items: &[Value]) -> Option<Vec<&Number>> {
    items
        .iter()
        .map(|v| match v {
            Value::Number(n) => Some(n),
            _ => None,
        })
        .collect()
}

fn is_distinct<'a>(mut values: impl Iterator<Item = &'a str>) -> bool {
    let mut seen = HashSet::new();
    values.all(|v| seen.insert(v))
}

/// `1` and `1.0` are the same set member on the wire.
fn numerically_distinct(numbers: &[&Number]) -> bool {
    let mut values: Vec<f64> = numbers.iter().filter_map(|n| n.as_f64()).collect();
    if values.len() != numbers.len() {
        return false;
    }
    values.sort_by(f64::total_cmp);
    values.windows(2).all(|w| w[0] != w[1])
}

fn encode_map(map: &Map<String, Value>) -> BTreeMap<String, AttributeValue> {
    map.iter()
        .filter_map(|(k, v)| encode(v).map(|av| (k.clone(), av)))
        .collect()
}

/// Encode a whole document into a store item, dropping unrepresentable fields.
pub fn encode_document(doc: &Document) -> Item {
    encode_map(doc)
}

/// Decode a wire value back into its native form.
pub fn decode(value: &AttributeValue) -> Result<Value> {
    Ok(match value {
        AttributeValue::String(s) if s == NULL_SENTINEL => Value::Null,
        AttributeValue::String(s) => Value::String(s.clone()),
        AttributeValue::Number(n) => Value::Number(parse_number(n)?),
        AttributeValue::Boolean(b) => Value::Bool(*b),
        AttributeValue::Map(map) => Value::Object(decode_map(map)?),
        AttributeValue::List(items) => {
            Value::Array(items.iter().map(decode).collect::<Result<_>>()?)
        }
        AttributeValue::StringSet(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::NumberSet(items) => Value::Array(
            items
                .iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<_>>()?,
        ),
    })
}

fn decode_map(map: &BTreeMap<String, AttributeValue>) -> Result<Map<String, Value>> {
    map.iter()
        .map(|(k, v)| decode(v).map(|value| (k.clone(), value)))
        .collect()
}

/// Decode a store item into a native document.
pub fn decode_item(item: &Item) -> Result<Document> {
    decode_map(item)
}

/// Parse the store's decimal rendering into a native number.
pub fn parse_number(raw: &str) -> Result<Number> {
    if let Ok(n) = raw.parse::<u64>() {
        return Ok(n.into());
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(n.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| Error::DataFormat(format!("invalid number on the wire: {raw:?}")))
}
