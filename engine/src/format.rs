//! Document formatting: read-time decoding, projection and ordering.

use crate::codec::decode_item;
use crate::{error::Result, Document, Error, Item, Schema, ID_FIELD};
use serde_json::Value;
use std::cmp::Ordering;

/// Field selection applied to documents after they are read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// Keep only these paths (and `_id`)
    Include(Vec<String>),
    /// Drop these paths
    Exclude(Vec<String>),
}

impl Projection {
    /// Parse a space-separated field list.
    ///
    /// A list where every token starts with `-` excludes those fields; any
    /// other list is an inclusion of its unprefixed tokens.
    pub fn parse(spec: &str) -> Self {
        let tokens: Vec<&str> = spec.split_whitespace().collect();
        if tokens.is_empty() {
            return Projection::All;
        }
        if tokens.iter().all(|t| t.starts_with('-')) {
            Projection::Exclude(tokens.iter().map(|t| t[1..].to_string()).collect())
        } else {
            Projection::Include(
                tokens
                    .iter()
                    .filter(|t| !t.starts_with('-'))
                    .map(|t| t.to_string())
                    .collect(),
            )
        }
    }

    /// Accept a field-list string or an object such as `{x: 1}` / `{y: 0}`.
    pub fn from_value(spec: &Value) -> Result<Self> {
        match spec {
            Value::Null => Ok(Projection::All),
            Value::String(s) => Ok(Self::parse(s)),
            Value::Object(fields) => {
                let mut include = Vec::new();
                let mut exclude = Vec::new();
                for (field, flag) in fields {
                    let keep = match flag {
                        Value::Bool(b) => *b,
                        Value::Number(n) => n.as_f64() != Some(0.0),
                        other => {
                            return Err(Error::DataFormat(format!(
                                "invalid projection flag {other} for '{field}'"
                            )))
                        }
                    };
                    if keep {
                        include.push(field.clone());
                    } else {
                        exclude.push(field.clone());
                    }
                }
                match (include.is_empty(), exclude.is_empty()) {
                    (true, true) => Ok(Projection::All),
                    (false, true) => Ok(Projection::Include(include)),
                    (true, false) => Ok(Projection::Exclude(exclude)),
                    // Only `_id` may be excluded from an inclusion.
                    (false, false) if exclude == [ID_FIELD] => {
                        include.retain(|f| f != ID_FIELD);
                        Ok(Projection::Include(include))
                    }
                    (false, false) => Err(Error::DataFormat(
                        "projection cannot mix inclusion and exclusion".into(),
                    )),
                }
            }
            other => Err(Error::DataFormat(format!("invalid projection {other}"))),
        }
    }

    /// Apply the projection to one document.
    pub fn apply(&self, doc: Document) -> Document {
        match self {
            Projection::All => doc,
            Projection::Include(fields) => {
                let mut out = Document::new();
                if let Some(id) = doc.get(ID_FIELD) {
                    out.insert(ID_FIELD.to_string(), id.clone());
                }
                for field in fields {
                    if let Some(value) = get_path(&doc, field) {
                        insert_path(&mut out, field, value.clone());
                    }
                }
                out
            }
            Projection::Exclude(fields) => {
                let mut doc = doc;
                for field in fields {
                    remove_path(&mut doc, field);
                }
                doc
            }
        }
    }
}

/// Resolve a dotted path inside a document.
pub fn get_path<'v>(doc: &'v Document, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn insert_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.shift_remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = doc.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

/// Decode a stored item and fill in literal schema defaults.
pub fn format_item(schema: &Schema, item: &Item) -> Result<Document> {
    let mut doc = decode_item(item)?;
    schema.apply_read_defaults(&mut doc);
    Ok(doc)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Single-key ordering applied after documents are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }

    /// Parse `"field"`, `"-field"` or `{field: 1 | -1}`. Only the first key
    /// of an object is used.
    pub fn from_value(spec: &Value) -> Result<Option<Self>> {
        match spec {
            Value::Null => Ok(None),
            Value::String(s) => {
                let s = s.trim();
                Ok(match s.strip_prefix('-') {
                    _ if s.is_empty() => None,
                    Some(field) => Some(Self::descending(field)),
                    None => Some(Self::ascending(s)),
                })
            }
            Value::Object(fields) => match fields.iter().next() {
                None => Ok(None),
                Some((field, direction)) => {
                    let descending = match direction {
                        Value::Number(n) => n.as_f64() == Some(-1.0),
                        Value::String(s) => matches!(s.as_str(), "desc" | "descending" | "-1"),
                        _ => false,
                    };
                    Ok(Some(if descending {
                        Self::descending(field.clone())
                    } else {
                        Self::ascending(field.clone())
                    }))
                }
            },
            other => Err(Error::DataFormat(format!("invalid sort {other}"))),
        }
    }

    /// Stable in-place sort of documents.
    pub fn sort(&self, docs: &mut [Document]) {
        docs.sort_by(|a, b| {
            let ordering = compare_values(get_path(a, &self.field), get_path(b, &self.field));
            match self.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order over optional values: missing and null first, then numbers,
/// strings, objects, arrays and booleans.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
