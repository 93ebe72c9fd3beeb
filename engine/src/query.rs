//! Query Builder: translates Mongo-style filters and updates into request
//! bodies of the key-value store protocol.
//!
//! A builder lives for one logical operation. It accumulates the attribute
//! name aliases (every name is aliased, which sidesteps the store's reserved
//! words) and value placeholders shared by the requests it produces.

use crate::codec::{encode, encode_document};
use crate::wire::{
    AttributeNames, AttributeValues, BatchGetItemInput, BatchWriteItemInput, DeleteItemInput,
    DeleteRequest, GetItemInput, KeysAndAttributes, PutItemInput, PutRequest, QueryInput,
    ReturnValue, ScanInput, Select, UpdateItemInput, WriteRequest,
};
use crate::{
    error::Result, AttributeValue, Document, Error, Key, Schema, BATCH_LIMIT, ID_FIELD,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix of fields holding grantee sets, matched by containment.
const PERMISSIONS_PREFIX: &str = "permissions.";

/// Kind of a batched write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Put,
    Delete,
}

/// Identifiers of a filter that can be answered by primary-key lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointLookup {
    pub ids: Vec<String>,
}

impl PointLookup {
    /// Recognise `{_id: v}` and `{_id: {$in: [...]}}`.
    ///
    /// Any other filter shape, including extra keys, returns `None`.
    pub fn from_filter(filter: &Document) -> Option<Self> {
        if filter.len() != 1 {
            return None;
        }
        let ids = match filter.get(ID_FIELD)? {
            Value::String(id) => vec![id.clone()],
            Value::Object(ops) if ops.len() == 1 => ops
                .get("$in")?
                .as_array()?
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()?,
            _ => return None,
        };
        Some(Self { ids })
    }
}

/// The parts of an update document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateParts {
    /// Fields to assign
    pub set: Document,
    /// Fields to remove
    pub unset: Vec<String>,
    /// Numeric fields to increment
    pub inc: Document,
}

impl UpdateParts {
    /// Split an update document. Plain fields and `$set` assign, `$unset`
    /// removes and `$inc` increments. `_id` is never updated.
    pub fn parse(update: &Document) -> Result<Self> {
        let mut parts = Self::default();
        for (key, value) in update {
            match key.as_str() {
                "$set" => parts.set.extend(operator_fields(key, value)?),
                "$unset" => parts
                    .unset
                    .extend(operator_fields(key, value)?.into_iter().map(|(k, _)| k)),
                "$inc" => {
                    for (field, amount) in operator_fields(key, value)? {
                        if !amount.is_number() {
                            return Err(Error::DataFormat(format!(
                                "$inc on '{field}' requires a number, got {amount}"
                            )));
                        }
                        parts.inc.insert(field, amount);
                    }
                }
                op if op.starts_with('$') => {
                    return Err(Error::NotImplemented(format!("update operator {op}")))
                }
                _ => {
                    parts.set.insert(key.clone(), value.clone());
                }
            }
        }
        parts.set.retain(|k, _| k != ID_FIELD);
        parts.inc.retain(|k, _| k != ID_FIELD);
        parts.unset.retain(|f| f != ID_FIELD);
        Ok(parts)
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty()
    }
}

fn operator_fields(op: &str, value: &Value) -> Result<Document> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| Error::DataFormat(format!("{op} expects an object, got {value}")))
}

/// Primary key of a document identifier.
pub fn key_for(id: &str) -> Key {
    Key::from([(ID_FIELD.to_string(), AttributeValue::String(id.to_string()))])
}

/// Per-call request builder bound to one table.
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    table: &'a str,
    schema: &'a Schema,
    names: AttributeNames,
    values: AttributeValues,
    next_value: usize,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(table: &'a str, schema: &'a Schema) -> Self {
        Self {
            table,
            schema,
            names: AttributeNames::new(),
            values: AttributeValues::new(),
            next_value: 0,
        }
    }

    pub fn table(&self) -> &str {
        self.table
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    /// Alias accumulated so far.
    pub fn names(&self) -> &AttributeNames {
        &self.names
    }

    /// Placeholders accumulated so far.
    pub fn values(&self) -> &AttributeValues {
        &self.values
    }

    // ------------------------------------------------------------------
    // Aliasing
    // ------------------------------------------------------------------

    /// Alias a (possibly dotted) field path, one alias per segment.
    pub fn alias_path(&mut self, path: &str) -> String {
        path.split('.')
            .map(|segment| self.alias_segment(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn alias_segment(&mut self, segment: &str) -> String {
        let base = if segment == ID_FIELD {
            "#id".to_string()
        } else {
            let cleaned: String = segment
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .collect();
            format!("#{cleaned}")
        };

        let mut alias = base.clone();
        let mut n = 1;
        while let Some(existing) = self.names.get(&alias) {
            if existing == segment {
                return alias;
            }
            alias = format!("{base}_{n}");
            n += 1;
        }
        self.names.insert(alias.clone(), segment.to_string());
        alias
    }

    fn placeholder(&mut self, value: AttributeValue) -> String {
        let name = format!(":v{}", self.next_value);
        self.next_value += 1;
        self.values.insert(name.clone(), value);
        name
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    /// Translate a filter into a condition expression.
    ///
    /// Clauses are joined with `AND` in filter key order. Returns `None` for
    /// an empty filter.
    pub fn filter_expression(&mut self, filter: &Document) -> Result<Option<String>> {
        let mut clauses = Vec::new();
        for (field, value) in filter {
            if field == "$text" {
                return Err(Error::NotImplemented(
                    "free-text search ($text) is not supported".into(),
                ));
            }
            if field.starts_with('$') {
                return Err(Error::NotImplemented(format!("filter operator {field}")));
            }
            if let Some(clause) = self.field_condition(field, value)? {
                clauses.push(clause);
            }
        }
        Ok((!clauses.is_empty()).then(|| clauses.join(" AND ")))
    }

    fn field_condition(&mut self, field: &str, value: &Value) -> Result<Option<String>> {
        let contains = field.starts_with(PERMISSIONS_PREFIX);
        let operators = match value {
            Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                ops
            }
            _ => return Ok(Some(self.equals(field, value, contains))),
        };

        let mut clauses = Vec::new();
        for (op, operand) in operators {
            let clause = match op.as_str() {
                "$in" => {
                    let options = in_operand(op, operand)?;
                    if options.is_empty() {
                        // Nothing can match an empty $in.
                        let id = self.alias_path(ID_FIELD);
                        format!("attribute_not_exists({id})")
                    } else {
                        let parts: Vec<String> = options
                            .iter()
                            .map(|v| self.equals(field, v, contains))
                            .collect();
                        format!("({})", parts.join(" OR "))
                    }
                }
                "$nin" => {
                    let options = in_operand(op, operand)?;
                    if options.is_empty() {
                        continue;
                    }
                    let parts: Vec<String> = options
                        .iter()
                        .map(|v| self.equals(field, v, contains))
                        .collect();
                    format!("NOT ({})", parts.join(" OR "))
                }
                "$ne" => format!("NOT ({})", self.equals(field, operand, contains)),
                "$gt" | "$gte" | "$lt" | "$lte" => {
                    let symbol = match op.as_str() {
                        "$gt" => ">",
                        "$gte" => ">=",
                        "$lt" => "<",
                        _ => "<=",
                    };
                    let value = encode(operand).ok_or_else(|| {
                        Error::DataFormat(format!("{op} on '{field}' needs a non-empty value"))
                    })?;
                    let path = self.alias_path(field);
                    let placeholder = self.placeholder(value);
                    format!("{path} {symbol} {placeholder}")
                }
                "$exists" => match operand.as_bool() {
                    Some(true) => format!("attribute_exists({})", self.alias_path(field)),
                    Some(false) => format!("attribute_not_exists({})", self.alias_path(field)),
                    None => {
                        return Err(Error::DataFormat(format!(
                            "$exists on '{field}' expects a boolean"
                        )))
                    }
                },
                "$contains" => self.equals(field, operand, true),
                "$text" => {
                    return Err(Error::NotImplemented(
                        "free-text search ($text) is not supported".into(),
                    ))
                }
                other => return Err(Error::NotImplemented(format!("filter operator {other}"))),
            };
            clauses.push(clause);
        }

        Ok(match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(format!("({})", clauses.join(" AND "))),
        })
    }

    /// Equality (or containment) test of one field against one value.
    fn equals(&mut self, field: &str, value: &Value, contains: bool) -> String {
        let path = self.alias_path(field);
        let Some(encoded) = encode(value) else {
            // Blank values are never stored.
            return format!("attribute_not_exists({path})");
        };
        let placeholder = self.placeholder(encoded);
        if contains {
            format!("contains({path}, {placeholder})")
        } else if value.is_null() {
            format!("(attribute_not_exists({path}) OR {path} = {placeholder})")
        } else {
            format!("{path} = {placeholder}")
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Scan request for a filter.
    pub fn scan(&mut self, filter: &Document) -> Result<ScanInput> {
        let filter_expression = self.filter_expression(filter)?;
        Ok(ScanInput {
            table_name: self.table.to_string(),
            filter_expression,
            expression_attribute_names: self.names.clone(),
            expression_attribute_values: self.values.clone(),
            ..Default::default()
        })
    }

    /// Scan request returning only a count of matches.
    pub fn count(&mut self, filter: &Document) -> Result<ScanInput> {
        let mut input = self.scan(filter)?;
        input.select = Some(Select::Count);
        Ok(input)
    }

    /// Scan request returning only the identifiers of matches.
    pub fn scan_ids(&mut self, filter: &Document) -> Result<ScanInput> {
        let filter_expression = self.filter_expression(filter)?;
        let projection = self.alias_path(ID_FIELD);
        Ok(ScanInput {
            table_name: self.table.to_string(),
            filter_expression,
            projection_expression: Some(projection),
            expression_attribute_names: self.names.clone(),
            expression_attribute_values: self.values.clone(),
            ..Default::default()
        })
    }

    /// Equality query against the secondary index of `field`.
    pub fn index_query(&mut self, field: &str, value: &Value) -> Result<QueryInput> {
        if !self.schema.is_indexed(field) {
            return Err(Error::DataFormat(format!("field '{field}' is not indexed")));
        }
        let encoded = encode(value).ok_or_else(|| {
            Error::DataFormat(format!("index lookup on '{field}' needs a non-empty value"))
        })?;
        let path = self.alias_path(field);
        let placeholder = self.placeholder(encoded);
        Ok(QueryInput {
            table_name: self.table.to_string(),
            index_name: Some(Schema::index_name(field)),
            key_condition_expression: format!("{path} = {placeholder}"),
            expression_attribute_names: self.names.clone(),
            expression_attribute_values: self.values.clone(),
            ..Default::default()
        })
    }

    pub fn get_item(&self, id: &str) -> GetItemInput {
        GetItemInput {
            table_name: self.table.to_string(),
            key: key_for(id),
            consistent_read: None,
        }
    }

    /// Batched point lookups, at most [`BATCH_LIMIT`] keys per request.
    pub fn batch_get(&self, ids: &[String]) -> Vec<BatchGetItemInput> {
        ids.chunks(BATCH_LIMIT)
            .map(|chunk| BatchGetItemInput {
                request_items: BTreeMap::from([(
                    self.table.to_string(),
                    KeysAndAttributes {
                        keys: chunk.iter().map(|id| key_for(id)).collect(),
                        consistent_read: None,
                    },
                )]),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Update request for one document. Only succeeds if the document exists.
    pub fn update_item(&mut self, id: &str, parts: &UpdateParts) -> UpdateItemInput {
        let mut set = Vec::new();
        let mut remove = Vec::new();

        for (field, value) in &parts.set {
            let path = self.alias_path(field);
            match encode(value) {
                Some(encoded) => {
                    let placeholder = self.placeholder(encoded);
                    set.push(format!("{path} = {placeholder}"));
                }
                None => remove.push(path),
            }
        }
        for (field, amount) in &parts.inc {
            let path = self.alias_path(field);
            let zero = self.placeholder(AttributeValue::Number("0".into()));
            let amount = self.placeholder(AttributeValue::Number(amount.to_string()));
            set.push(format!("{path} = if_not_exists({path}, {zero}) + {amount}"));
        }
        for field in &parts.unset {
            remove.push(self.alias_path(field));
        }

        let mut sections = Vec::new();
        if !set.is_empty() {
            sections.push(format!("SET {}", set.join(", ")));
        }
        if !remove.is_empty() {
            sections.push(format!("REMOVE {}", remove.join(", ")));
        }

        let id_path = self.alias_path(ID_FIELD);
        UpdateItemInput {
            table_name: self.table.to_string(),
            key: key_for(id),
            update_expression: sections.join(" "),
            condition_expression: Some(format!("attribute_exists({id_path})")),
            expression_attribute_names: self.names.clone(),
            expression_attribute_values: self.values.clone(),
            return_values: ReturnValue::AllNew,
        }
    }

    /// Put request that refuses to overwrite an existing document.
    pub fn put_new_item(&mut self, doc: &Document) -> PutItemInput {
        let id_path = self.alias_path(ID_FIELD);
        PutItemInput {
            table_name: self.table.to_string(),
            item: encode_document(doc),
            condition_expression: Some(format!("attribute_not_exists({id_path})")),
            expression_attribute_names: self.names.clone(),
            expression_attribute_values: self.values.clone(),
        }
    }

    pub fn delete_item(&self, id: &str) -> DeleteItemInput {
        DeleteItemInput {
            table_name: self.table.to_string(),
            key: key_for(id),
            return_values: Some(ReturnValue::AllOld),
        }
    }

    /// Batched puts or deletes, at most [`BATCH_LIMIT`] documents per request.
    pub fn batch_write(&self, docs: &[Document], kind: WriteKind) -> Result<Vec<BatchWriteItemInput>> {
        docs.chunks(BATCH_LIMIT)
            .map(|chunk| {
                let requests = chunk
                    .iter()
                    .map(|doc| self.write_request(doc, kind))
                    .collect::<Result<Vec<_>>>()?;
                Ok(BatchWriteItemInput {
                    request_items: BTreeMap::from([(self.table.to_string(), requests)]),
                })
            })
            .collect()
    }

    fn write_request(&self, doc: &Document, kind: WriteKind) -> Result<WriteRequest> {
        Ok(match kind {
            WriteKind::Put => WriteRequest::PutRequest(PutRequest {
                item: encode_document(doc),
            }),
            WriteKind::Delete => {
                let id = doc.get(ID_FIELD).and_then(Value::as_str).ok_or_else(|| {
                    Error::DataFormat("delete request needs a string _id".into())
                })?;
                WriteRequest::DeleteRequest(DeleteRequest { key: key_for(id) })
            }
        })
    }
}

fn in_operand<'v>(op: &str, operand: &'v Value) -> Result<&'v Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| Error::DataFormat(format!("{op} expects an array, got {operand}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldSpec;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new([
            ("name", FieldSpec::string()),
            ("email", FieldSpec::string().index()),
            ("age", FieldSpec::number()),
            ("permissions", FieldSpec::map()),
            ("meta", FieldSpec::map()),
        ])
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn s(v: &str) -> AttributeValue {
        AttributeValue::String(v.into())
    }

    #[test]
    fn scan_simple_equality() {
        let schema = schema();
        let mut query = QueryBuilder::new("users", &schema);
        let input = query.scan(&doc(json!({"name": "Alice", "age": 30}))).unwrap();

        assert_eq!(input.table_name, "users");
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("#name = :v0 AND #age = :v1")
        );
        assert_eq!(input.expression_attribute_names["#name"], "name");
        assert_eq!(input.expression_attribute_values[":v0"], s("Alice"));
        assert_eq!(
            input.expression_attribute_values[":v1"],
            AttributeValue::Number("30".into())
        );
    }

    #[test]
    fn id_is_aliased_to_id_token() {
        let schema = schema();
        let mut query = QueryBuilder::new("users", &schema);
        let input = query.scan(&doc(json!({"_id": "a"}))).unwrap();
        assert_eq!(input.filter_expression.as_deref(), Some("#id = :v0"));
        assert_eq!(input.expression_attribute_names["#id"], "_id");
    }

    #[test]
    fn dotted_paths_alias_each_segment() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let input = query.scan(&doc(json!({"meta.owner.name": "x"}))).unwrap();
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("#meta.#owner.#name = :v0")
        );
        assert_eq!(input.expression_attribute_names.len(), 3);
    }

    #[test]
    fn in_expands_to_or_group() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let input = query
            .scan(&doc(json!({"name": {"$in": ["a", "b"]}, "age": 3})))
            .unwrap();
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("(#name = :v0 OR #name = :v1) AND #age = :v2")
        );
    }

    #[test]
    fn permissions_use_contains() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let input = query
            .scan(&doc(json!({"permissions.read": "user-1"})))
            .unwrap();
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("contains(#permissions.#read, :v0)")
        );

        let mut query = QueryBuilder::new("t", &schema);
        let input = query
            .scan(&doc(json!({"permissions.read": {"$in": ["u1", "u2"]}})))
            .unwrap();
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("(contains(#permissions.#read, :v0) OR contains(#permissions.#read, :v1))")
        );
    }

    #[test]
    fn text_search_is_rejected() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let err = query
            .scan(&doc(json!({"$text": {"$search": "x"}})))
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));

        let err = query.scan(&doc(json!({"$or": []}))).unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn comparison_operators() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let input = query
            .scan(&doc(json!({"age": {"$gte": 18, "$lt": 65}, "email": {"$exists": false}})))
            .unwrap();
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("(#age >= :v0 AND #age < :v1) AND attribute_not_exists(#email)")
        );

        let mut query = QueryBuilder::new("t", &schema);
        let input = query.scan(&doc(json!({"name": {"$ne": "x"}}))).unwrap();
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("NOT (#name = :v0)")
        );

        let mut query = QueryBuilder::new("t", &schema);
        let err = query.scan(&doc(json!({"name": {"$regex": "^a"}}))).unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn null_equality_matches_absent() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let input = query.scan(&doc(json!({"email": null}))).unwrap();
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("(attribute_not_exists(#email) OR #email = :v0)")
        );
        assert_eq!(input.expression_attribute_values[":v0"], s("null"));
    }

    #[test]
    fn empty_filter_has_no_expression() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let input = query.scan(&Document::new()).unwrap();
        assert_eq!(input.filter_expression, None);
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({"TableName": "t"})
        );
    }

    #[test]
    fn alias_collisions_get_suffixes() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        assert_eq!(query.alias_path("a-b"), "#a_b");
        assert_eq!(query.alias_path("a_b"), "#a_b_1");
        assert_eq!(query.alias_path("a-b"), "#a_b");
    }

    #[test]
    fn point_lookup_recognition() {
        assert_eq!(
            PointLookup::from_filter(&doc(json!({"_id": "a"}))),
            Some(PointLookup { ids: vec!["a".into()] })
        );
        assert_eq!(
            PointLookup::from_filter(&doc(json!({"_id": {"$in": ["a", "b", "c"]}})))
                .unwrap()
                .ids
                .len(),
            3
        );
        assert_eq!(
            PointLookup::from_filter(&doc(json!({"_id": "a", "name": "x"}))),
            None
        );
        assert_eq!(PointLookup::from_filter(&doc(json!({"_id": {"$ne": "a"}}))), None);
    }

    #[test]
    fn batch_get_chunks_by_limit() {
        let schema = schema();
        let query = QueryBuilder::new("t", &schema);
        let ids: Vec<String> = (0..60).map(|i| format!("id{i}")).collect();
        let requests = query.batch_get(&ids);
        assert_eq!(requests.len(), 3);

        let keys: Vec<String> = requests
            .iter()
            .flat_map(|r| r.request_items["t"].keys.iter())
            .map(|k| k["_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, ids);
        assert!(requests
            .iter()
            .all(|r| r.request_items["t"].keys.len() <= BATCH_LIMIT));
    }

    #[test]
    fn in_on_id_is_a_single_chunk() {
        let schema = schema();
        let query = QueryBuilder::new("t", &schema);
        let lookup =
            PointLookup::from_filter(&doc(json!({"_id": {"$in": ["a", "b", "c"]}}))).unwrap();
        let requests = query.batch_get(&lookup.ids);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request_items["t"].keys.len(), 3);
    }

    #[test]
    fn batch_write_chunks() {
        let schema = schema();
        let query = QueryBuilder::new("t", &schema);
        let docs: Vec<Document> = (0..26)
            .map(|i| doc(json!({"_id": format!("d{i}"), "age": i})))
            .collect();

        let puts = query.batch_write(&docs, WriteKind::Put).unwrap();
        assert_eq!(puts.len(), 2);
        assert_eq!(puts[0].request_items["t"].len(), 25);
        assert_eq!(puts[1].request_items["t"].len(), 1);
        assert!(matches!(
            puts[0].request_items["t"][0],
            WriteRequest::PutRequest(_)
        ));

        let deletes = query.batch_write(&docs[..3], WriteKind::Delete).unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(
            deletes[0].request_items["t"][2],
            WriteRequest::DeleteRequest(DeleteRequest { key: key_for("d2") })
        );

        let err = query
            .batch_write(&[doc(json!({"age": 1}))], WriteKind::Delete)
            .unwrap_err();
        assert!(matches!(err, Error::DataFormat(_)));
    }

    #[test]
    fn update_builds_set_and_remove() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let parts = UpdateParts::parse(&doc(json!({
            "_id": "ignored",
            "name": "Bob",
            "email": "",
            "$inc": {"age": 1},
            "$unset": {"meta": ""}
        })))
        .unwrap();
        let input = query.update_item("u1", &parts);

        assert_eq!(input.key, key_for("u1"));
        assert_eq!(
            input.update_expression,
            "SET #name = :v0, #age = if_not_exists(#age, :v1) + :v2 REMOVE #email, #meta"
        );
        assert_eq!(
            input.condition_expression.as_deref(),
            Some("attribute_exists(#id)")
        );
        assert_eq!(input.return_values, ReturnValue::AllNew);
    }

    #[test]
    fn empty_update_has_empty_expression() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let parts = UpdateParts::parse(&doc(json!({"_id": "x"}))).unwrap();
        assert!(parts.is_empty());
        assert_eq!(query.update_item("x", &parts).update_expression, "");
    }

    #[test]
    fn update_operator_errors() {
        assert!(matches!(
            UpdateParts::parse(&doc(json!({"$push": {"a": 1}}))),
            Err(Error::NotImplemented(_))
        ));
        assert!(matches!(
            UpdateParts::parse(&doc(json!({"$inc": {"a": "x"}}))),
            Err(Error::DataFormat(_))
        ));
    }

    #[test]
    fn index_query_targets_index() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let input = query.index_query("email", &json!("a@x")).unwrap();
        assert_eq!(input.index_name.as_deref(), Some("email_1"));
        assert_eq!(input.key_condition_expression, "#email = :v0");

        let mut query = QueryBuilder::new("t", &schema);
        assert!(query.index_query("name", &json!("a")).is_err());
    }

    #[test]
    fn scan_ids_projects_identifier() {
        let schema = schema();
        let mut query = QueryBuilder::new("t", &schema);
        let input = query.scan_ids(&doc(json!({"age": 1}))).unwrap();
        assert_eq!(input.projection_expression.as_deref(), Some("#id"));
        assert_eq!(input.expression_attribute_names["#id"], "_id");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_batch_chunks_preserve_items(n in 0usize..200) {
                let schema = schema();
                let query = QueryBuilder::new("t", &schema);
                let ids: Vec<String> = (0..n).map(|i| format!("k{i}")).collect();
                let requests = query.batch_get(&ids);

                prop_assert_eq!(requests.len(), n.div_ceil(BATCH_LIMIT));
                let flattened: Vec<String> = requests
                    .iter()
                    .flat_map(|r| r.request_items["t"].keys.iter())
                    .map(|k| k["_id"].as_str().unwrap().to_string())
                    .collect();
                prop_assert_eq!(flattened, ids);
            }
        }
    }
}
