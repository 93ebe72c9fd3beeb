//! Schema definition and validation.
//!
//! A [`Schema`] describes one document type: its fields, their wire types,
//! defaults, validators, enumerations, secondary indexes and references to
//! other document types. Documents are validated against it before any write
//! and normalised with it after every read.

use crate::codec::NULL_SENTINEL;
use crate::wire::{
    AttributeDefinition, CreateTableInput, GlobalSecondaryIndex, KeySchemaElement, KeyType,
    Projection, ProjectionType, ScalarAttributeType,
};
use crate::{error::Result, BillingMode, Document, Error, FieldName, ID_FIELD};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Wire type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Map,
    Boolean,
}

impl FieldType {
    /// Normalise a type name (`String`, `S`, `Number`, `N`, `Object`, `M`,
    /// `Date`, `Boolean`, `BOOL`). Anything unrecognised is a string.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "String" | "S" => FieldType::String,
            "Number" | "N" | "Date" => FieldType::Number,
            "Object" | "M" => FieldType::Map,
            "Boolean" | "BOOL" => FieldType::Boolean,
            _ => FieldType::String,
        }
    }

    /// Wire tag used for this type.
    pub fn wire_tag(self) -> &'static str {
        match self {
            FieldType::String => "S",
            FieldType::Number => "N",
            FieldType::Map => "M",
            FieldType::Boolean => "BOOL",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match value {
            Value::Array(items) => items.iter().all(|v| self.accepts(v)),
            Value::String(_) => self == FieldType::String,
            Value::Number(_) => self == FieldType::Number,
            Value::Object(_) => self == FieldType::Map,
            Value::Bool(_) => self == FieldType::Boolean,
            Value::Null => true,
        }
    }

    fn key_attribute_type(self) -> Option<ScalarAttributeType> {
        match self {
            FieldType::String => Some(ScalarAttributeType::S),
            FieldType::Number => Some(ScalarAttributeType::N),
            FieldType::Map | FieldType::Boolean => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Number => write!(f, "Number"),
            FieldType::Map => write!(f, "Object"),
            FieldType::Boolean => write!(f, "Boolean"),
        }
    }
}

/// A deferred default, evaluated each time it is applied.
#[derive(Clone)]
pub struct Generator(Arc<dyn Fn() -> Value + Send + Sync>);

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator(..)")
    }
}

/// Default value of a field.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Literal(Value),
    Generator(Generator),
}

impl DefaultValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        DefaultValue::Literal(value.into())
    }

    pub fn generator(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        DefaultValue::Generator(Generator(Arc::new(f)))
    }

    /// A fresh v4 identifier on every application.
    pub fn uuid() -> Self {
        Self::generator(|| Value::String(uuid::Uuid::new_v4().to_string()))
    }

    /// The current time in milliseconds since the epoch.
    pub fn now() -> Self {
        Self::generator(|| Value::from(chrono::Utc::now().timestamp_millis()))
    }

    /// Produce the default value.
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Literal(v) => v.clone(),
            DefaultValue::Generator(g) => (g.0)(),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, DefaultValue::Literal(Value::Null))
    }

    // An empty-string default can never be stored, so it counts as no default.
    fn is_blank(&self) -> bool {
        matches!(self, DefaultValue::Literal(Value::String(s)) if s.is_empty())
    }
}

/// A named check run against every present value of a field.
#[derive(Clone)]
pub struct Validator {
    check: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
    message: String,
}

impl Validator {
    /// `message` may reference `{PATH}` and `{VALUE}`.
    pub fn new(
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check: Arc::new(check),
            message: message.into(),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Definition of a single field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub default: Option<DefaultValue>,
    /// `Some(message)` when required; `None` message uses the stock text.
    pub required: Option<Option<String>>,
    pub validators: Vec<Validator>,
    pub enum_values: Vec<Value>,
    pub index: bool,
    /// Name of the model this field's value identifies.
    pub reference: Option<String>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            default: None,
            required: None,
            validators: Vec::new(),
            enum_values: Vec::new(),
            index: false,
            reference: None,
        }
    }

    /// Build from a type name, see [`FieldType::from_type_name`].
    pub fn typed(type_name: &str) -> Self {
        Self::new(FieldType::from_type_name(type_name))
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn map() -> Self {
        Self::new(FieldType::Map)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::literal(value));
        self
    }

    pub fn default_with(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = Some(None);
        self
    }

    pub fn required_with(mut self, message: impl Into<String>) -> Self {
        self.required = Some(Some(message.into()));
        self
    }

    pub fn validate(
        mut self,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        self.validators.push(Validator::new(check, message));
        self
    }

    pub fn one_of<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn reference(mut self, model: impl Into<String>) -> Self {
        self.reference = Some(model.into());
        self
    }

    fn has_null_default(&self) -> bool {
        self.default.as_ref().is_some_and(DefaultValue::is_null)
    }
}

/// Read-time resolution of a field into documents of another model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateSpec {
    /// Model name the documents come from
    pub reference: String,
    /// Field of this document holding the lookup value
    pub local_field: FieldName,
    /// Field of the referenced documents matched against it
    pub foreign_field: FieldName,
    /// Resolve to a single document instead of a list
    pub just_one: bool,
}

impl PopulateSpec {
    pub fn new(
        reference: impl Into<String>,
        local_field: impl Into<FieldName>,
        foreign_field: impl Into<FieldName>,
        just_one: bool,
    ) -> Self {
        Self {
            reference: reference.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            just_one,
        }
    }
}

/// Schema of one document type.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: BTreeMap<FieldName, FieldSpec>,
    indexes: Vec<FieldName>,
    populate: BTreeMap<FieldName, PopulateSpec>,
    virtuals: BTreeMap<FieldName, PopulateSpec>,
}

impl Schema {
    /// Build a schema from field definitions.
    ///
    /// `_id` is always a string hash key; when it is not declared it gets a
    /// generated v4 identifier as default.
    pub fn new<N: Into<FieldName>>(fields: impl IntoIterator<Item = (N, FieldSpec)>) -> Self {
        let mut schema = Self {
            fields: BTreeMap::new(),
            indexes: Vec::new(),
            populate: BTreeMap::new(),
            virtuals: BTreeMap::new(),
        };
        schema.add(fields);
        schema
    }

    /// Merge additional fields. Already-declared fields are kept as they are.
    pub fn add<N: Into<FieldName>>(
        &mut self,
        fields: impl IntoIterator<Item = (N, FieldSpec)>,
    ) -> &mut Self {
        for (name, spec) in fields {
            self.fields.entry(name.into()).or_insert(spec);
        }
        self.derive();
        self
    }

    /// Declare a non-persisted field resolved from another model at read time.
    pub fn virtual_field(&mut self, name: impl Into<FieldName>, spec: PopulateSpec) -> &mut Self {
        self.virtuals.insert(name.into(), spec);
        self
    }

    fn derive(&mut self) {
        let id = self
            .fields
            .entry(ID_FIELD.to_string())
            .or_insert_with(|| FieldSpec::string().default_with(DefaultValue::uuid()));
        id.field_type = FieldType::String;
        id.index = false;

        self.indexes = self
            .fields
            .iter()
            .filter(|(_, spec)| spec.index)
            .map(|(name, _)| name.clone())
            .collect();

        self.populate = self
            .fields
            .iter()
            .filter_map(|(name, spec)| {
                spec.reference
                    .as_ref()
                    .map(|model| (name.clone(), PopulateSpec::new(model, name, ID_FIELD, true)))
            })
            .collect();
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&FieldName, &FieldSpec)> {
        self.fields.iter()
    }

    /// Names of indexed fields, in field-name order.
    pub fn indexes(&self) -> &[FieldName] {
        &self.indexes
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i == name)
    }

    /// Index name for an indexed field.
    pub fn index_name(field: &str) -> String {
        format!("{field}_1")
    }

    /// Population rule for a field or virtual.
    pub fn populate_spec(&self, name: &str) -> Option<&PopulateSpec> {
        self.virtuals.get(name).or_else(|| self.populate.get(name))
    }

    pub fn is_virtual(&self, name: &str) -> bool {
        self.virtuals.contains_key(name)
    }

    // ------------------------------------------------------------------
    // Table layout
    // ------------------------------------------------------------------

    pub fn key_schema(&self) -> Vec<KeySchemaElement> {
        vec![KeySchemaElement {
            attribute_name: ID_FIELD.to_string(),
            key_type: KeyType::Hash,
        }]
    }

    fn index_field_type(&self, field: &str) -> Result<ScalarAttributeType> {
        let spec = self
            .fields
            .get(field)
            .ok_or_else(|| Error::DataFormat(format!("index on undeclared field '{field}'")))?;
        spec.field_type.key_attribute_type().ok_or_else(|| {
            Error::DataFormat(format!(
                "field '{field}' of type {} cannot be indexed",
                spec.field_type
            ))
        })
    }

    /// Attribute definitions for the primary key and every indexed field.
    pub fn attribute_definitions(&self) -> Result<Vec<AttributeDefinition>> {
        let mut definitions = vec![AttributeDefinition {
            attribute_name: ID_FIELD.to_string(),
            attribute_type: ScalarAttributeType::S,
        }];
        for field in &self.indexes {
            definitions.push(AttributeDefinition {
                attribute_name: field.clone(),
                attribute_type: self.index_field_type(field)?,
            });
        }
        Ok(definitions)
    }

    /// Declaration of the secondary index for one indexed field.
    ///
    /// String fields key the index by hash, others by range; the index
    /// projects keys only.
    pub fn global_secondary_index(&self, field: &str) -> Result<GlobalSecondaryIndex> {
        let key_type = match self.index_field_type(field)? {
            ScalarAttributeType::S => KeyType::Hash,
            _ => KeyType::Range,
        };
        Ok(GlobalSecondaryIndex {
            index_name: Self::index_name(field),
            key_schema: vec![KeySchemaElement {
                attribute_name: field.to_string(),
                key_type,
            }],
            projection: Projection {
                projection_type: ProjectionType::KeysOnly,
            },
        })
    }

    /// Request creating the backing table with on-demand capacity.
    pub fn create_table_input(&self, table_name: &str) -> Result<CreateTableInput> {
        Ok(CreateTableInput {
            table_name: table_name.to_string(),
            key_schema: self.key_schema(),
            attribute_definitions: self.attribute_definitions()?,
            billing_mode: BillingMode::PayPerRequest,
            global_secondary_indexes: self
                .indexes
                .iter()
                .map(|f| self.global_secondary_index(f))
                .collect::<Result<_>>()?,
        })
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Validate a document for insertion.
    ///
    /// Applies defaults to absent fields, checks types, validators and
    /// enumerations of present fields, and enforces required fields.
    /// Undeclared and virtual fields are dropped, as are blank strings.
    pub fn validate(&self, mut doc: Document) -> Result<Document> {
        let mut out = Document::new();

        for (name, spec) in &self.fields {
            // A blank string removes the field, so the default applies.
            let value = match doc.remove(name) {
                Some(Value::String(s)) if s.is_empty() => None,
                other => other,
            }
            .or_else(|| {
                spec.default
                    .as_ref()
                    .filter(|d| !d.is_blank())
                    .map(DefaultValue::resolve)
            });

            match value {
                Some(Value::Null) if spec.required.is_some() && !spec.has_null_default() => {
                    return Err(required_error(name, spec));
                }
                Some(v) => {
                    if let Some(v) = check_value(name, spec, v)? {
                        out.insert(name.clone(), v);
                    }
                }
                None if spec.required.is_some() => return Err(required_error(name, spec)),
                None => {}
            }
        }

        Ok(out)
    }

    /// Validate the fields of a partial update.
    ///
    /// Only present fields are checked; blank strings are kept so the caller
    /// can turn them into removals. Dotted paths are checked against their
    /// top-level field when that field is not a map.
    pub fn validate_update(&self, fields: Document) -> Result<Document> {
        let mut out = Document::new();
        for (name, value) in fields {
            let top = name.split('.').next().unwrap_or(&name);
            let spec = match self.fields.get(top) {
                Some(spec) if top == name => spec,
                Some(spec) if spec.field_type == FieldType::Map => {
                    out.insert(name, value);
                    continue;
                }
                Some(spec) => {
                    return Err(Error::Validation {
                        path: name.clone(),
                        message: format!(
                            "'{top}' is a {} field and has no nested paths",
                            spec.field_type.wire_tag()
                        ),
                    })
                }
                None => {
                    return Err(Error::DataFormat(format!(
                        "field '{name}' is not declared in the schema"
                    )))
                }
            };
            match value {
                Value::String(s) if s.is_empty() => {
                    out.insert(name, Value::String(s));
                }
                Value::Null if spec.required.is_some() && !spec.has_null_default() => {
                    return Err(required_error(&name, spec));
                }
                v => {
                    if let Some(v) = check_value(&name, spec, v)? {
                        out.insert(name, v);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Fill literal defaults into a document read from the store.
    pub fn apply_read_defaults(&self, doc: &mut Document) {
        for (name, spec) in &self.fields {
            if doc.contains_key(name) {
                continue;
            }
            if let Some(DefaultValue::Literal(value)) = &spec.default {
                if !matches!(value, Value::String(s) if s.is_empty()) {
                    doc.insert(name.clone(), value.clone());
                }
            }
        }
    }
}

fn required_error(path: &str, spec: &FieldSpec) -> Error {
    let message = match &spec.required {
        Some(Some(message)) => render(message, path, &Value::Null),
        _ => format!("Path `{path}` is required."),
    };
    Error::Validation {
        path: path.to_string(),
        message,
    }
}

fn render(template: &str, path: &str, value: &Value) -> String {
    let value = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    template.replace("{PATH}", path).replace("{VALUE}", &value)
}

/// Check one present value. Returns the value to store, `None` to drop it.
fn check_value(path: &str, spec: &FieldSpec, value: Value) -> Result<Option<Value>> {
    if spec.has_null_default() {
        match &value {
            Value::Null => return Ok(Some(Value::String(NULL_SENTINEL.to_string()))),
            Value::String(s) if s == NULL_SENTINEL => {
                return Err(Error::Validation {
                    path: path.to_string(),
                    message: format!("`{NULL_SENTINEL}` is a reserved value for path `{path}`"),
                })
            }
            _ => {}
        }
    }
    if value.is_null() {
        return Ok(Some(value));
    }

    if !spec.field_type.accepts(&value) {
        return Err(Error::Validation {
            path: path.to_string(),
            message: format!(
                "Cast to {} failed for value {} at path `{path}`",
                spec.field_type, value
            ),
        });
    }

    for validator in &spec.validators {
        if !(validator.check)(&value) {
            return Err(Error::Validation {
                path: path.to_string(),
                message: render(&validator.message, path, &value),
            });
        }
    }

    if !spec.enum_values.is_empty() {
        let members: Vec<&Value> = match &value {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        if let Some(bad) = members.into_iter().find(|v| !spec.enum_values.contains(v)) {
            return Err(Error::Validation {
                path: path.to_string(),
                message: render("`{VALUE}` is not a valid enum value for path `{PATH}`.", path, bad),
            });
        }
    }

    Ok(match value {
        Value::String(s) if s.is_empty() => None,
        v => Some(v),
    })
}

/// Names of the primary-key and index fields a filter may be answered from.
pub fn point_lookup_fields(schema: &Schema) -> BTreeSet<&str> {
    std::iter::once(ID_FIELD)
        .chain(schema.indexes.iter().map(String::as_str))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn user_schema() -> Schema {
        Schema::new([
            ("name", FieldSpec::string().required()),
            ("email", FieldSpec::string().index()),
            ("age", FieldSpec::number().default(5)),
            (
                "role",
                FieldSpec::string().one_of(["admin", "member"]).default("member"),
            ),
            ("manager", FieldSpec::string().default(Value::Null).reference("User")),
            (
                "score",
                FieldSpec::number().validate(
                    |v| v.as_f64().is_some_and(|n| n >= 0.0),
                    "{PATH} must be positive, got {VALUE}",
                ),
            ),
            ("settings", FieldSpec::map()),
            ("active", FieldSpec::typed("BOOL")),
        ])
    }

    #[test]
    fn type_name_normalisation() {
        assert_eq!(FieldType::from_type_name("String"), FieldType::String);
        assert_eq!(FieldType::from_type_name("S"), FieldType::String);
        assert_eq!(FieldType::from_type_name("Number"), FieldType::Number);
        assert_eq!(FieldType::from_type_name("Date"), FieldType::Number);
        assert_eq!(FieldType::from_type_name("Object"), FieldType::Map);
        assert_eq!(FieldType::from_type_name("M"), FieldType::Map);
        assert_eq!(FieldType::from_type_name("Boolean"), FieldType::Boolean);
        assert_eq!(FieldType::from_type_name("BOOL"), FieldType::Boolean);
        assert_eq!(FieldType::from_type_name("Buffer"), FieldType::String);
        assert_eq!(FieldType::Boolean.wire_tag(), "BOOL");
    }

    #[test]
    fn id_is_always_a_string_key() {
        let schema = Schema::new([("_id", FieldSpec::number()), ("n", FieldSpec::number())]);
        assert_eq!(schema.field("_id").unwrap().field_type, FieldType::String);

        let schema = Schema::new([("n", FieldSpec::number())]);
        let validated = schema.validate(Document::new()).unwrap();
        assert!(validated["_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn derives_indexes_and_populate() {
        let schema = user_schema();
        assert_eq!(schema.indexes(), ["email".to_string()]);
        assert!(schema.is_indexed("email"));
        assert!(!schema.is_indexed("name"));
        assert_eq!(
            schema.populate_spec("manager"),
            Some(&PopulateSpec::new("User", "manager", "_id", true))
        );
        assert!(point_lookup_fields(&schema).contains("email"));
    }

    #[test]
    fn add_does_not_overwrite() {
        let mut schema = user_schema();
        schema.add([
            ("name", FieldSpec::number()),
            ("team", FieldSpec::string().index()),
        ]);
        assert_eq!(schema.field("name").unwrap().field_type, FieldType::String);
        assert_eq!(schema.indexes(), ["email".to_string(), "team".to_string()]);
    }

    #[test]
    fn virtual_fields() {
        let mut schema = user_schema();
        schema.virtual_field("reports", PopulateSpec::new("User", "_id", "manager", false));
        assert!(schema.is_virtual("reports"));
        assert!(!schema.populate_spec("reports").unwrap().just_one);

        let validated = schema
            .validate(doc(json!({"name": "A", "reports": ["x"]})))
            .unwrap();
        assert!(!validated.contains_key("reports"));
    }

    #[test]
    fn create_table_layout() {
        let schema = Schema::new([
            ("email", FieldSpec::string().index()),
            ("rank", FieldSpec::number().index()),
        ]);
        let input = schema.create_table_input("users").unwrap();
        assert_eq!(input.billing_mode, BillingMode::PayPerRequest);
        assert_eq!(input.key_schema[0].attribute_name, "_id");
        assert_eq!(input.attribute_definitions.len(), 3);
        assert_eq!(input.global_secondary_indexes.len(), 2);
        assert_eq!(input.global_secondary_indexes[0].index_name, "email_1");
        assert_eq!(
            input.global_secondary_indexes[0].key_schema[0].key_type,
            KeyType::Hash
        );
        assert_eq!(
            input.global_secondary_indexes[1].key_schema[0].key_type,
            KeyType::Range
        );
        assert_eq!(
            input.global_secondary_indexes[1].projection.projection_type,
            ProjectionType::KeysOnly
        );
    }

    #[test]
    fn unindexable_field_type() {
        let schema = Schema::new([("flags", FieldSpec::map().index())]);
        let err = schema.create_table_input("t").unwrap_err();
        assert!(matches!(err, Error::DataFormat(_)));
    }

    #[test]
    fn validate_applies_defaults() {
        let validated = user_schema()
            .validate(doc(json!({"_id": "u1", "name": "Alice"})))
            .unwrap();
        assert_eq!(validated["age"], json!(5));
        assert_eq!(validated["role"], json!("member"));
        assert_eq!(validated["manager"], json!(NULL_SENTINEL));
    }

    #[test]
    fn validate_missing_required() {
        let err = user_schema()
            .validate(doc(json!({"_id": "u1"})))
            .unwrap_err();
        assert_eq!(err.path(), Some("name"));
        assert_eq!(
            err,
            Error::Validation {
                path: "name".into(),
                message: "Path `name` is required.".into()
            }
        );
    }

    #[test]
    fn validate_custom_required_message() {
        let schema = Schema::new([("title", FieldSpec::string().required_with("{PATH} please"))]);
        let err = schema.validate(Document::new()).unwrap_err();
        assert_eq!(err.to_string(), "validation failed for 'title': title please");
    }

    #[test]
    fn validate_type_mismatch() {
        let err = user_schema()
            .validate(doc(json!({"name": "A", "age": "old"})))
            .unwrap_err();
        assert_eq!(err.path(), Some("age"));

        let err = user_schema()
            .validate(doc(json!({"name": "A", "active": "yes"})))
            .unwrap_err();
        assert_eq!(err.path(), Some("active"));
    }

    #[test]
    fn validate_runs_validators_and_enum() {
        let err = user_schema()
            .validate(doc(json!({"name": "A", "score": -1})))
            .unwrap_err();
        assert_eq!(err.to_string(), "validation failed for 'score': score must be positive, got -1");

        let err = user_schema()
            .validate(doc(json!({"name": "A", "role": "owner"})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation failed for 'role': `owner` is not a valid enum value for path `role`."
        );
    }

    #[test]
    fn validate_rejects_sentinel_string_on_null_default() {
        let err = user_schema()
            .validate(doc(json!({"name": "A", "manager": "null"})))
            .unwrap_err();
        assert_eq!(err.path(), Some("manager"));

        let validated = user_schema()
            .validate(doc(json!({"name": "A", "manager": null})))
            .unwrap();
        assert_eq!(validated["manager"], json!(NULL_SENTINEL));
    }

    #[test]
    fn validate_drops_blank_and_undeclared() {
        let validated = user_schema()
            .validate(doc(json!({"name": "A", "email": "", "nickname": "Al"})))
            .unwrap();
        assert!(!validated.contains_key("email"));
        assert!(!validated.contains_key("nickname"));
    }

    #[test]
    fn blank_value_falls_back_to_default() {
        let validated = user_schema()
            .validate(doc(json!({"_id": "", "name": "A", "role": "", "age": ""})))
            .unwrap();
        assert!(validated[ID_FIELD].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(validated["role"], json!("member"));
        assert_eq!(validated["age"], json!(5));

        assert!(user_schema().validate(doc(json!({"name": ""}))).is_err());
    }

    #[test]
    fn blank_default_counts_as_none() {
        let schema = Schema::new([("code", FieldSpec::string().default("").required())]);
        assert!(schema.validate(Document::new()).is_err());
    }

    #[test]
    fn arrays_check_element_type() {
        let schema = Schema::new([("tags", FieldSpec::string().one_of(["a", "b"]))]);
        assert!(schema.validate(doc(json!({"tags": ["a", "b"]}))).is_ok());
        assert!(schema.validate(doc(json!({"tags": ["a", 1]}))).is_err());
        assert!(schema.validate(doc(json!({"tags": ["a", "c"]}))).is_err());
    }

    #[test]
    fn validate_update_checks_present_fields_only() {
        let schema = user_schema();
        let ok = schema
            .validate_update(doc(json!({"age": 7, "email": ""})))
            .unwrap();
        assert_eq!(ok["age"], json!(7));
        assert_eq!(ok["email"], json!(""));

        assert!(schema.validate_update(doc(json!({"age": "x"}))).is_err());
        assert!(schema.validate_update(doc(json!({"bogus": 1}))).is_err());
        assert!(schema
            .validate_update(doc(json!({"settings.theme": "dark"})))
            .is_ok());
    }

    #[test]
    fn nested_update_paths_need_a_map_field() {
        let err = user_schema()
            .validate_update(doc(json!({"age.x": "str"})))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DataFormat);
        assert_eq!(err.path(), Some("age.x"));
    }

    #[test]
    fn read_defaults_are_literal_only() {
        let schema = Schema::new([
            ("n", FieldSpec::number().default(5)),
            ("stamp", FieldSpec::number().default_with(DefaultValue::now())),
        ]);
        let mut read = doc(json!({"_id": "a"}));
        schema.apply_read_defaults(&mut read);
        assert_eq!(read["n"], json!(5));
        assert!(!read.contains_key("stamp"));
    }

    #[test]
    fn generator_defaults_apply_on_write() {
        let schema = Schema::new([(
            "created",
            FieldSpec::typed("Date").default_with(DefaultValue::now()),
        )]);
        let validated = schema.validate(Document::new()).unwrap();
        assert!(validated["created"].as_i64().is_some_and(|t| t > 0));
    }
}
