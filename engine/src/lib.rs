//! # dynadoc engine
//!
//! The I/O-free core of dynadoc: a document-model layer that emulates a
//! Mongo-style interface on top of a key-value store speaking a primitive
//! hash-key / scan protocol.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine only builds request bodies and interprets responses
//! - **Deterministic**: the same filter always produces the same request body
//! - **Closed types**: wire values and field types are exhaustive enums
//!
//! ## Core Concepts
//!
//! ### Wire Codec
//!
//! [`codec::encode`] and [`codec::decode`] map native JSON values to the
//! store's tagged [`AttributeValue`] format and back. `null` is carried as the
//! reserved string `"null"`; the empty string has no wire form.
//!
//! ### Schema
//!
//! A [`Schema`] declares field types, defaults, validators, enumerations,
//! secondary indexes (one `<field>_1` index per indexed field) and references
//! to other document types used for population.
//!
//! ### Query Builder
//!
//! A [`QueryBuilder`] is created per call. It owns the attribute-name and
//! attribute-value aliases of one request and turns filters and updates into
//! scan, point-lookup, update and batch-write bodies, chunked to the store's
//! 25-item batch limit.
//!
//! ## Quick Start
//!
//! ```rust
//! use dynadoc_engine::{FieldSpec, QueryBuilder, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new([
//!     ("name", FieldSpec::string().required()),
//!     ("age", FieldSpec::number().default(5)),
//! ]);
//!
//! let doc = schema
//!     .validate(json!({"_id": "u1", "name": "Alice"}).as_object().cloned().unwrap())
//!     .unwrap();
//! assert_eq!(doc["age"], json!(5));
//!
//! let mut query = QueryBuilder::new("users", &schema);
//! let scan = query
//!     .scan(json!({"name": "Alice"}).as_object().unwrap())
//!     .unwrap();
//! assert_eq!(scan.filter_expression.as_deref(), Some("#name = :v0"));
//! ```

pub mod codec;
pub mod error;
pub mod format;
pub mod query;
pub mod schema;
pub mod wire;

// Re-export main types at crate root
pub use error::{Error, ErrorKind};
pub use format::{Projection, SortOrder, SortSpec};
pub use query::{PointLookup, QueryBuilder, WriteKind};
pub use schema::{DefaultValue, FieldSpec, FieldType, PopulateSpec, Schema, Validator};
pub use wire::{AttributeValue, BillingMode, Item, Key};

/// A native document: field name to JSON value.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Name of a document field.
pub type FieldName = String;

/// Name of the primary-key field of every table.
pub const ID_FIELD: &str = "_id";

/// Hard cap on items per batched get or write request.
pub const BATCH_LIMIT: usize = 25;
