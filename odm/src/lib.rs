//! # dynadoc
//!
//! Mongo-style document models over a key-value store with a hash-key /
//! scan protocol and a 25-item batch limit.
//!
//! The request building, wire codec and schema logic live in
//! [`dynadoc_engine`]; this crate adds the async [`Model`] façade, the
//! [`KvStore`] client seam with an HTTP and an in-memory implementation,
//! the [`Registry`] used to resolve references, and configuration.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynadoc::{FieldSpec, MemoryStore, Model, Projection, QueryOptions, Registry, Schema};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> dynadoc::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let user = Model::builder(
//!     "User",
//!     Schema::new([
//!         ("name", FieldSpec::string().required()),
//!         ("email", FieldSpec::string().index()),
//!     ]),
//!     store,
//! )
//! .build();
//!
//! let registry = Registry::builder().register(user).freeze();
//! registry.init_all().await?;
//!
//! let users = registry.model("User").expect("registered");
//! let doc = json!({"_id": "u1", "name": "Alice", "email": "a@example.com"});
//! users.insert_many(vec![doc.as_object().cloned().unwrap()]).await?;
//!
//! let filter = json!({"email": "a@example.com"});
//! let found = users
//!     .find_one(filter.as_object().unwrap(), &Projection::parse("name"), &QueryOptions::new())
//!     .await?;
//! assert_eq!(found.unwrap()["name"], json!("Alice"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod options;
pub mod registry;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use error::{Error, Result, StoreError};
pub use model::{IndexChanges, Model, ModelBuilder, StaticMethod};
pub use options::QueryOptions;
pub use registry::{Registry, RegistryBuilder};
pub use store::{HttpStore, KvStore, MemoryStore};

pub use dynadoc_engine;
pub use dynadoc_engine::{
    DefaultValue, Document, ErrorKind, FieldSpec, FieldType, PopulateSpec, Projection, Schema,
    SortOrder, SortSpec, Validator,
};
