//! Shared fixtures for the model integration tests.

#![allow(dead_code)]

use dynadoc::{Document, FieldSpec, MemoryStore, Model, Schema};
use serde_json::Value;
use std::sync::{Arc, Once};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static TRACING: Once = Once::new();

/// Install a test subscriber once per binary. `RUST_LOG` overrides the filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "dynadoc=warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Object literal to document.
pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("object literal")
}

pub fn user_schema() -> Schema {
    Schema::new([
        ("name", FieldSpec::string().required()),
        ("email", FieldSpec::string().index()),
        ("age", FieldSpec::number().default(5)),
        ("visits", FieldSpec::number()),
        (
            "role",
            FieldSpec::string().one_of(["admin", "member"]).default("member"),
        ),
        ("nickname", FieldSpec::string().default(Value::Null)),
        ("settings", FieldSpec::map()),
    ])
}

/// A `User` model over a fresh memory store, table created.
pub async fn users(store: MemoryStore) -> (Arc<MemoryStore>, Model) {
    init_tracing();
    let store = Arc::new(store);
    let model = Model::builder("User", user_schema(), store.clone()).build();
    model.init().await.expect("create table");
    (store, model)
}
