//! Model registry used to resolve references between document types.
//!
//! Models are registered on a [`RegistryBuilder`] at start-up and the builder
//! is then frozen into an immutable [`Registry`]. Freezing hands every model a
//! weak handle back to the registry, which is how population finds the model
//! a reference points at.

use crate::error::Result;
use crate::model::Model;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Collects models before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: BTreeMap<String, Model>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model under its name. A later model with the same name wins.
    pub fn register(mut self, model: Model) -> Self {
        let name = model.name().to_string();
        if self.models.insert(name.clone(), model).is_some() {
            tracing::warn!(model = %name, "model registered twice, keeping the last one");
        }
        self
    }

    /// Freeze the registry. No models can be added afterwards.
    pub fn freeze(self) -> Arc<Registry> {
        Arc::new_cyclic(|registry| {
            let models = self
                .models
                .into_iter()
                .map(|(name, model)| {
                    model.attach(registry.clone());
                    (name, Arc::new(model))
                })
                .collect();
            Registry { models }
        })
    }
}

/// Immutable name → model table.
#[derive(Debug)]
pub struct Registry {
    models: BTreeMap<String, Arc<Model>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Option<Arc<Model>> {
        self.models.get(name).cloned()
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Create the tables of every registered model concurrently.
    pub async fn init_all(&self) -> Result<()> {
        try_join_all(self.models.values().map(|model| model.init())).await?;
        tracing::info!(models = self.models.len(), "registry initialised");
        Ok(())
    }
}
