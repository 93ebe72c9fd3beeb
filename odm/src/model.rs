//! Models: the data-access façade of one document type.
//!
//! A [`Model`] owns a [`Schema`], the resolved table name and a handle to the
//! store. Every operation builds a fresh [`QueryBuilder`], issues the
//! resulting requests and turns the raw items back into documents.
//!
//! Fan-out (batch chunks, per-document updates, population lookups) runs
//! concurrently and resolves to the aggregated result or the first error.
//! Scan pages are always fetched in order since each page's continuation
//! token comes from the previous response.

use crate::config::StoreConfig;
use crate::error::{Error, Result, StoreError};
use crate::options::QueryOptions;
use crate::registry::Registry;
use crate::store::KvStore;
use async_trait::async_trait;
use dynadoc_engine::format::{compare_values, format_item, get_path};
use dynadoc_engine::query::UpdateParts;
use dynadoc_engine::schema::point_lookup_fields;
use dynadoc_engine::wire::{
    BatchGetItemInput, BatchWriteItemInput, CreateGlobalSecondaryIndexAction,
    DeleteGlobalSecondaryIndexAction, DescribeTableInput, GlobalSecondaryIndexUpdate,
    UpdateTableInput,
};
use dynadoc_engine::{
    AttributeValue, Document, Error as EngineError, Item, PointLookup, PopulateSpec, Projection,
    QueryBuilder, Schema, WriteKind, ID_FIELD,
};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Rounds of unprocessed-key re-submission allowed per batch chunk.
const MAX_BATCH_ROUNDS: usize = 32;

/// Extra behaviour attached to a model at build time.
#[async_trait]
pub trait StaticMethod: Send + Sync {
    async fn call(&self, model: &Model, args: Value) -> Result<Value>;
}

/// Index changes made by [`Model::sync_indexes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexChanges {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
}

/// Builder for [`Model`].
pub struct ModelBuilder {
    name: String,
    schema: Schema,
    store: Arc<dyn KvStore>,
    config: StoreConfig,
    statics: BTreeMap<String, Arc<dyn StaticMethod>>,
}

impl ModelBuilder {
    /// Use `config` for table naming and scan page size.
    pub fn config(mut self, config: &StoreConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn static_method(
        mut self,
        name: impl Into<String>,
        method: impl StaticMethod + 'static,
    ) -> Self {
        self.statics.insert(name.into(), Arc::new(method));
        self
    }

    pub fn build(self) -> Model {
        Model {
            table: self.config.table_name(&self.name),
            name: self.name,
            schema: self.schema,
            store: self.store,
            scan_page_size: self.config.scan_page_size,
            statics: self.statics,
            registry: OnceLock::new(),
        }
    }
}

/// Data-access façade bound to one schema and table.
pub struct Model {
    name: String,
    table: String,
    schema: Schema,
    store: Arc<dyn KvStore>,
    scan_page_size: Option<u32>,
    statics: BTreeMap<String, Arc<dyn StaticMethod>>,
    registry: OnceLock<Weak<Registry>>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("indexes", &self.schema.indexes())
            .field("statics", &self.statics.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn db(operation: &'static str) -> impl Fn(StoreError) -> Error {
    move |source| Error::database(operation, source)
}

fn item_id(item: &Item) -> Option<String> {
    item.get(ID_FIELD)
        .and_then(AttributeValue::as_str)
        .map(str::to_string)
}

fn document_id(doc: &Document) -> Result<String> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::data_format("document has no string _id").into())
}

fn already_exists(id: &str) -> Error {
    EngineError::Permission(format!("document with _id \"{id}\" already exists")).into()
}

/// Equality used to confirm point-lookup candidates against the filter.
fn field_equals(doc: &Document, field: &str, expected: &Value) -> bool {
    match (get_path(doc, field), expected) {
        (None, Value::Null) => true,
        (Some(actual @ Value::Number(_)), Value::Number(_)) => {
            compare_values(Some(actual), Some(expected)) == Ordering::Equal
        }
        (Some(actual), _) => actual == expected,
        (None, _) => false,
    }
}

impl Model {
    pub fn builder(
        name: impl Into<String>,
        schema: Schema,
        store: Arc<dyn KvStore>,
    ) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            schema,
            store,
            config: StoreConfig::default(),
            statics: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// The registry this model was frozen into, if it is still alive.
    pub fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach(&self, registry: Weak<Registry>) {
        if self.registry.set(registry).is_err() {
            tracing::warn!(model = %self.name, "model is already part of a registry");
        }
    }

    fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.table, &self.schema)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create the backing table. An existing table is not an error.
    pub async fn init(&self) -> Result<()> {
        let input = self.schema.create_table_input(&self.table)?;
        match self.store.create_table(input).await {
            Ok(_) => {
                tracing::info!(model = %self.name, table = %self.table, "created table");
                Ok(())
            }
            Err(e) if e.is_resource_in_use() => {
                tracing::debug!(table = %self.table, "table already exists");
                Ok(())
            }
            Err(e) => Err(Error::database("createTable", e)),
        }
    }

    /// Bring the table's secondary indexes in line with the schema.
    ///
    /// Creates missing `<field>_1` indexes and deletes indexes no field
    /// declares, one `UpdateTable` request per change.
    pub async fn sync_indexes(&self) -> Result<IndexChanges> {
        let described = self
            .store
            .describe_table(DescribeTableInput {
                table_name: self.table.clone(),
            })
            .await
            .map_err(db("describeTable"))?;

        let existing: BTreeSet<String> = described
            .table
            .global_secondary_indexes
            .into_iter()
            .map(|index| index.index_name)
            .collect();
        let declared: BTreeMap<String, String> = self
            .schema
            .indexes()
            .iter()
            .map(|field| (Schema::index_name(field), field.clone()))
            .collect();
        let definitions = self.schema.attribute_definitions()?;

        let mut changes = IndexChanges::default();

        for (index_name, field) in &declared {
            if existing.contains(index_name) {
                continue;
            }
            let index = self.schema.global_secondary_index(field)?;
            let input = UpdateTableInput {
                table_name: self.table.clone(),
                attribute_definitions: definitions
                    .iter()
                    .filter(|d| &d.attribute_name == field)
                    .cloned()
                    .collect(),
                global_secondary_index_updates: vec![GlobalSecondaryIndexUpdate::Create(
                    CreateGlobalSecondaryIndexAction {
                        index_name: index.index_name,
                        key_schema: index.key_schema,
                        projection: index.projection,
                    },
                )],
            };
            self.store
                .update_table(input)
                .await
                .map_err(db("updateTable"))?;
            tracing::info!(table = %self.table, index = %index_name, "created index");
            changes.created.push(index_name.clone());
        }

        for index_name in existing {
            if declared.contains_key(&index_name) {
                continue;
            }
            let input = UpdateTableInput {
                table_name: self.table.clone(),
                attribute_definitions: Vec::new(),
                global_secondary_index_updates: vec![GlobalSecondaryIndexUpdate::Delete(
                    DeleteGlobalSecondaryIndexAction {
                        index_name: index_name.clone(),
                    },
                )],
            };
            self.store
                .update_table(input)
                .await
                .map_err(db("updateTable"))?;
            tracing::info!(table = %self.table, index = %index_name, "deleted index");
            changes.deleted.push(index_name);
        }

        Ok(changes)
    }

    /// Validate and default a document without writing it.
    pub fn validate(&self, doc: Document) -> Result<Document> {
        Ok(self.schema.validate(doc)?)
    }

    /// Run a static method attached when the model was built.
    pub async fn call_static(&self, name: &str, args: Value) -> Result<Value> {
        let method = self.statics.get(name).cloned().ok_or_else(|| {
            EngineError::NotImplemented(format!("{} has no static method '{name}'", self.name))
        })?;
        method.call(self, args).await
    }

    pub fn static_names(&self) -> impl Iterator<Item = &str> {
        self.statics.keys().map(String::as_str)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Find every document matching `filter`.
    ///
    /// `{_id: v}` and `{_id: {$in: [...]}}` are answered with batched point
    /// lookups; anything else scans. Without a sort the scan stops as soon as
    /// `skip + limit` documents are held. Never returns an error for an empty
    /// result.
    pub async fn find(
        &self,
        filter: &Document,
        projection: &Projection,
        options: &QueryOptions,
    ) -> Result<Vec<Document>> {
        let items = match PointLookup::from_filter(filter) {
            Some(lookup) => self.batch_get(lookup.ids).await?,
            None => {
                let bound = match (&options.sort, options.limit.filter(|&l| l > 0)) {
                    (None, Some(limit)) => Some(options.skip + limit),
                    _ => None,
                };
                self.scan_items(filter, bound).await?
            }
        };
        self.format_documents(items, projection, options).await
    }

    /// Find the first document matching `filter`.
    ///
    /// Filters made only of `_id` and indexed fields with scalar values use
    /// a key lookup or an index query; the candidates are then checked
    /// against the whole filter. Other filters scan.
    pub async fn find_one(
        &self,
        filter: &Document,
        projection: &Projection,
        options: &QueryOptions,
    ) -> Result<Option<Document>> {
        let options = QueryOptions {
            limit: Some(1),
            ..options.clone()
        };

        let Some(candidates) = self.point_candidates(filter).await? else {
            return Ok(self
                .find(filter, projection, &options)
                .await?
                .into_iter()
                .next());
        };

        let mut matched = Vec::new();
        for item in candidates {
            let doc = self.format_document(&item)?;
            if filter.iter().all(|(k, v)| field_equals(&doc, k, v)) {
                matched.push(item);
            }
        }
        Ok(self
            .format_documents(matched, projection, &options)
            .await?
            .into_iter()
            .next())
    }

    pub async fn find_by_id(
        &self,
        id: &str,
        projection: &Projection,
        options: &QueryOptions,
    ) -> Result<Option<Document>> {
        let mut filter = Document::new();
        filter.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        self.find_one(&filter, projection, options).await
    }

    /// Count matching documents without reading them.
    pub async fn count_documents(&self, filter: &Document) -> Result<u64> {
        if let Some(lookup) = PointLookup::from_filter(filter) {
            return Ok(self.batch_get(lookup.ids).await?.len() as u64);
        }

        let mut input = self.query().count(filter)?;
        input.limit = self.scan_page_size;
        let mut total = 0;
        loop {
            tracing::debug!(table = %self.table, "count scan");
            let page = self.store.scan(input.clone()).await.map_err(db("scan"))?;
            total += page.count;
            match page.last_evaluated_key {
                Some(key) => input.exclusive_start_key = Some(key),
                None => return Ok(total),
            }
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert documents that must not exist yet.
    ///
    /// All documents are validated before any request is sent. If any `_id`
    /// repeats within the call or already exists, nothing is written.
    /// Returns the inserted documents as read back from the store.
    pub async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>> {
        let docs = docs
            .into_iter()
            .map(|doc| self.schema.validate(doc))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(docs.len());
        let mut seen = BTreeSet::new();
        for doc in &docs {
            let id = document_id(doc)?;
            if !seen.insert(id.clone()) {
                return Err(already_exists(&id));
            }
            ids.push(id);
        }

        if let Some(existing) = self.batch_get(ids.clone()).await?.first() {
            return Err(already_exists(&item_id(existing).unwrap_or_default()));
        }

        let requests = self.query().batch_write(&docs, WriteKind::Put)?;
        self.write_batches(requests).await?;
        tracing::info!(table = %self.table, count = docs.len(), "inserted documents");

        let mut inserted = HashMap::with_capacity(ids.len());
        for item in self.batch_get(ids.clone()).await? {
            if let Some(id) = item_id(&item) {
                inserted.insert(id, self.format_document(&item)?);
            }
        }
        Ok(ids.iter().filter_map(|id| inserted.remove(id)).collect())
    }

    /// Insert one document with a conditional put.
    pub async fn insert_one(&self, doc: Document) -> Result<Document> {
        let doc = self.schema.validate(doc)?;
        let id = document_id(&doc)?;
        let input = self.query().put_new_item(&doc);
        let item = input.item.clone();

        match self.store.put_item(input).await {
            Ok(_) => {
                tracing::debug!(table = %self.table, id = %id, "inserted document");
                self.format_document(&item)
            }
            Err(e) if e.is_conditional_check_failed() => Err(already_exists(&id)),
            Err(e) => Err(Error::database("putItem", e)),
        }
    }

    /// Update the first document matching `filter`.
    ///
    /// Returns the updated document, or `None` when nothing matched.
    pub async fn update_one(&self, filter: &Document, update: &Document) -> Result<Option<Document>> {
        let parts = self.update_parts(update)?;
        let ids_only = Projection::Include(Vec::new());
        let Some(target) = self
            .find_one(filter, &ids_only, &QueryOptions::default())
            .await?
        else {
            return Ok(None);
        };
        self.update_by_id(&document_id(&target)?, &parts).await
    }

    /// Update every matching document, one request per document.
    ///
    /// Not atomic across documents. Returns the number of documents matched.
    pub async fn update_many(&self, filter: &Document, update: &Document) -> Result<usize> {
        let parts = self.update_parts(update)?;
        let ids = self.matching_ids(filter).await?;

        let updated = try_join_all(ids.iter().map(|id| self.update_by_id(id, &parts))).await?;
        tracing::info!(
            table = %self.table,
            matched = ids.len(),
            updated = updated.iter().filter(|doc| doc.is_some()).count(),
            "updated documents"
        );
        Ok(ids.len())
    }

    /// Delete every matching document. Returns how many were deleted.
    pub async fn delete_many(&self, filter: &Document) -> Result<usize> {
        if PointLookup::from_filter(filter).is_some() {
            let ids = self.matching_ids(filter).await?;
            self.delete_ids(&ids).await?;
            return Ok(ids.len());
        }

        let mut input = self.query().scan_ids(filter)?;
        input.limit = self.scan_page_size;
        let mut deleted = 0;
        loop {
            let page = self.store.scan(input.clone()).await.map_err(db("scan"))?;
            let ids: Vec<String> = page.items.iter().filter_map(item_id).collect();
            self.delete_ids(&ids).await?;
            deleted += ids.len();
            match page.last_evaluated_key {
                Some(key) => input.exclusive_start_key = Some(key),
                None => break,
            }
        }

        tracing::info!(table = %self.table, deleted, "deleted documents");
        Ok(deleted)
    }

    /// Delete the first matching document and return it.
    pub async fn delete_one(&self, filter: &Document) -> Result<Option<Document>> {
        let ids_only = Projection::Include(Vec::new());
        let Some(target) = self
            .find_one(filter, &ids_only, &QueryOptions::default())
            .await?
        else {
            return Ok(None);
        };

        let input = self.query().delete_item(&document_id(&target)?);
        let output = self
            .store
            .delete_item(input)
            .await
            .map_err(db("deleteItem"))?;
        output
            .attributes
            .map(|item| self.format_document(&item))
            .transpose()
    }

    // ------------------------------------------------------------------
    // Formatting
    // ------------------------------------------------------------------

    /// Decode one stored item and fill in literal defaults.
    pub fn format_document(&self, item: &Item) -> Result<Document> {
        Ok(format_item(&self.schema, item)?)
    }

    /// Turn stored items into result documents.
    ///
    /// Decodes and defaults each item, sorts, applies skip and limit,
    /// populates the requested references and finally projects.
    pub async fn format_documents(
        &self,
        items: Vec<Item>,
        projection: &Projection,
        options: &QueryOptions,
    ) -> Result<Vec<Document>> {
        let mut docs = items
            .iter()
            .map(|item| self.format_document(item))
            .collect::<Result<Vec<_>>>()?;

        if let Some(sort) = &options.sort {
            sort.sort(&mut docs);
        }
        let limit = options.limit.filter(|&l| l > 0).unwrap_or(usize::MAX);
        let mut docs: Vec<Document> = docs.into_iter().skip(options.skip).take(limit).collect();

        if !options.populate.is_empty() {
            self.populate(&mut docs, &options.populate).await?;
        }

        Ok(docs.into_iter().map(|doc| projection.apply(doc)).collect())
    }

    /// Resolve reference and virtual fields through the registry.
    fn populate<'a>(
        &'a self,
        docs: &'a mut [Document],
        fields: &'a [String],
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let registry = self.registry().ok_or_else(|| {
                EngineError::data_format(format!(
                    "model '{}' is not registered, cannot populate",
                    self.name
                ))
            })?;

            let mut lookups = Vec::new();
            for field in fields {
                let spec = self.schema.populate_spec(field).ok_or_else(|| {
                    EngineError::data_format(format!(
                        "'{field}' is not a reference of {}",
                        self.name
                    ))
                })?;
                let target = registry.model(&spec.reference).ok_or_else(|| {
                    EngineError::data_format(format!("no model registered as '{}'", spec.reference))
                })?;

                for (index, doc) in docs.iter().enumerate() {
                    let local = doc.get(&spec.local_field).cloned().unwrap_or(Value::Null);
                    let lookup = resolve_reference(target.clone(), spec.clone(), local);
                    lookups.push(lookup.map(move |value| value.map(|v| (index, field, v))));
                }
            }

            for (index, field, value) in try_join_all(lookups).await? {
                docs[index].insert(field.clone(), value);
            }
            Ok(())
        }
        .boxed()
    }

    // ------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------

    fn update_parts(&self, update: &Document) -> Result<UpdateParts> {
        let mut parts = UpdateParts::parse(update)?;
        parts.set = self.schema.validate_update(std::mem::take(&mut parts.set))?;
        self.schema.validate_update(parts.inc.clone())?;
        Ok(parts)
    }

    async fn update_by_id(&self, id: &str, parts: &UpdateParts) -> Result<Option<Document>> {
        if parts.is_empty() {
            tracing::debug!(table = %self.table, id, "empty update, nothing to send");
            return self
                .find_by_id(id, &Projection::All, &QueryOptions::default())
                .await;
        }

        let input = self.query().update_item(id, parts);
        match self.store.update_item(input).await {
            Ok(output) => output
                .attributes
                .map(|item| self.format_document(&item))
                .transpose(),
            Err(e) if e.is_conditional_check_failed() => Ok(None),
            Err(e) => Err(Error::database("updateItem", e)),
        }
    }

    /// Candidate items for filters answerable by key or index lookups.
    async fn point_candidates(&self, filter: &Document) -> Result<Option<Vec<Item>>> {
        let lookup_fields = point_lookup_fields(&self.schema);
        let eligible = !filter.is_empty()
            && filter.iter().all(|(field, value)| {
                lookup_fields.contains(field.as_str())
                    && matches!(value, Value::String(_) | Value::Number(_))
            });
        if !eligible {
            return Ok(None);
        }

        if let Some(id) = filter.get(ID_FIELD) {
            let Some(id) = id.as_str() else {
                return Ok(None);
            };
            let input = self.query().get_item(id);
            let output = self.store.get_item(input).await.map_err(db("getItem"))?;
            return Ok(Some(output.item.into_iter().collect()));
        }

        let Some((field, value)) = filter.iter().next() else {
            return Ok(None);
        };
        let ids = self.index_ids(field, value).await?;
        Ok(Some(self.batch_get(ids).await?))
    }

    /// Identifiers of documents whose indexed `field` equals `value`.
    async fn index_ids(&self, field: &str, value: &Value) -> Result<Vec<String>> {
        let mut input = self.query().index_query(field, value)?;
        let mut ids = Vec::new();
        loop {
            tracing::debug!(table = %self.table, index = ?input.index_name, "index query");
            let page = self.store.query(input.clone()).await.map_err(db("query"))?;
            ids.extend(page.items.iter().filter_map(item_id));
            match page.last_evaluated_key {
                Some(key) => input.exclusive_start_key = Some(key),
                None => return Ok(ids),
            }
        }
    }

    async fn matching_ids(&self, filter: &Document) -> Result<Vec<String>> {
        if let Some(lookup) = PointLookup::from_filter(filter) {
            let items = self.batch_get(lookup.ids).await?;
            return Ok(items.iter().filter_map(item_id).collect());
        }

        let mut input = self.query().scan_ids(filter)?;
        input.limit = self.scan_page_size;
        let mut ids = Vec::new();
        loop {
            let page = self.store.scan(input.clone()).await.map_err(db("scan"))?;
            ids.extend(page.items.iter().filter_map(item_id));
            match page.last_evaluated_key {
                Some(key) => input.exclusive_start_key = Some(key),
                None => return Ok(ids),
            }
        }
    }

    /// Follow scan continuation tokens until exhausted or `bound` items are held.
    async fn scan_items(&self, filter: &Document, bound: Option<usize>) -> Result<Vec<Item>> {
        let mut input = self.query().scan(filter)?;
        input.limit = self.scan_page_size;

        let mut items = Vec::new();
        let mut pages = 0usize;
        loop {
            pages += 1;
            tracing::debug!(table = %self.table, page = pages, "scan");
            let page = self.store.scan(input.clone()).await.map_err(db("scan"))?;
            items.extend(page.items);

            if bound.is_some_and(|b| items.len() >= b) {
                break;
            }
            match page.last_evaluated_key {
                Some(key) => input.exclusive_start_key = Some(key),
                None => break,
            }
        }

        tracing::debug!(table = %self.table, pages, items = items.len(), "scan finished");
        Ok(items)
    }

    /// Batched point lookups of distinct identifiers, chunks fetched concurrently.
    async fn batch_get(&self, ids: Vec<String>) -> Result<Vec<Item>> {
        let mut seen = BTreeSet::new();
        let ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();

        let requests = self.query().batch_get(&ids);
        let chunks = try_join_all(
            requests
                .into_iter()
                .enumerate()
                .map(|(chunk, input)| self.batch_get_chunk(chunk, input)),
        )
        .await?;
        Ok(chunks.into_iter().flatten().collect())
    }

    async fn batch_get_chunk(&self, chunk: usize, mut input: BatchGetItemInput) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for round in 0..MAX_BATCH_ROUNDS {
            tracing::debug!(table = %self.table, chunk, round, "batch get");
            let mut output = self
                .store
                .batch_get_item(input)
                .await
                .map_err(db("batchGetItem"))?;
            items.extend(output.responses.remove(&self.table).unwrap_or_default());

            if output.unprocessed_keys.is_empty() {
                return Ok(items);
            }
            let pending: usize = output.unprocessed_keys.values().map(|k| k.keys.len()).sum();
            tracing::warn!(table = %self.table, chunk, pending, "re-submitting unprocessed keys");
            input = BatchGetItemInput {
                request_items: output.unprocessed_keys,
            };
        }
        Err(Error::database(
            "batchGetItem",
            StoreError::service(
                StoreError::UNPROCESSED,
                format!("keys still unprocessed after {MAX_BATCH_ROUNDS} rounds"),
            ),
        ))
    }

    async fn write_batches(&self, requests: Vec<BatchWriteItemInput>) -> Result<()> {
        try_join_all(
            requests
                .into_iter()
                .enumerate()
                .map(|(chunk, input)| self.write_chunk(chunk, input)),
        )
        .await?;
        Ok(())
    }

    async fn write_chunk(&self, chunk: usize, mut input: BatchWriteItemInput) -> Result<()> {
        for round in 0..MAX_BATCH_ROUNDS {
            tracing::debug!(table = %self.table, chunk, round, "batch write");
            let output = self
                .store
                .batch_write_item(input)
                .await
                .map_err(db("batchWriteItem"))?;

            if output.unprocessed_items.is_empty() {
                return Ok(());
            }
            let pending: usize = output.unprocessed_items.values().map(Vec::len).sum();
            tracing::warn!(table = %self.table, chunk, pending, "re-submitting unprocessed items");
            input = BatchWriteItemInput {
                request_items: output.unprocessed_items,
            };
        }
        Err(Error::database(
            "batchWriteItem",
            StoreError::service(
                StoreError::UNPROCESSED,
                format!("items still unprocessed after {MAX_BATCH_ROUNDS} rounds"),
            ),
        ))
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        let docs: Vec<Document> = ids
            .iter()
            .map(|id| {
                let mut doc = Document::new();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                doc
            })
            .collect();
        let requests = self.query().batch_write(&docs, WriteKind::Delete)?;
        self.write_batches(requests).await
    }
}

/// Look up the document(s) a reference points at.
async fn resolve_reference(target: Arc<Model>, spec: PopulateSpec, local: Value) -> Result<Value> {
    if local.is_null() {
        return Ok(if spec.just_one {
            Value::Null
        } else {
            Value::Array(Vec::new())
        });
    }

    let condition = match local {
        Value::Array(values) => json!({ "$in": values }),
        value => value,
    };
    let mut filter = Document::new();
    filter.insert(spec.foreign_field.clone(), condition);

    let options = QueryOptions::default();
    if spec.just_one {
        Ok(target
            .find_one(&filter, &Projection::All, &options)
            .await?
            .map(Value::Object)
            .unwrap_or(Value::Null))
    } else {
        Ok(Value::Array(
            target
                .find(&filter, &Projection::All, &options)
                .await?
                .into_iter()
                .map(Value::Object)
                .collect(),
        ))
    }
}
