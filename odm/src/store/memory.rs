//! In-process store.
//!
//! Keeps every table in memory and evaluates expressions locally. Behaves
//! like the remote store where models can observe it: batch limits, scan
//! pagination, sparse keys-only indexes, conditional writes and error codes.

use super::expr::{self, Condition};
use super::{KvStore, StoreResult};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use dynadoc_engine::wire::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    CreateTableInput, CreateTableOutput, DeleteItemInput, DeleteItemOutput, DescribeTableInput,
    DescribeTableOutput, GetItemInput, GetItemOutput, GlobalSecondaryIndex,
    GlobalSecondaryIndexUpdate, IndexDescription, KeySchemaElement, KeyType, KeysAndAttributes,
    ListTablesInput, ListTablesOutput, ProjectionType, PutItemInput, PutItemOutput, QueryInput,
    QueryOutput, ReturnValue, ScanInput, ScanOutput, Select, TableDescription, UpdateItemInput,
    UpdateItemOutput, UpdateTableInput, UpdateTableOutput, WriteRequest,
};
use dynadoc_engine::{AttributeValue, Item, Key, BATCH_LIMIT};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
struct Table {
    hash_key: String,
    indexes: BTreeMap<String, GlobalSecondaryIndex>,
    items: BTreeMap<String, Item>,
}

impl Table {
    fn describe(&self, name: &str) -> TableDescription {
        TableDescription {
            table_name: name.to_string(),
            table_status: Some("ACTIVE".to_string()),
            item_count: Some(self.items.len() as u64),
            global_secondary_indexes: self
                .indexes
                .keys()
                .map(|index_name| IndexDescription {
                    index_name: index_name.clone(),
                })
                .collect(),
        }
    }

    fn key_of(&self, key: &Key) -> StoreResult<String> {
        if key.len() != 1 {
            return Err(invalid("the provided key element does not match the schema"));
        }
        match key.get(&self.hash_key) {
            Some(AttributeValue::String(s)) => Ok(format!("S:{s}")),
            Some(AttributeValue::Number(n)) => Ok(format!("N:{n}")),
            _ => Err(invalid("the provided key element does not match the schema")),
        }
    }

    fn key_of_item(&self, item: &Item) -> StoreResult<String> {
        let value = item.get(&self.hash_key).ok_or_else(|| {
            invalid(format!("missing the key {} in the item", self.hash_key))
        })?;
        self.key_of(&Key::from([(self.hash_key.clone(), value.clone())]))
    }

    fn primary_key(&self, item: &Item) -> Option<Key> {
        item.get(&self.hash_key)
            .map(|v| Key::from([(self.hash_key.clone(), v.clone())]))
    }

    /// Items visible through `index_name`, or the whole table.
    fn view(&self, index_name: Option<&str>) -> StoreResult<Vec<(String, Item)>> {
        let Some(index_name) = index_name else {
            return Ok(self
                .items
                .iter()
                .map(|(k, item)| (k.clone(), item.clone()))
                .collect());
        };
        let index = self.indexes.get(index_name).ok_or_else(|| {
            invalid(format!(
                "the table does not have the specified index: {index_name}"
            ))
        })?;

        let key_attributes: BTreeSet<&str> = index
            .key_schema
            .iter()
            .map(|k| k.attribute_name.as_str())
            .chain(std::iter::once(self.hash_key.as_str()))
            .collect();
        let keys_only = index.projection.projection_type == ProjectionType::KeysOnly;

        Ok(self
            .items
            .iter()
            .filter(|(_, item)| {
                index
                    .key_schema
                    .iter()
                    .all(|k| item.contains_key(&k.attribute_name))
            })
            .map(|(k, item)| {
                let item = if keys_only {
                    item.iter()
                        .filter(|(name, _)| key_attributes.contains(name.as_str()))
                        .map(|(name, v)| (name.clone(), v.clone()))
                        .collect()
                } else {
                    item.clone()
                };
                (k.clone(), item)
            })
            .collect())
    }
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::service(StoreError::VALIDATION, message)
}

fn not_found(table: &str) -> StoreError {
    StoreError::service(
        StoreError::RESOURCE_NOT_FOUND,
        format!("Requested resource not found: Table: {table} not found"),
    )
}

fn condition_failed() -> StoreError {
    StoreError::service(
        StoreError::CONDITIONAL_CHECK_FAILED,
        "The conditional request failed",
    )
}

/// Store that keeps all tables in process memory.
///
/// Cheap to construct; share it behind an `Arc` like any other store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, Table>,
    page_size: Option<u32>,
    batch_capacity: Option<usize>,
    requests: DashMap<&'static str, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap every scan and query page at `size` evaluated items.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Process at most `capacity` requests per batch call and return the rest
    /// as unprocessed.
    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = Some(capacity.max(1));
        self
    }

    /// Number of `operation` requests served so far, e.g. `"BatchGetItem"`.
    pub fn request_count(&self, operation: &str) -> usize {
        self.requests.get(operation).map(|n| *n).unwrap_or(0)
    }

    /// Number of items currently stored in `table`.
    pub fn item_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.items.len()).unwrap_or(0)
    }

    fn record(&self, operation: &'static str) {
        *self.requests.entry(operation).or_default() += 1;
        tracing::trace!(operation, "memory store request");
    }

    fn create_table_sync(&self, input: CreateTableInput) -> StoreResult<CreateTableOutput> {
        let hash_key = input
            .key_schema
            .iter()
            .find(|k| k.key_type == KeyType::Hash)
            .map(|k| k.attribute_name.clone())
            .ok_or_else(|| invalid("key schema must contain a HASH key"))?;

        let mut indexes = BTreeMap::new();
        for index in input.global_secondary_indexes {
            check_index_attributes(&index.key_schema, &input.attribute_definitions)?;
            indexes.insert(index.index_name.clone(), index);
        }

        let table = Table {
            hash_key,
            indexes,
            items: BTreeMap::new(),
        };

        match self.tables.entry(input.table_name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::service(
                StoreError::RESOURCE_IN_USE,
                format!("Table already exists: {}", input.table_name),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let description = table.describe(&input.table_name);
                slot.insert(table);
                Ok(CreateTableOutput {
                    table_description: description,
                })
            }
        }
    }

    fn update_table_sync(&self, input: UpdateTableInput) -> StoreResult<UpdateTableOutput> {
        let mut table = self
            .tables
            .get_mut(&input.table_name)
            .ok_or_else(|| not_found(&input.table_name))?;

        for update in input.global_secondary_index_updates {
            match update {
                GlobalSecondaryIndexUpdate::Create(action) => {
                    if table.indexes.contains_key(&action.index_name) {
                        return Err(invalid(format!(
                            "attempting to create an index which already exists: {}",
                            action.index_name
                        )));
                    }
                    check_index_attributes(&action.key_schema, &input.attribute_definitions)?;
                    table.indexes.insert(
                        action.index_name.clone(),
                        GlobalSecondaryIndex {
                            index_name: action.index_name,
                            key_schema: action.key_schema,
                            projection: action.projection,
                        },
                    );
                }
                GlobalSecondaryIndexUpdate::Delete(action) => {
                    if table.indexes.remove(&action.index_name).is_none() {
                        return Err(StoreError::service(
                            StoreError::RESOURCE_NOT_FOUND,
                            format!("index not found: {}", action.index_name),
                        ));
                    }
                }
            }
        }

        Ok(UpdateTableOutput {
            table_description: table.describe(&input.table_name),
        })
    }

    fn put_item_sync(&self, input: PutItemInput) -> StoreResult<PutItemOutput> {
        let mut table = self
            .tables
            .get_mut(&input.table_name)
            .ok_or_else(|| not_found(&input.table_name))?;
        let key = table.key_of_item(&input.item)?;

        if let Some(condition) = &input.condition_expression {
            let condition = expr::parse_condition(
                condition,
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;
            let existing = table.items.get(&key).cloned().unwrap_or_default();
            if !condition.matches(&existing) {
                return Err(condition_failed());
            }
        }

        table.items.insert(key, input.item);
        Ok(PutItemOutput::default())
    }

    fn delete_item_sync(&self, input: DeleteItemInput) -> StoreResult<DeleteItemOutput> {
        let mut table = self
            .tables
            .get_mut(&input.table_name)
            .ok_or_else(|| not_found(&input.table_name))?;
        let key = table.key_of(&input.key)?;
        let old = table.items.remove(&key);

        Ok(DeleteItemOutput {
            attributes: match input.return_values {
                Some(ReturnValue::AllOld) => old,
                _ => None,
            },
        })
    }

    fn update_item_sync(&self, input: UpdateItemInput) -> StoreResult<UpdateItemOutput> {
        let mut table = self
            .tables
            .get_mut(&input.table_name)
            .ok_or_else(|| not_found(&input.table_name))?;
        let key = table.key_of(&input.key)?;
        let existing = table.items.get(&key).cloned();

        if let Some(condition) = &input.condition_expression {
            let condition = expr::parse_condition(
                condition,
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;
            if !condition.matches(existing.as_ref().unwrap_or(&Item::new())) {
                return Err(condition_failed());
            }
        }

        let update = expr::parse_update(
            &input.update_expression,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;

        let mut item = existing.clone().unwrap_or_else(|| input.key.clone());
        update.apply(&mut item)?;
        if table.key_of_item(&item)? != key {
            return Err(invalid("cannot update attribute that is part of the key"));
        }

        let attributes = match input.return_values {
            ReturnValue::AllNew => Some(item.clone()),
            ReturnValue::AllOld => existing,
            ReturnValue::None => None,
        };
        table.items.insert(key, item);

        Ok(UpdateItemOutput { attributes })
    }

    fn batch_get_sync(&self, input: BatchGetItemInput) -> StoreResult<BatchGetItemOutput> {
        let total: usize = input.request_items.values().map(|r| r.keys.len()).sum();
        if total > BATCH_LIMIT {
            return Err(invalid(format!(
                "too many items requested for the BatchGetItem call: {total}"
            )));
        }

        let mut budget = self.batch_capacity.unwrap_or(usize::MAX);
        let mut output = BatchGetItemOutput::default();

        for (table_name, request) in input.request_items {
            let table = self
                .tables
                .get(&table_name)
                .ok_or_else(|| not_found(&table_name))?;

            let mut seen = BTreeSet::new();
            let mut unprocessed = Vec::new();
            let responses = output.responses.entry(table_name.clone()).or_default();

            for key in request.keys {
                let id = table.key_of(&key)?;
                if !seen.insert(id.clone()) {
                    return Err(invalid("provided list of item keys contains duplicates"));
                }
                if budget == 0 {
                    unprocessed.push(key);
                    continue;
                }
                budget -= 1;
                if let Some(item) = table.items.get(&id) {
                    responses.push(item.clone());
                }
            }

            if !unprocessed.is_empty() {
                output.unprocessed_keys.insert(
                    table_name,
                    KeysAndAttributes {
                        keys: unprocessed,
                        consistent_read: request.consistent_read,
                    },
                );
            }
        }

        Ok(output)
    }

    fn batch_write_sync(&self, input: BatchWriteItemInput) -> StoreResult<BatchWriteItemOutput> {
        let total: usize = input.request_items.values().map(Vec::len).sum();
        if total == 0 || total > BATCH_LIMIT {
            return Err(invalid(format!(
                "member must have length between 1 and {BATCH_LIMIT}, got {total}"
            )));
        }

        let mut budget = self.batch_capacity.unwrap_or(usize::MAX);
        let mut output = BatchWriteItemOutput::default();

        for (table_name, requests) in input.request_items {
            let mut table = self
                .tables
                .get_mut(&table_name)
                .ok_or_else(|| not_found(&table_name))?;

            let mut keyed = Vec::with_capacity(requests.len());
            let mut seen = BTreeSet::new();
            for request in requests {
                let id = match &request {
                    WriteRequest::PutRequest(put) => table.key_of_item(&put.item)?,
                    WriteRequest::DeleteRequest(delete) => table.key_of(&delete.key)?,
                };
                if !seen.insert(id.clone()) {
                    return Err(invalid("provided list of item keys contains duplicates"));
                }
                keyed.push((id, request));
            }

            let mut unprocessed = Vec::new();
            for (id, request) in keyed {
                if budget == 0 {
                    unprocessed.push(request);
                    continue;
                }
                budget -= 1;
                match request {
                    WriteRequest::PutRequest(put) => {
                        table.items.insert(id, put.item);
                    }
                    WriteRequest::DeleteRequest(_) => {
                        table.items.remove(&id);
                    }
                }
            }

            if !unprocessed.is_empty() {
                output.unprocessed_items.insert(table_name, unprocessed);
            }
        }

        Ok(output)
    }

    /// Shared page walk for scans and queries.
    #[allow(clippy::too_many_arguments)]
    fn page(
        &self,
        table_name: &str,
        index_name: Option<&str>,
        key_condition: Option<&Condition>,
        filter: Option<&Condition>,
        projection: Option<&[expr::Path]>,
        limit: Option<u32>,
        exclusive_start_key: Option<&Key>,
        count_only: bool,
    ) -> StoreResult<ScanOutput> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| not_found(table_name))?;

        let start = exclusive_start_key.map(|k| table.key_of(k)).transpose()?;
        let limit = match (limit, self.page_size) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
        .map(|n| n as usize);

        let mut output = ScanOutput::default();
        let mut last_key = None;

        for (id, item) in table.view(index_name)? {
            if start.as_ref().is_some_and(|s| &id <= s) {
                continue;
            }
            if key_condition.is_some_and(|c| !c.matches(&item)) {
                continue;
            }
            if limit.is_some_and(|l| output.scanned_count as usize >= l) {
                break;
            }

            output.scanned_count += 1;
            last_key = table.primary_key(&item);

            if filter.is_some_and(|f| !f.matches(&item)) {
                continue;
            }
            output.count += 1;
            if !count_only {
                output.items.push(match projection {
                    Some(paths) => expr::project(&item, paths),
                    None => item,
                });
            }
        }

        if limit.is_some_and(|l| output.scanned_count as usize >= l) {
            output.last_evaluated_key = last_key;
        }
        Ok(output)
    }

    fn scan_sync(&self, input: ScanInput) -> StoreResult<ScanOutput> {
        let names = &input.expression_attribute_names;
        let values = &input.expression_attribute_values;

        let filter = input
            .filter_expression
            .as_deref()
            .map(|f| expr::parse_condition(f, names, values))
            .transpose()?;
        let projection = input
            .projection_expression
            .as_deref()
            .map(|p| expr::parse_projection(p, names))
            .transpose()?;

        self.page(
            &input.table_name,
            input.index_name.as_deref(),
            None,
            filter.as_ref(),
            projection.as_deref(),
            input.limit,
            input.exclusive_start_key.as_ref(),
            input.select == Some(Select::Count),
        )
    }

    fn query_sync(&self, input: QueryInput) -> StoreResult<QueryOutput> {
        let condition = expr::parse_condition(
            &input.key_condition_expression,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;

        self.page(
            &input.table_name,
            input.index_name.as_deref(),
            Some(&condition),
            None,
            None,
            input.limit,
            input.exclusive_start_key.as_ref(),
            false,
        )
    }
}

fn check_index_attributes(
    key_schema: &[KeySchemaElement],
    definitions: &[dynadoc_engine::wire::AttributeDefinition],
) -> StoreResult<()> {
    for element in key_schema {
        if !definitions
            .iter()
            .any(|d| d.attribute_name == element.attribute_name)
        {
            return Err(invalid(format!(
                "index key attribute {} has no attribute definition",
                element.attribute_name
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn create_table(&self, input: CreateTableInput) -> StoreResult<CreateTableOutput> {
        self.record("CreateTable");
        self.create_table_sync(input)
    }

    async fn describe_table(&self, input: DescribeTableInput) -> StoreResult<DescribeTableOutput> {
        self.record("DescribeTable");
        let table = self
            .tables
            .get(&input.table_name)
            .ok_or_else(|| not_found(&input.table_name))?;
        Ok(DescribeTableOutput {
            table: table.describe(&input.table_name),
        })
    }

    async fn list_tables(&self, input: ListTablesInput) -> StoreResult<ListTablesOutput> {
        self.record("ListTables");
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        if let Some(start) = &input.exclusive_start_table_name {
            names.retain(|n| n > start);
        }

        let mut last_evaluated_table_name = None;
        if let Some(limit) = input.limit.map(|l| l as usize) {
            if names.len() > limit {
                names.truncate(limit);
                last_evaluated_table_name = names.last().cloned();
            }
        }

        Ok(ListTablesOutput {
            table_names: names,
            last_evaluated_table_name,
        })
    }

    async fn update_table(&self, input: UpdateTableInput) -> StoreResult<UpdateTableOutput> {
        self.record("UpdateTable");
        self.update_table_sync(input)
    }

    async fn get_item(&self, input: GetItemInput) -> StoreResult<GetItemOutput> {
        self.record("GetItem");
        let table = self
            .tables
            .get(&input.table_name)
            .ok_or_else(|| not_found(&input.table_name))?;
        let key = table.key_of(&input.key)?;
        Ok(GetItemOutput {
            item: table.items.get(&key).cloned(),
        })
    }

    async fn put_item(&self, input: PutItemInput) -> StoreResult<PutItemOutput> {
        self.record("PutItem");
        self.put_item_sync(input)
    }

    async fn delete_item(&self, input: DeleteItemInput) -> StoreResult<DeleteItemOutput> {
        self.record("DeleteItem");
        self.delete_item_sync(input)
    }

    async fn update_item(&self, input: UpdateItemInput) -> StoreResult<UpdateItemOutput> {
        self.record("UpdateItem");
        self.update_item_sync(input)
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> StoreResult<BatchGetItemOutput> {
        self.record("BatchGetItem");
        self.batch_get_sync(input)
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> StoreResult<BatchWriteItemOutput> {
        self.record("BatchWriteItem");
        self.batch_write_sync(input)
    }

    async fn scan(&self, input: ScanInput) -> StoreResult<ScanOutput> {
        self.record("Scan");
        self.scan_sync(input)
    }

    async fn query(&self, input: QueryInput) -> StoreResult<QueryOutput> {
        self.record("Query");
        self.query_sync(input)
    }
}
