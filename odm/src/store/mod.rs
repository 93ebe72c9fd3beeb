//! Store clients.
//!
//! [`KvStore`] is the seam between models and the remote key-value store:
//! one method per protocol operation, request and response bodies taken
//! verbatim from [`dynadoc_engine::wire`].

mod expr;
mod http;
mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use async_trait::async_trait;
use dynadoc_engine::wire::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    CreateTableInput, CreateTableOutput, DeleteItemInput, DeleteItemOutput, DescribeTableInput,
    DescribeTableOutput, GetItemInput, GetItemOutput, ListTablesInput, ListTablesOutput,
    PutItemInput, PutItemOutput, QueryInput, QueryOutput, ScanInput, ScanOutput,
    UpdateItemInput, UpdateItemOutput, UpdateTableInput, UpdateTableOutput,
};

/// Result of a single store request.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Request/response client for the key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn create_table(&self, input: CreateTableInput) -> StoreResult<CreateTableOutput>;

    async fn describe_table(&self, input: DescribeTableInput) -> StoreResult<DescribeTableOutput>;

    async fn list_tables(&self, input: ListTablesInput) -> StoreResult<ListTablesOutput>;

    async fn update_table(&self, input: UpdateTableInput) -> StoreResult<UpdateTableOutput>;

    async fn get_item(&self, input: GetItemInput) -> StoreResult<GetItemOutput>;

    async fn put_item(&self, input: PutItemInput) -> StoreResult<PutItemOutput>;

    async fn delete_item(&self, input: DeleteItemInput) -> StoreResult<DeleteItemOutput>;

    async fn update_item(&self, input: UpdateItemInput) -> StoreResult<UpdateItemOutput>;

    async fn batch_get_item(&self, input: BatchGetItemInput) -> StoreResult<BatchGetItemOutput>;

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> StoreResult<BatchWriteItemOutput>;

    async fn scan(&self, input: ScanInput) -> StoreResult<ScanOutput>;

    async fn query(&self, input: QueryInput) -> StoreResult<QueryOutput>;
}
