//! JSON-over-HTTP store client.
//!
//! Every operation is a `POST` of the request body to the configured
//! endpoint with the operation named in the `X-Amz-Target` header. Requests
//! are not signed: point the client at a local emulator or a signing proxy.

use super::{KvStore, StoreResult};
use crate::config::StoreConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use dynadoc_engine::wire::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    CreateTableInput, CreateTableOutput, DeleteItemInput, DeleteItemOutput, DescribeTableInput,
    DescribeTableOutput, GetItemInput, GetItemOutput, ListTablesInput, ListTablesOutput,
    PutItemInput, PutItemOutput, QueryInput, QueryOutput, ScanInput, ScanOutput,
    UpdateItemInput, UpdateItemOutput, UpdateTableInput, UpdateTableOutput,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const TARGET_PREFIX: &str = "DynamoDB_20120810";
const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.0";

/// Error body returned by the store.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Store client speaking the JSON protocol over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
    region: String,
}

impl HttpStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(auth) = &config.authorization {
            let value = HeaderValue::from_str(auth).map_err(|_| {
                StoreError::service(StoreError::VALIDATION, "invalid authorization header")
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<I, O>(&self, operation: &str, input: &I) -> StoreResult<O>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        tracing::debug!(operation, endpoint = %self.endpoint, "store request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .header("X-Dynadoc-Region", &self.region)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(serde_json::to_vec(input)?)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(serde_json::from_slice(&body)?);
        }

        let error: ErrorBody = serde_json::from_slice(&body).unwrap_or(ErrorBody {
            kind: format!("HttpStatus{}", status.as_u16()),
            message: String::from_utf8_lossy(&body).into_owned(),
        });
        Err(StoreError::service(error_code(&error.kind), error.message))
    }
}

/// `com.amazonaws.dynamodb.v20120810#ResourceInUseException` → `ResourceInUseException`
fn error_code(kind: &str) -> String {
    kind.rsplit('#').next().unwrap_or(kind).to_string()
}

#[async_trait]
impl KvStore for HttpStore {
    async fn create_table(&self, input: CreateTableInput) -> StoreResult<CreateTableOutput> {
        self.call("CreateTable", &input).await
    }

    async fn describe_table(&self, input: DescribeTableInput) -> StoreResult<DescribeTableOutput> {
        self.call("DescribeTable", &input).await
    }

    async fn list_tables(&self, input: ListTablesInput) -> StoreResult<ListTablesOutput> {
        self.call("ListTables", &input).await
    }

    async fn update_table(&self, input: UpdateTableInput) -> StoreResult<UpdateTableOutput> {
        self.call("UpdateTable", &input).await
    }

    async fn get_item(&self, input: GetItemInput) -> StoreResult<GetItemOutput> {
        self.call("GetItem", &input).await
    }

    async fn put_item(&self, input: PutItemInput) -> StoreResult<PutItemOutput> {
        self.call("PutItem", &input).await
    }

    async fn delete_item(&self, input: DeleteItemInput) -> StoreResult<DeleteItemOutput> {
        self.call("DeleteItem", &input).await
    }

    async fn update_item(&self, input: UpdateItemInput) -> StoreResult<UpdateItemOutput> {
        self.call("UpdateItem", &input).await
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> StoreResult<BatchGetItemOutput> {
        self.call("BatchGetItem", &input).await
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> StoreResult<BatchWriteItemOutput> {
        self.call("BatchWriteItem", &input).await
    }

    async fn scan(&self, input: ScanInput) -> StoreResult<ScanOutput> {
        self.call("Scan", &input).await
    }

    async fn query(&self, input: QueryInput) -> StoreResult<QueryOutput> {
        self.call("Query", &input).await
    }
}
