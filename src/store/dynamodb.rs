//! DynamoDB store
//!
//! Maps [`KeyValueStore`] one-to-one onto DynamoDB operations. The secondary
//! index is created as a global secondary index with full projection and the
//! same provisioned throughput as the table.

use super::{
    BatchGetOutput, BatchWriteOutput, IndexQuery, Item, Key, KeyValueStore, QueryOutput,
    StoreError, StoreLimits, TableSchema, WriteRequest,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, DeleteRequest, GlobalSecondaryIndex, KeySchemaElement,
    KeyType, KeysAndAttributes, Projection, ProjectionType, ProvisionedThroughput, PutRequest,
    ScalarAttributeType, WriteRequest as DynamoWriteRequest,
};
use aws_sdk_dynamodb::Client;
use serde_json::{Number, Value};
use std::collections::HashMap;

type DynamoItem = HashMap<String, AttributeValue>;

/// DynamoDB connection settings
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConfig {
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. DynamoDB Local)
    pub endpoint: Option<String>,
}

/// DynamoDB-backed [`KeyValueStore`]
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
}

impl std::fmt::Debug for DynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStore").finish_non_exhaustive()
    }
}

impl DynamoDbStore {
    /// Build a client from shared SDK configuration plus overrides
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Load SDK configuration from the environment and build a client
    pub async fn from_env(config: DynamoDbConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(&sdk_config, config)
    }

    /// Wrap a pre-built client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

// ============================================================================
// Attribute conversion
// ============================================================================

fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(to_dynamo_item(map)),
    }
}

fn from_attribute(value: &AttributeValue) -> Result<Value, StoreError> {
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => {
            let number: Number = n
                .parse()
                .map_err(|e| StoreError::dynamodb(format!("invalid number {}: {}", n, e)))?;
            Value::Number(number)
        }
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        AttributeValue::M(map) => Value::Object(from_dynamo_item(map)?),
        AttributeValue::Ss(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
        other => {
            return Err(StoreError::dynamodb(format!(
                "unsupported attribute type: {:?}",
                other
            )))
        }
    })
}

fn to_dynamo_item(item: &Item) -> DynamoItem {
    item.iter()
        .map(|(k, v)| (k.clone(), to_attribute(v)))
        .collect()
}

fn from_dynamo_item(item: &DynamoItem) -> Result<Item, StoreError> {
    item.iter()
        .map(|(k, v)| Ok((k.clone(), from_attribute(v)?)))
        .collect()
}

fn to_dynamo_key(key: &Key) -> DynamoItem {
    HashMap::from([(key.attribute.clone(), AttributeValue::S(key.value.clone()))])
}

fn from_dynamo_key(key: &DynamoItem) -> Option<Key> {
    key.iter()
        .next()
        .and_then(|(k, v)| v.as_s().ok().map(|s| Key::new(k.clone(), s.clone())))
}

fn to_write_request(request: &WriteRequest) -> Result<DynamoWriteRequest, StoreError> {
    let built = match request {
        WriteRequest::Put(item) => {
            let put = PutRequest::builder()
                .set_item(Some(to_dynamo_item(item)))
                .build()
                .map_err(|e| StoreError::dynamodb(e.to_string()))?;
            DynamoWriteRequest::builder().put_request(put).build()
        }
        WriteRequest::Delete(key) => {
            let delete = DeleteRequest::builder()
                .set_key(Some(to_dynamo_key(key)))
                .build()
                .map_err(|e| StoreError::dynamodb(e.to_string()))?;
            DynamoWriteRequest::builder().delete_request(delete).build()
        }
    };
    Ok(built)
}

fn from_write_request(request: &DynamoWriteRequest) -> Result<Option<WriteRequest>, StoreError> {
    if let Some(put) = &request.put_request {
        return Ok(Some(WriteRequest::Put(from_dynamo_item(&put.item)?)));
    }
    Ok(request
        .delete_request
        .as_ref()
        .and_then(|delete| from_dynamo_key(&delete.key))
        .map(WriteRequest::Delete))
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement, StoreError> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(|e| StoreError::dynamodb(e.to_string()))
}

fn string_definition(name: &str) -> Result<AttributeDefinition, StoreError> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|e| StoreError::dynamodb(e.to_string()))
}

#[async_trait]
impl KeyValueStore for DynamoDbStore {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), StoreError> {
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(schema.throughput.read_units)
            .write_capacity_units(schema.throughput.write_units)
            .build()
            .map_err(|e| StoreError::dynamodb(e.to_string()))?;

        let mut request = self
            .client
            .create_table()
            .table_name(&schema.name)
            .attribute_definitions(string_definition(&schema.key_attribute)?)
            .key_schema(key_element(&schema.key_attribute, KeyType::Hash)?)
            .provisioned_throughput(throughput.clone());

        if let Some(index) = &schema.index {
            if index.partition_key != schema.key_attribute {
                request = request.attribute_definitions(string_definition(&index.partition_key)?);
            }

            let mut gsi = GlobalSecondaryIndex::builder()
                .index_name(&index.name)
                .key_schema(key_element(&index.partition_key, KeyType::Hash)?)
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .provisioned_throughput(throughput);
            if let Some(sort_key) = &index.sort_key {
                if sort_key != &schema.key_attribute && sort_key != &index.partition_key {
                    request = request.attribute_definitions(string_definition(sort_key)?);
                }
                gsi = gsi.key_schema(key_element(sort_key, KeyType::Range)?);
            }

            request = request.global_secondary_indexes(
                gsi.build().map_err(|e| StoreError::dynamodb(e.to_string()))?,
            );
        }

        request
            .send()
            .await
            .map_err(|e| StoreError::dynamodb(format!("CreateTable failed: {}", e)))?;

        tracing::info!(table = %schema.name, "created DynamoDB table");
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        self.client
            .delete_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| StoreError::dynamodb(format!("DeleteTable failed: {}", e)))?;

        tracing::info!(table, "deleted DynamoDB table");
        Ok(())
    }

    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        let response = self
            .client
            .get_item()
            .table_name(table)
            .key(&key.attribute, AttributeValue::S(key.value.clone()))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb(format!("GetItem failed: {}", e)))?;

        response.item().map(from_dynamo_item).transpose()
    }

    async fn batch_get_items(
        &self,
        table: &str,
        keys: &[Key],
    ) -> Result<BatchGetOutput, StoreError> {
        if keys.is_empty() {
            return Ok(BatchGetOutput::default());
        }

        let keys_and_attributes = KeysAndAttributes::builder()
            .set_keys(Some(keys.iter().map(to_dynamo_key).collect()))
            .build()
            .map_err(|e| StoreError::dynamodb(e.to_string()))?;

        let response = self
            .client
            .batch_get_item()
            .request_items(table, keys_and_attributes)
            .send()
            .await
            .map_err(|e| StoreError::dynamodb(format!("BatchGetItem failed: {}", e)))?;

        let items = response
            .responses
            .as_ref()
            .and_then(|r| r.get(table))
            .map(|items| {
                items
                    .iter()
                    .map(from_dynamo_item)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let unprocessed_keys = response
            .unprocessed_keys
            .as_ref()
            .and_then(|u| u.get(table))
            .map(|ka| ka.keys.iter().filter_map(from_dynamo_key).collect())
            .unwrap_or_default();

        Ok(BatchGetOutput {
            items,
            unprocessed_keys,
        })
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_dynamo_item(&item)))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb(format!("PutItem failed: {}", e)))?;
        Ok(())
    }

    async fn batch_write_items(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, StoreError> {
        if requests.is_empty() {
            return Ok(BatchWriteOutput::default());
        }

        let writes = requests
            .iter()
            .map(to_write_request)
            .collect::<Result<Vec<_>, _>>()?;

        let response = self
            .client
            .batch_write_item()
            .request_items(table, writes)
            .send()
            .await
            .map_err(|e| StoreError::dynamodb(format!("BatchWriteItem failed: {}", e)))?;

        let mut unprocessed = Vec::new();
        if let Some(pending) = response.unprocessed_items.as_ref().and_then(|u| u.get(table)) {
            for request in pending {
                if let Some(request) = from_write_request(request)? {
                    unprocessed.push(request);
                }
            }
        }

        Ok(BatchWriteOutput { unprocessed })
    }

    async fn delete_item(&self, table: &str, key: &Key) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(table)
            .key(&key.attribute, AttributeValue::S(key.value.clone()))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb(format!("DeleteItem failed: {}", e)))?;
        Ok(())
    }

    async fn query_index(
        &self,
        table: &str,
        query: &IndexQuery,
    ) -> Result<QueryOutput, StoreError> {
        let response = self
            .client
            .query()
            .table_name(table)
            .index_name(&query.index_name)
            .key_condition_expression(format!("#pk = {}", query.placeholder))
            .expression_attribute_names("#pk", &query.attribute)
            .expression_attribute_values(&query.placeholder, AttributeValue::S(query.value.clone()))
            .send()
            .await
            .map_err(|e| StoreError::dynamodb(format!("Query failed: {}", e)))?;

        let items = response
            .items()
            .iter()
            .map(from_dynamo_item)
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = response
            .last_evaluated_key()
            .map(|key| !key.is_empty())
            .unwrap_or(false);

        Ok(QueryOutput { items, has_more })
    }

    fn limits(&self) -> StoreLimits {
        StoreLimits {
            max_batch_write: 25,
            max_batch_get: 100,
        }
    }
}
