use super::{
    check_batch_size, string_attr, BatchGetOutput, BatchWriteOutput, IndexQuery, IndexSchema,
    Item, Key, KeyValueStore, QueryOutput, StoreError, StoreLimits, TableSchema, Throughput,
    WriteRequest,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{ConnectOptions, Row, Sqlite, Transaction};
use std::path::Path;

/// SQLite-backed [`KeyValueStore`].
///
/// Every store table becomes an SQLite table of
/// `(pk, index_pk, index_sk, item)`, where `item` is the JSON-encoded record
/// and the `index_*` columns mirror the declared secondary index attributes.
/// Declarations are kept in the `kv_tables` catalog so a reopened database
/// still knows its indexes.
pub struct SqliteStore {
    pool: SqlitePool,
    limits: StoreLimits,
    page_size: Option<usize>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and set up the catalog
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        options.disable_statement_logging();

        let pool = SqlitePool::connect_with(options.clone()).await?;

        let store = Self {
            pool,
            limits: StoreLimits::default(),
            page_size: None,
        };
        store.init_schema().await?;

        tracing::debug!(path = %db_path.as_ref().display(), "opened sqlite store");
        Ok(store)
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Truncate query results to `page_size` items
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_tables (
                name TEXT PRIMARY KEY,
                key_attribute TEXT NOT NULL,
                index_name TEXT,
                index_partition_key TEXT,
                index_sort_key TEXT,
                read_units INTEGER NOT NULL,
                write_units INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load a table declaration from the catalog
    async fn schema(&self, table: &str) -> Result<TableSchema, StoreError> {
        let row = sqlx::query(
            "SELECT name, key_attribute, index_name, index_partition_key, index_sort_key,
                    read_units, write_units
             FROM kv_tables WHERE name = ?",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let index_name: Option<String> = row.try_get("index_name")?;
        let index_partition_key: Option<String> = row.try_get("index_partition_key")?;
        let index = match (index_name, index_partition_key) {
            (Some(name), Some(partition_key)) => Some(IndexSchema {
                name,
                partition_key,
                sort_key: row.try_get("index_sort_key")?,
            }),
            _ => None,
        };

        Ok(TableSchema {
            name: row.try_get("name")?,
            key_attribute: row.try_get("key_attribute")?,
            index,
            throughput: Throughput {
                read_units: row.try_get("read_units")?,
                write_units: row.try_get("write_units")?,
            },
        })
    }

    async fn write_one(
        tx: &mut Transaction<'_, Sqlite>,
        schema: &TableSchema,
        request: WriteRequest,
    ) -> Result<(), StoreError> {
        match request {
            WriteRequest::Put(item) => {
                let pk = string_attr(&item, &schema.key_attribute).ok_or_else(|| {
                    StoreError::invalid_key(format!(
                        "item is missing string attribute {}",
                        schema.key_attribute
                    ))
                })?;
                let (index_pk, index_sk) = match &schema.index {
                    Some(index) => (
                        string_attr(&item, &index.partition_key),
                        index.sort_key.as_deref().and_then(|k| string_attr(&item, k)),
                    ),
                    None => (None, None),
                };
                let json = serde_json::to_string(&item)?;

                sqlx::query(&format!(
                    "INSERT OR REPLACE INTO {} (pk, index_pk, index_sk, item) VALUES (?, ?, ?, ?)",
                    quote(&schema.name)
                ))
                .bind(pk)
                .bind(index_pk)
                .bind(index_sk)
                .bind(json)
                .execute(&mut **tx)
                .await?;
            }
            WriteRequest::Delete(key) => {
                check_key(schema, &key)?;
                sqlx::query(&format!("DELETE FROM {} WHERE pk = ?", quote(&schema.name)))
                    .bind(&key.value)
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Table names are spliced into SQL, so only `[A-Za-z0-9_.-]` is accepted
fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid || name == "kv_tables" {
        return Err(StoreError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

fn check_key(schema: &TableSchema, key: &Key) -> Result<(), StoreError> {
    if key.attribute != schema.key_attribute || key.value.is_empty() {
        return Err(StoreError::invalid_key(format!(
            "expected non-empty {} key, got {} = {:?}",
            schema.key_attribute, key.attribute, key.value
        )));
    }
    Ok(())
}

fn decode_item(json: &str) -> Result<Item, StoreError> {
    Ok(serde_json::from_str(json)?)
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), StoreError> {
        validate_table_name(&schema.name)?;
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM kv_tables WHERE name = ?")
            .bind(&schema.name)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if exists {
            return Err(StoreError::TableExists(schema.name.clone()));
        }

        sqlx::query(
            "INSERT INTO kv_tables (name, key_attribute, index_name, index_partition_key,
                                    index_sort_key, read_units, write_units)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&schema.name)
        .bind(&schema.key_attribute)
        .bind(schema.index.as_ref().map(|i| i.name.clone()))
        .bind(schema.index.as_ref().map(|i| i.partition_key.clone()))
        .bind(schema.index.as_ref().and_then(|i| i.sort_key.clone()))
        .bind(schema.throughput.read_units)
        .bind(schema.throughput.write_units)
        .execute(&mut *tx)
        .await?;

        let table = quote(&schema.name);
        sqlx::query(&format!(
            "CREATE TABLE {} (
                pk TEXT PRIMARY KEY,
                index_pk TEXT,
                index_sk TEXT,
                item TEXT NOT NULL
            )",
            table
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX {} ON {} (index_pk, index_sk)",
            quote(&format!("{}__index", schema.name)),
            table
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(table = %schema.name, "created table");
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        validate_table_name(table)?;
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM kv_tables WHERE name = ?")
            .bind(table)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::TableNotFound(table.to_string()));
        }

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote(table)))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(table, "deleted table");
        Ok(())
    }

    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        let schema = self.schema(table).await?;
        check_key(&schema, key)?;

        let row = sqlx::query(&format!("SELECT item FROM {} WHERE pk = ?", quote(table)))
            .bind(&key.value)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.try_get("item")?;
                Ok(Some(decode_item(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn batch_get_items(
        &self,
        table: &str,
        keys: &[Key],
    ) -> Result<BatchGetOutput, StoreError> {
        check_batch_size(keys.len(), self.limits.max_batch_get)?;
        let schema = self.schema(table).await?;
        for key in keys {
            check_key(&schema, key)?;
        }
        if keys.is_empty() {
            return Ok(BatchGetOutput::default());
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "SELECT item FROM {} WHERE pk IN ({})",
            quote(table),
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for key in keys {
            query = query.bind(&key.value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let items = rows
            .iter()
            .map(|row| {
                let json: String = row.try_get("item")?;
                decode_item(&json)
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(BatchGetOutput {
            items,
            unprocessed_keys: Vec::new(),
        })
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError> {
        let schema = self.schema(table).await?;
        let mut tx = self.pool.begin().await?;
        Self::write_one(&mut tx, &schema, WriteRequest::Put(item)).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn batch_write_items(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, StoreError> {
        check_batch_size(requests.len(), self.limits.max_batch_write)?;
        let schema = self.schema(table).await?;

        let mut tx = self.pool.begin().await?;
        for request in requests {
            Self::write_one(&mut tx, &schema, request).await?;
        }
        tx.commit().await?;

        Ok(BatchWriteOutput::default())
    }

    async fn delete_item(&self, table: &str, key: &Key) -> Result<(), StoreError> {
        let schema = self.schema(table).await?;
        let mut tx = self.pool.begin().await?;
        Self::write_one(&mut tx, &schema, WriteRequest::Delete(key.clone())).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query_index(
        &self,
        table: &str,
        query: &IndexQuery,
    ) -> Result<QueryOutput, StoreError> {
        let schema = self.schema(table).await?;
        schema
            .index
            .as_ref()
            .filter(|i| i.name == query.index_name && i.partition_key == query.attribute)
            .ok_or_else(|| StoreError::IndexNotFound {
                table: table.to_string(),
                index: query.index_name.clone(),
            })?;

        // One extra row tells whether the page was truncated
        let limit = self.page_size.map(|n| n as i64 + 1).unwrap_or(-1);
        let rows = sqlx::query(&format!(
            "SELECT item FROM {} WHERE index_pk = ? ORDER BY index_sk, pk LIMIT ?",
            quote(table)
        ))
        .bind(&query.value)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut items = rows
            .iter()
            .map(|row| {
                let json: String = row.try_get("item")?;
                decode_item(&json)
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let has_more = match self.page_size {
            Some(size) if items.len() > size => {
                items.truncate(size);
                true
            }
            _ => false,
        };

        Ok(QueryOutput { items, has_more })
    }

    fn limits(&self) -> StoreLimits {
        self.limits
    }
}
