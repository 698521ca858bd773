use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement, Value,
};
use tracing::debug;

use super::error::StorageError;
use super::traits::{
    BatchDeleteOutcome, DOCUMENT_BATCH_LIMIT, Document, DocumentStore, Page, check_batch_size,
    validate_name,
};
use crate::config::DatabaseConfig;

/// Document store on Postgres.
///
/// Every collection is a table of JSONB documents:
/// `"{table}" (seq BIGSERIAL PRIMARY KEY, body JSONB NOT NULL)`.
/// Scans use keyset pagination on `seq`; the cursor is the last `seq` returned.
pub struct PostgresDocumentStore {
    db: DatabaseConnection,
    page_size: u64,
}

impl PostgresDocumentStore {
    pub async fn connect(config: &DatabaseConfig, page_size: u64) -> Result<Self, StorageError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut opt = ConnectOptions::new(config.url.to_owned());
        opt.max_connections(config.max_connections)
            .min_connections(1)
            .connect_timeout(timeout)
            .acquire_timeout(timeout)
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;
        Ok(Self::new(db, page_size))
    }

    pub fn new(db: DatabaseConnection, page_size: u64) -> Self {
        Self {
            db,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn scan_page(
        &self,
        table: &str,
        cursor: Option<String>,
    ) -> Result<Page<Document>, StorageError> {
        validate_name(table)?;
        let after = parse_cursor(cursor)?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            select_page_sql(table),
            [Value::from(after), Value::from(self.page_size as i64)],
        );
        let rows = self.db.query_all_raw(stmt).await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut last_seq = after;
        for row in &rows {
            last_seq = row.try_get::<i64>("", "seq")?;
            match row.try_get::<serde_json::Value>("", "body")? {
                serde_json::Value::Object(doc) => items.push(doc),
                other => {
                    return Err(StorageError::Decode(format!(
                        "row {last_seq} of {table} is not an object: {other}"
                    )));
                }
            }
        }

        let next = next_cursor(rows.len(), self.page_size, last_seq);
        debug!(table, rows = rows.len(), after, "Scanned document page");
        Ok(Page { items, next })
    }

    async fn batch_delete(
        &self,
        table: &str,
        key_attribute: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError> {
        validate_name(table)?;
        check_batch_size(keys.len(), DOCUMENT_BATCH_LIMIT)?;
        if keys.is_empty() {
            return Ok(BatchDeleteOutcome::default());
        }

        let mut values = Vec::with_capacity(keys.len() + 1);
        values.push(Value::from(key_attribute.to_string()));
        values.extend(keys.iter().map(|k| Value::from(k.clone())));

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            delete_sql(table, keys.len()),
            values,
        );
        let result = self.db.execute_raw(stmt).await?;

        // Keys that matched no row are already gone.
        debug!(
            table,
            key_attribute,
            requested = keys.len(),
            rows_affected = result.rows_affected(),
            "Deleted document batch"
        );
        Ok(BatchDeleteOutcome::all_accepted(keys.len()))
    }
}

fn parse_cursor(cursor: Option<String>) -> Result<i64, StorageError> {
    match cursor {
        None => Ok(0),
        Some(c) => c.parse().map_err(|_| StorageError::InvalidCursor(c)),
    }
}

/// A short page is the last one.
fn next_cursor(rows: usize, page_size: u64, last_seq: i64) -> Option<String> {
    (rows as u64 == page_size).then(|| last_seq.to_string())
}

fn select_page_sql(table: &str) -> String {
    format!("SELECT seq, body FROM \"{table}\" WHERE seq > $1 ORDER BY seq LIMIT $2")
}

/// `$1` is the key attribute, the keys follow from `$2`.
fn delete_sql(table: &str, keys: usize) -> String {
    let placeholders = (2..keys + 2)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("DELETE FROM \"{table}\" WHERE body->>$1 IN ({placeholders})")
}
