//! PostgreSQL document store with connection pooling

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::DomainError;
use crate::domain::storage::{Document, DocumentStore, ID_FIELD, Patch, Query, RecordId};

/// PostgreSQL storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
    /// Prefix prepended to collection names to form table names
    pub table_prefix: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/docmodel".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            table_prefix: "doc_".to_string(),
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }
}

/// SQL condition plus the JSON values bound to it, in placeholder order
#[derive(Debug, Clone, PartialEq)]
struct WhereClause {
    sql: String,
    binds: Vec<Value>,
}

/// Translates equality predicates to SQL.
///
/// Scalar predicates are folded into one JSONB containment test. Containment
/// would let an array or object predicate match any superset, so those are
/// compared for equality instead. A null predicate must also match documents
/// missing the field, which containment cannot express.
fn where_clause(query: &Query, first_placeholder: usize) -> WhereClause {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();
    let mut containment = Document::new();

    for (field, value) in query.predicates() {
        match value {
            Value::Null => {
                let placeholder = first_placeholder + binds.len();
                conditions.push(format!(
                    "(data -> ${0}::text IS NULL OR data -> ${0}::text = 'null'::jsonb)",
                    placeholder
                ));
                binds.push(Value::String(field.clone()));
            }
            Value::Array(_) | Value::Object(_) => {
                let placeholder = first_placeholder + binds.len();
                conditions.push(format!(
                    "data -> ${}::text = ${}::jsonb",
                    placeholder,
                    placeholder + 1
                ));
                binds.push(Value::String(field.clone()));
                binds.push(value.clone());
            }
            _ => {
                containment.insert(field.clone(), value.clone());
            }
        }
    }

    if !containment.is_empty() {
        let placeholder = first_placeholder + binds.len();
        conditions.insert(0, format!("data @> ${}::jsonb", placeholder));
        binds.push(Value::Object(containment));
    }

    let sql = if conditions.is_empty() {
        "TRUE".to_string()
    } else {
        conditions.join(" AND ")
    };

    WhereClause { sql, binds }
}

/// Expression adding one to the integer under the field bound as `$1`
fn increment_expression(column: &str) -> String {
    format!(
        "jsonb_set({0}, ARRAY[$1::text], to_jsonb(COALESCE(({0} ->> $1::text)::bigint, 0) + 1))",
        column
    )
}

/// Identity of the document an increment upserts, derived from its query so
/// concurrent first increments collide on the primary key
fn upsert_id(collection: &str, query: &Query) -> RecordId {
    let seed = format!("{}:{}", collection, Value::Object(query.to_document()));
    RecordId::new(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string())
}

fn bind_values<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    binds: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for value in binds {
        query = match value {
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(other),
        };
    }
    query
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn validate_identifier(name: &str) -> Result<(), DomainError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid_start && valid_rest && name.len() <= 63 {
        Ok(())
    } else {
        Err(DomainError::configuration(format!(
            "Invalid collection table name: {}",
            name
        )))
    }
}

fn row_document(row: &PgRow) -> Result<Document, DomainError> {
    let data: Value = row
        .try_get("data")
        .map_err(|e| DomainError::storage(format!("Failed to read document: {}", e)))?;

    match data {
        Value::Object(document) => Ok(document),
        other => Err(DomainError::serialization(format!(
            "Stored document is not an object: {}",
            other
        ))),
    }
}

/// Document store keeping each collection in its own JSONB table
///
/// Tables are created on first use of a collection.
pub struct PostgresDocumentStore {
    pool: PgPool,
    table_prefix: String,
    ensured: RwLock<HashSet<String>>,
}

impl Debug for PostgresDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDocumentStore")
            .field("table_prefix", &self.table_prefix)
            .finish()
    }
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool, table_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            table_prefix: table_prefix.into(),
            ensured: RwLock::new(HashSet::new()),
        }
    }

    /// Creates a new PostgreSQL store with connection pooling
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        info!(max_connections = config.max_connections, "PostgreSQL pool established");
        Ok(Self::new(pool, config.table_prefix.clone()))
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn table_name(&self, collection: &str) -> Result<String, DomainError> {
        let table = format!("{}{}", self.table_prefix, collection);
        validate_identifier(&table)?;
        Ok(table)
    }

    /// Ensures the collection table exists and returns its name
    async fn table(&self, collection: &str) -> Result<String, DomainError> {
        let table = self.table_name(collection)?;

        let known = self
            .ensured
            .read()
            .map(|set| set.contains(&table))
            .unwrap_or(false);
        if known {
            return Ok(table);
        }

        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(64) PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table
        );

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to create table: {}", e)))?;

        debug!(table = %table, "Collection table ensured");
        if let Ok(mut set) = self.ensured.write() {
            set.insert(table.clone());
        }
        Ok(table)
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Option<Document>, DomainError> {
        let table = self.table(collection).await?;
        let clause = where_clause(query, 1);
        let sql = format!(
            "SELECT data FROM {} WHERE {} ORDER BY created_at LIMIT 1",
            table, clause.sql
        );

        let row = bind_values(sqlx::query(&sql), &clause.binds)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to find document: {}", e)))?;

        row.as_ref().map(row_document).transpose()
    }

    async fn find_many(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, DomainError> {
        let table = self.table(collection).await?;
        let clause = where_clause(query, 1);
        let sql = format!(
            "SELECT data FROM {} WHERE {} ORDER BY created_at",
            table, clause.sql
        );

        let rows = bind_values(sqlx::query(&sql), &clause.binds)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to find documents: {}", e)))?;

        rows.iter().map(row_document).collect()
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<RecordId, DomainError> {
        let table = self.table(collection).await?;
        let id = RecordId::from_document(&document).unwrap_or_else(RecordId::generate);
        document.insert(ID_FIELD.to_string(), id.clone().into());

        let sql = format!("INSERT INTO {} (id, data) VALUES ($1, $2)", table);

        sqlx::query(&sql)
            .bind(id.as_str())
            .bind(Value::Object(document))
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to insert document: {}", e)))?;

        Ok(id)
    }

    async fn replace(
        &self,
        collection: &str,
        id: &RecordId,
        mut document: Document,
    ) -> Result<(), DomainError> {
        let table = self.table(collection).await?;
        document.insert(ID_FIELD.to_string(), id.into());

        let sql = format!(
            r#"
            INSERT INTO {} (id, data)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
            table
        );

        sqlx::query(&sql)
            .bind(id.as_str())
            .bind(Value::Object(document))
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to replace document: {}", e)))?;

        Ok(())
    }

    async fn delete_one(&self, collection: &str, id: &RecordId) -> Result<bool, DomainError> {
        let table = self.table(collection).await?;
        let sql = format!("DELETE FROM {} WHERE id = $1", table);

        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete document: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, DomainError> {
        let table = self.table(collection).await?;
        let clause = where_clause(query, 1);
        let sql = format!("DELETE FROM {} WHERE {}", table, clause.sql);

        let result = bind_values(sqlx::query(&sql), &clause.binds)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete documents: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn update_many(
        &self,
        collection: &str,
        query: &Query,
        patch: &Patch,
    ) -> Result<u64, DomainError> {
        if patch.is_empty() {
            return Ok(0);
        }

        let table = self.table(collection).await?;
        let clause = where_clause(query, 2);
        let sql = format!(
            "UPDATE {} SET data = data || $1::jsonb, updated_at = NOW() WHERE {}",
            table, clause.sql
        );

        let assignments = Value::Object(patch.assignments().clone());
        let result = bind_values(sqlx::query(&sql).bind(&assignments), &clause.binds)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to update documents: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn find_and_increment(
        &self,
        collection: &str,
        query: &Query,
        field: &str,
    ) -> Result<Document, DomainError> {
        let table = self.table(collection).await?;
        let clause = where_clause(query, 2);
        let sql = format!(
            r#"
            UPDATE {0} SET data = {1}, updated_at = NOW()
            WHERE id = (SELECT id FROM {0} WHERE {2} ORDER BY created_at LIMIT 1 FOR UPDATE)
            RETURNING data
            "#,
            table,
            increment_expression("data"),
            clause.sql
        );

        let row = bind_values(sqlx::query(&sql).bind(field), &clause.binds)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to increment document: {}", e)))?;
        if let Some(row) = row {
            return row_document(&row);
        }

        let id = upsert_id(collection, query);
        let mut document = query.to_document();
        document.insert(field.to_string(), Value::from(1));
        document.insert(ID_FIELD.to_string(), id.clone().into());

        let sql = format!(
            r#"
            INSERT INTO {0} AS doc (id, data)
            VALUES ($2, $3)
            ON CONFLICT (id) DO UPDATE SET data = {1}, updated_at = NOW()
            RETURNING data
            "#,
            table,
            increment_expression("doc.data")
        );

        let row = sqlx::query(&sql)
            .bind(field)
            .bind(id.as_str())
            .bind(Value::Object(document))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to upsert document: {}", e)))?;

        row_document(&row)
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, DomainError> {
        let table = self.table(collection).await?;
        let clause = where_clause(query, 1);
        let sql = format!("SELECT COUNT(*) AS count FROM {} WHERE {}", table, clause.sql);

        let row = bind_values(sqlx::query(&sql), &clause.binds)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to count documents: {}", e)))?;

        let count: i64 = row
            .try_get("count")
            .map_err(|e| DomainError::storage(format!("Failed to read count: {}", e)))?;
        Ok(count as u64)
    }
}
