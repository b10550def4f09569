//! PostgreSQL executors
//!
//! `PgExecutor` runs requests on a pool; `PgTransaction` runs them on one
//! open transaction until it is committed or rolled back.

use crate::errors::StoreError;
use crate::postgres::binding::build_query;
use crate::postgres::decode::row_to_map;
use crate::postgres::sql_generation::SqlGenerator;
use crate::query_builder::request::{Request, Row};
use crate::traits::{Executor, Transactional};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Executor backed by a connection pool
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
    table_prefix: String,
    typed_strings: bool,
}

impl std::fmt::Debug for PgExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgExecutor")
            .field("pool_size", &self.pool.size())
            .field("table_prefix", &self.table_prefix)
            .field("typed_strings", &self.typed_strings)
            .finish()
    }
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table_prefix: String::new(),
            typed_strings: false,
        }
    }

    /// Set the prefix prepended to model table names
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Bind RFC3339 and UUID shaped strings as TIMESTAMPTZ and UUID.
    ///
    /// Off by default: every string binds as TEXT, and typed columns need an
    /// explicit cast such as `id = ?::uuid`.
    pub fn with_typed_strings(mut self, typed_strings: bool) -> Self {
        self.typed_strings = typed_strings;
        self
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn render_logged(request: &Request) -> Result<(String, Vec<serde_json::Value>), StoreError> {
    let (sql, args) = SqlGenerator::render(request)?;
    debug!(
        table = %request.table,
        operation = request.operation(),
        params = args.len(),
        sql = %sql,
        "executing request"
    );
    trace_log!("request arguments: {:?}", args);
    Ok((sql, args))
}

#[async_trait]
impl Executor for PgExecutor {
    async fn fetch_all(&self, request: &Request) -> Result<Vec<Row>, StoreError> {
        let (sql, args) = render_logged(request)?;

        let rows = build_query(&sql, args, self.typed_strings)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database_operation(&request.table, request.operation(), e))?;

        rows.iter().map(|row| row_to_map(row, &request.table)).collect()
    }

    async fn execute(&self, request: &Request) -> Result<u64, StoreError> {
        let (sql, args) = render_logged(request)?;

        let result = build_query(&sql, args, self.typed_strings)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database_operation(&request.table, request.operation(), e))?;

        Ok(result.rows_affected())
    }

    async fn execute_raw(&self, sql: &str) -> Result<u64, StoreError> {
        debug!(sql = %sql, "executing statement");

        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database_operation("-", "statement", e))?;

        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<Arc<dyn Transactional>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to begin transaction: {}", e)))?;

        debug_log!("transaction started");

        Ok(Arc::new(PgTransaction {
            tx: Mutex::new(Some(tx)),
            table_prefix: self.table_prefix.clone(),
            typed_strings: self.typed_strings,
        }))
    }

    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }
}

/// Executor bound to one open transaction
pub struct PgTransaction {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
    table_prefix: String,
    typed_strings: bool,
}

impl PgTransaction {
    fn finished() -> StoreError {
        StoreError::Transaction("transaction already committed or rolled back".to_string())
    }
}

#[async_trait]
impl Executor for PgTransaction {
    async fn fetch_all(&self, request: &Request) -> Result<Vec<Row>, StoreError> {
        let (sql, args) = render_logged(request)?;

        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;

        let rows = build_query(&sql, args, self.typed_strings)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| StoreError::database_operation(&request.table, request.operation(), e))?;

        rows.iter().map(|row| row_to_map(row, &request.table)).collect()
    }

    async fn execute(&self, request: &Request) -> Result<u64, StoreError> {
        let (sql, args) = render_logged(request)?;

        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;

        let result = build_query(&sql, args, self.typed_strings)
            .execute(&mut **tx)
            .await
            .map_err(|e| StoreError::database_operation(&request.table, request.operation(), e))?;

        Ok(result.rows_affected())
    }

    async fn execute_raw(&self, sql: &str) -> Result<u64, StoreError> {
        debug!(sql = %sql, "executing statement in transaction");

        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;

        let result = sqlx::query(sql)
            .execute(&mut **tx)
            .await
            .map_err(|e| StoreError::database_operation("-", "statement", e))?;

        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<Arc<dyn Transactional>, StoreError> {
        Err(StoreError::Transaction(
            "nested transactions are not supported".to_string(),
        ))
    }

    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }
}

#[async_trait]
impl Transactional for PgTransaction {
    async fn commit(&self) -> Result<(), StoreError> {
        let tx = self.tx.lock().await.take().ok_or_else(Self::finished)?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to commit transaction: {}", e)))?;
        debug_log!("transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let tx = self.tx.lock().await.take().ok_or_else(Self::finished)?;
        tx.rollback().await.map_err(|e| {
            StoreError::Transaction(format!("Failed to rollback transaction: {}", e))
        })?;
        debug_log!("transaction rolled back");
        Ok(())
    }

    fn as_executor(self: Arc<Self>) -> Arc<dyn Executor> {
        self
    }
}
