//! Trait definitions
//!
//! This module defines the seam between the query builder and the database.

use crate::errors::StoreError;
use crate::postgres::SqlGenerator;
use crate::query_builder::request::{Request, Row};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Runs composed requests against a database
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a request that returns rows
    async fn fetch_all(&self, request: &Request) -> Result<Vec<Row>, StoreError>;

    /// Run a request for its side effect, returning affected rows
    async fn execute(&self, request: &Request) -> Result<u64, StoreError>;

    /// Run a literal statement such as DDL
    async fn execute_raw(&self, sql: &str) -> Result<u64, StoreError>;

    /// Start a transaction
    async fn begin(&self) -> Result<Arc<dyn Transactional>, StoreError>;

    /// Prefix prepended to model table names
    fn table_prefix(&self) -> &str {
        ""
    }

    /// Final SQL and arguments for a request
    fn render(&self, request: &Request) -> Result<(String, Vec<Value>), StoreError> {
        SqlGenerator::render(request)
    }
}

/// An executor bound to an open transaction
#[async_trait]
pub trait Transactional: Executor {
    async fn commit(&self) -> Result<(), StoreError>;

    async fn rollback(&self) -> Result<(), StoreError>;

    fn as_executor(self: Arc<Self>) -> Arc<dyn Executor>;
}

/// Run `f` with a transactional executor; commit on `Ok`, roll back on `Err`
pub async fn with_transaction<F, Fut, R>(
    executor: &Arc<dyn Executor>,
    f: F,
) -> Result<R, StoreError>
where
    F: FnOnce(Arc<dyn Executor>) -> Fut,
    Fut: Future<Output = Result<R, StoreError>>,
{
    let tx = executor.begin().await?;

    match f(tx.clone().as_executor()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            warn!(error = %e, "transaction callback failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}
