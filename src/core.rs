//! Core ormkit functionality
//!
//! This module contains the `Ormkit` handle: the connection pool, the executor
//! built on it and the application registry.

use record_store::{Executor, GenericStore, Model, PgExecutor, QueryBuilder, Registry};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::errors::OrmkitError;
use config::{AppConfig, DatabaseConfig, QueryConfig};

/// Main handle that owns the database pool and the registered components
pub struct Ormkit {
    pool: PgPool,
    executor: Arc<dyn Executor>,
    registry: Registry,
    query_config: QueryConfig,
}

impl std::fmt::Debug for Ormkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ormkit")
            .field("pool_size", &self.pool.size())
            .field("table_prefix", &self.executor.table_prefix())
            .field("registry", &self.registry)
            .finish()
    }
}

impl Ormkit {
    /// Connect using `config`; an invalid configuration fails before connecting
    pub async fn new(config: DatabaseConfig) -> Result<Self, OrmkitError> {
        config.validate()?;
        let connection_string = config.connection_string();

        let mut pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds));

        // Set max lifetime if specified
        if config.max_lifetime_seconds > 0 {
            pool_options =
                pool_options.max_lifetime(Duration::from_secs(config.max_lifetime_seconds));
        }

        let pool = pool_options.connect(&connection_string).await?;
        info!(
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections,
            "connected to database"
        );

        let executor = PgExecutor::new(pool.clone())
            .with_table_prefix(config.table_prefix.as_str())
            .with_typed_strings(config.typed_strings);
        Ok(Self::with_executor(pool, executor))
    }

    /// Connect with the database section of a full application config
    pub async fn from_config(config: &AppConfig) -> Result<Self, OrmkitError> {
        config.validate()?;
        let mut ormkit = Self::new(config.database.clone()).await?;
        ormkit.query_config = config.query.clone();
        Ok(ormkit)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, table_prefix: &str) -> Self {
        let executor = PgExecutor::new(pool.clone()).with_table_prefix(table_prefix);
        Self::with_executor(pool, executor)
    }

    /// Wrap an existing pool with a configured executor
    pub fn with_executor(pool: PgPool, executor: PgExecutor) -> Self {
        Self {
            pool,
            executor: Arc::new(executor),
            registry: Registry::new(),
            query_config: QueryConfig::default(),
        }
    }

    /// Get database pool reference
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Shared executor handle for builders and aggregate helpers
    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query_config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// New query builder for `T`
    pub fn query<T: Model>(&self) -> QueryBuilder<T> {
        QueryBuilder::new(self.executor())
    }

    /// CRUD store for `T`
    pub fn store<T: Model>(&self) -> GenericStore<T> {
        GenericStore::new(self.executor())
    }

    /// Check database connection health
    pub async fn health_check(&self) -> Result<(), OrmkitError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
