//! Database migration functionality
//!
//! Creates tables and indexes for models, either one type at a time or for
//! every model in the registry.

use crate::core::Ormkit;
use crate::errors::OrmkitError;
use record_store::{Executor, Model, StoreError};
use tracing::{debug, info};

impl Ormkit {
    /// Create the table and indexes for `T`, named with the configured prefix.
    /// If `recreate` is true, drops the existing table first
    pub async fn auto_migrate<T: Model>(&self, recreate: bool) -> Result<(), OrmkitError> {
        let executor = self.executor();
        let model = T::table_name();
        let table = format!("{}{}", executor.table_prefix(), model);

        if recreate {
            let drop_sql = T::drop_table_sql(&table);
            info!(model, table = %table, "dropping table");
            run(executor.as_ref(), model, &drop_sql).await?;
        }

        run_all(executor.as_ref(), model, &T::migration_sql(&table)).await
    }

    /// Run the migration statements of every registered model, in registration order
    pub async fn migrate(&self) -> Result<(), OrmkitError> {
        let executor = self.executor();
        let migrations = self.registry().migrations(executor.table_prefix());
        info!(models = migrations.len(), "running migrations");

        for (model, statements) in migrations {
            run_all(executor.as_ref(), &model, &statements).await?;
        }
        Ok(())
    }
}

async fn run_all(
    executor: &dyn Executor,
    model: &str,
    statements: &[String],
) -> Result<(), OrmkitError> {
    if statements.is_empty() {
        info!(model, "no migration statements");
        return Ok(());
    }

    info!(model, statements = statements.len(), "migrating");
    for sql in statements {
        run(executor, model, sql).await?;
    }
    Ok(())
}

async fn run(executor: &dyn Executor, model: &str, sql: &str) -> Result<(), OrmkitError> {
    debug!(model, sql, "executing migration statement");
    executor
        .execute_raw(sql)
        .await
        .map(|_| ())
        .map_err(|source: StoreError| OrmkitError::Migration {
            model: model.to_string(),
            source,
        })
}
