//! Error types for the ormkit crate
//!
//! This module contains all error types that can be returned by `Ormkit` operations.

use config::ConfigError;
use record_store::{RegistryError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrmkitError {
    #[error("Database connection error: {0}")]
    DatabaseConnection(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Migration of {model} failed: {source}")]
    Migration {
        model: String,
        #[source]
        source: StoreError,
    },
}
