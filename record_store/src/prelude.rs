//! Convenience re-exports for common record-store usage

// Core traits
pub use crate::traits::{with_transaction, Association, Executor, Model, Transactional};

// Error types
pub use crate::errors::StoreError;

// Query building
pub use crate::query_builder::{
    ConditionKind, JoinType, OrderBy, Paginated, QueryBuilder, SortOrder, Where, WhereOptions,
};

// Stores, aggregates and request parameters
pub use crate::aggregate;
pub use crate::generic_store::GenericStore;
pub use crate::params::QueryParams;
pub use crate::postgres::PgExecutor;

// Registry
pub use crate::registry::{Controller, Registration, Registry, RegistryError, Service};

// Common external dependencies that are frequently used
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use serde_json::{json, Value};
