//! Record Store - query layer for ormkit
//!
//! This crate provides the condition set, order specification, fluent query
//! builder, aggregate helpers and generic CRUD store, together with the
//! PostgreSQL executor that runs the composed requests.

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod aggregate;
pub mod errors;
pub mod generic_store;
pub mod params;
pub mod postgres;
pub mod prelude;
pub mod query_builder;
pub mod registry;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::StoreError;
pub use generic_store::GenericStore;
pub use params::QueryParams;
pub use postgres::{PgExecutor, PgTransaction, SqlGenerator};
pub use query_builder::{
    AggregateFunction, ConditionKind, GroupByResult, JoinType, OrderBy, Paginated, QueryBuilder,
    SortOrder, Where, WhereOne, WhereOptions,
};
pub use registry::{Controller, Registration, Registry, RegistryError, Service};
pub use traits::*;
