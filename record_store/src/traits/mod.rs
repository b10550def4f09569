//! Traits for database operations
//!
//! This module contains the traits that describe record types and the
//! executors that run queries for them.

pub mod executor;
pub mod model;

// Re-export all public items for convenience
pub use executor::{with_transaction, Executor, Transactional};
pub use model::{Association, Model};
