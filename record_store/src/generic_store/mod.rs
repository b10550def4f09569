//! Generic store implementations
//!
//! This module provides CRUD helpers that work for any `Model`.

pub mod core;
pub mod store_object;

pub use core::GenericStore;
