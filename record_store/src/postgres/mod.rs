//! PostgreSQL collaborator
//!
//! Renders composed requests to SQL, binds JSON arguments and decodes rows
//! back into JSON maps.

pub mod binding;
pub mod decode;
pub mod executor;
pub mod sql_generation;

pub use executor::{PgExecutor, PgTransaction};
pub use sql_generation::SqlGenerator;
