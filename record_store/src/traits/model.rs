//! Trait definitions
//!
//! This module defines the metadata a record type exposes to the query builder.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A relation that can be eager-loaded with `QueryBuilder::preload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Table holding the related rows (without prefix)
    pub table: &'static str,
    /// Column on the related table pointing back at this record
    pub foreign_key: &'static str,
    /// Column on this record matched against `foreign_key`; defaults to the primary key
    pub local_key: Option<&'static str>,
    /// Attach a single object (or null) instead of an array
    pub single: bool,
}

impl Association {
    pub fn has_many(table: &'static str, foreign_key: &'static str) -> Self {
        Self {
            table,
            foreign_key,
            local_key: None,
            single: false,
        }
    }

    pub fn has_one(table: &'static str, foreign_key: &'static str) -> Self {
        Self {
            table,
            foreign_key,
            local_key: None,
            single: true,
        }
    }

    pub fn with_local_key(mut self, local_key: &'static str) -> Self {
        self.local_key = Some(local_key);
        self
    }
}

/// Metadata about a record type and its table.
///
/// Rows are decoded through serde, so any `Deserialize` struct whose field
/// names match the selected columns works:
///
/// ```
/// use record_store::Model;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Product {
///     pub id: i64,
///     pub name: String,
///     pub price: f64,
/// }
///
/// impl Model for Product {
///     fn table_name() -> &'static str {
///         "products"
///     }
/// }
/// ```
pub trait Model:
    Clone + Send + Sync + Debug + Serialize + DeserializeOwned + Unpin + 'static
{
    /// The table name in the database, without any configured prefix
    fn table_name() -> &'static str;

    /// Get the primary key field name
    fn primary_key_field() -> &'static str {
        "id"
    }

    /// Relation named `name`, if this type declares one
    fn association(_name: &str) -> Option<Association> {
        None
    }

    /// CREATE TABLE statement for `table`, the name with any prefix applied
    fn create_table_sql(_table: &str) -> Option<String> {
        None
    }

    /// CREATE INDEX statements for `table`
    fn create_indexes_sql(_table: &str) -> Vec<String> {
        vec![]
    }

    fn drop_table_sql(table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", table)
    }

    /// Statements run by migration, in order
    fn migration_sql(table: &str) -> Vec<String> {
        let mut statements: Vec<String> = Self::create_table_sql(table).into_iter().collect();
        statements.extend(Self::create_indexes_sql(table));
        statements
    }
}
