//! # ormkit
//!
//! A convenience layer over `sqlx` for PostgreSQL: composable WHERE
//! conditions, a fluent per-model query builder, aggregate helpers, generic
//! CRUD and a model/service/controller registry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ormkit::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Product {
//!     pub id: Option<i64>,
//!     pub name: String,
//!     pub category: String,
//!     pub price: f64,
//! }
//!
//! impl Model for Product {
//!     fn table_name() -> &'static str {
//!         "products"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::new(
//!         "localhost".to_string(), 5432, "shop".to_string(),
//!         "postgres".to_string(), "password".to_string(),
//!         1, 5, 30, 600, 3600,
//!     );
//!     let ormkit = Ormkit::new(config).await?;
//!
//!     let mut conditions = Where::new();
//!     conditions.set("category", "Electronics");
//!     conditions.set_with("name", "lap", WhereOptions::fuzzy());
//!
//!     let page = ormkit
//!         .query::<Product>()
//!         .with_where(conditions)
//!         .order_by_desc("price")
//!         .paginate(1, 10)
//!         .await?;
//!     println!("{} of {} products", page.items.len(), page.total);
//!
//!     let total = aggregate::sum::<Product>(&ormkit.executor(), "price", None).await?;
//!     println!("stock value: {}", total);
//!
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod errors;
pub mod logging;
pub mod migration;
pub mod prelude;

// Re-export the main public types for convenience
pub use core::Ormkit;
pub use errors::OrmkitError;
pub use logging::init_logging;

// Re-export centralized config
pub use config::{AppConfig, DatabaseConfig, LoggingConfig, QueryConfig};

// Re-export the query layer and its logging macros
pub use record_store;
pub use record_store::{debug_log, trace_log};

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;
