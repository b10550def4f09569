//! Convenience re-exports for common ormkit usage
//!
//! # Example
//!
//! ```rust
//! use ormkit::prelude::*;
//!
//! let mut conditions = Where::new();
//! conditions.set("category", "Books");
//! assert_eq!(conditions.build().unwrap().0, "category = ?");
//! ```

// Core ormkit components
pub use crate::core::Ormkit;
pub use crate::errors::OrmkitError;
pub use crate::logging::init_logging;

// Re-export centralized config
pub use config::{AppConfig, DatabaseConfig, LoggingConfig, QueryConfig};

// Re-export commonly used record-store types for convenience
pub use record_store::prelude::*;

// Common external dependencies
pub use sqlx;
pub use tokio;
