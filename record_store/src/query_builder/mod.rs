//! Query builder utilities
//!
//! This module provides the condition set, order specification and the
//! fluent query builder that composes them into requests.

pub mod aggregation;
pub mod builder;
pub mod filter;
pub mod join;
pub mod ordering;
pub mod pagination;
pub mod request;


// Re-export main types
pub use aggregation::{AggregateFunction, GroupByResult};
pub use builder::QueryBuilder;
pub use filter::{ConditionKind, Where, WhereOne, WhereOptions, FULL_TEXT_SEARCH_KEY};
pub use join::{JoinClause, JoinType};
pub use ordering::{OrderBy, OrderByOne, SortOrder};
pub use pagination::Paginated;
pub use request::{BoundClause, Request, RequestKind, Row};
