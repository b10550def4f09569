//! Composed requests
//!
//! A `Request` is everything the query builder accumulated, compiled once and
//! handed to an `Executor`. Predicates keep `?` placeholders; renumbering and
//! array expansion happen when the executor renders them.

use crate::query_builder::join::JoinClause;
use serde_json::{Map, Value};

/// A result row with columns in select order
pub type Row = Map<String, Value>;

/// A compiled predicate and its positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct BoundClause {
    pub sql: String,
    pub args: Vec<Value>,
}

impl BoundClause {
    /// `None` for an empty predicate so callers can skip the clause
    pub fn compose(sql: String, args: Vec<Value>) -> Option<Self> {
        if sql.is_empty() {
            None
        } else {
            Some(Self { sql, args })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    Select,
    /// Number of matching rows (or groups), returned in a `total` column
    Count,
    Delete,
    Update {
        assignments: Vec<(String, Value)>,
    },
    Insert {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        /// Conflict target for upserts
        upsert_key: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub table: String,
    pub kind: RequestKind,
    pub selects: Vec<String>,
    pub distinct: bool,
    pub joins: Vec<JoinClause>,
    pub filter: Option<BoundClause>,
    pub orders: Vec<String>,
    pub group_by: Vec<String>,
    pub having: Option<BoundClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Request {
    pub fn new(table: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            table: table.into(),
            kind,
            selects: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            filter: None,
            orders: Vec::new(),
            group_by: Vec::new(),
            having: None,
            limit: None,
            offset: None,
        }
    }

    pub fn select(table: impl Into<String>) -> Self {
        Self::new(table, RequestKind::Select)
    }

    pub fn with_filter(mut self, filter: Option<BoundClause>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_selects(mut self, selects: Vec<String>) -> Self {
        self.selects = selects;
        self
    }

    pub fn with_group_by(mut self, group_by: Vec<String>) -> Self {
        self.group_by = group_by;
        self
    }

    /// Short label for logs and error context
    pub fn operation(&self) -> &'static str {
        match self.kind {
            RequestKind::Select => "select",
            RequestKind::Count => "count",
            RequestKind::Delete => "delete",
            RequestKind::Update { .. } => "update",
            RequestKind::Insert {
                upsert_key: Some(_),
                ..
            } => "upsert",
            RequestKind::Insert { .. } => "insert",
        }
    }
}
