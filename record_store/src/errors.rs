use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A condition set could not be compiled into a predicate
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unsupported aggregate operation: {0}")]
    UnsupportedAggregate(String),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Database error during {operation} on {table}: {source}")]
    Database {
        table: String,
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Decode error for {table}: {message}")]
    Decode { table: String, message: String },

    #[error("Refusing to {0} without a WHERE clause")]
    MissingWhereClause(String),

    #[error("Unsupported relation: {0}")]
    UnsupportedRelation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl StoreError {
    pub fn database_operation(table: &str, operation: &str, source: sqlx::Error) -> Self {
        // RowNotFound from sqlx is reported as NotFound
        if matches!(source, sqlx::Error::RowNotFound) {
            return StoreError::NotFound(table.to_string());
        }

        StoreError::Database {
            table: table.to_string(),
            operation: operation.to_string(),
            source,
        }
    }

    pub fn decode(table: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Decode {
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    /// True when a single-record lookup matched nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_missing_where_clause(&self) -> bool {
        matches!(self, StoreError::MissingWhereClause(_))
    }

    pub fn is_unsupported_relation(&self) -> bool {
        matches!(self, StoreError::UnsupportedRelation(_))
    }
}
