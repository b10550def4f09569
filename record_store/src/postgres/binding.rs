//! Parameter binding for JSON arguments

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::Postgres;
use uuid::Uuid;

/// Postgres type a string argument is bound as
#[derive(Debug, Clone, PartialEq)]
pub enum StringParam {
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Text(String),
}

impl StringParam {
    /// Strings stay TEXT unless `typed` is set; then RFC3339 timestamps bind
    /// as TIMESTAMPTZ and UUIDs as UUID
    pub fn classify(s: String, typed: bool) -> Self {
        if typed {
            if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                return Self::Timestamp(dt.with_timezone(&Utc));
            }
            if let Ok(uuid) = Uuid::parse_str(&s) {
                return Self::Uuid(uuid);
            }
        }
        Self::Text(s)
    }
}

macro_rules! bind_json_param {
    ($query:expr, $param:expr, $typed:expr) => {
        match $param {
            Value::String(s) => match StringParam::classify(s, $typed) {
                StringParam::Timestamp(dt) => $query.bind(dt),
                StringParam::Uuid(uuid) => $query.bind(uuid),
                StringParam::Text(s) => $query.bind(s),
            },
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        $query.bind(i as i32)
                    } else {
                        $query.bind(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    $query.bind(f)
                } else {
                    $query.bind(n.to_string())
                }
            }
            Value::Bool(b) => $query.bind(b),
            // nulls are rendered inline; this only covers hand-built argument lists
            Value::Null => $query.bind(Option::<String>::None),
            other @ (Value::Array(_) | Value::Object(_)) => $query.bind(Json(other)),
        }
    };
}

/// Bind one argument, choosing the Postgres type from the JSON value
pub fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: Value,
    typed_strings: bool,
) -> Query<'q, Postgres, PgArguments> {
    bind_json_param!(query, param, typed_strings)
}

/// Prepare `sql` with every argument bound in order
pub fn build_query(
    sql: &str,
    args: Vec<Value>,
    typed_strings: bool,
) -> Query<'_, Postgres, PgArguments> {
    args.into_iter()
        .fold(sqlx::query(sql), |query, arg| bind_value(query, arg, typed_strings))
}
