use crate::errors::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Represents SQL aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// COUNT(field)
    Count,
    /// SUM(field)
    Sum,
    /// AVG(field)
    Avg,
    /// MIN(field)
    Min,
    /// MAX(field)
    Max,
    /// COUNT(DISTINCT field)
    CountDistinct,
}

impl AggregateFunction {
    /// Convert aggregate function to SQL string
    pub fn to_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::CountDistinct => "COUNT",
        }
    }

    /// Check if this is a DISTINCT aggregate
    pub fn is_distinct(&self) -> bool {
        matches!(self, AggregateFunction::CountDistinct)
    }

    /// Lowercase operation name, used as the result column alias
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::CountDistinct => "count_distinct",
        }
    }

    /// `SUM(price)`, `COUNT(DISTINCT owner)`
    pub fn expression(&self, field: &str) -> String {
        if self.is_distinct() {
            format!("{}(DISTINCT {})", self.to_sql(), field)
        } else {
            format!("{}({})", self.to_sql(), field)
        }
    }

    /// `SUM(price) as sum`
    pub fn aliased(&self, field: &str, alias: &str) -> String {
        format!("{} as {}", self.expression(field), alias)
    }
}

impl FromStr for AggregateFunction {
    type Err = StoreError;

    fn from_str(op: &str) -> Result<Self, Self::Err> {
        match op.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "count_distinct" => Ok(AggregateFunction::CountDistinct),
            _ => Err(StoreError::UnsupportedAggregate(op.to_string())),
        }
    }
}

/// One row of a grouped aggregate query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupByResult {
    pub group: Map<String, Value>,
    pub count: i64,
    pub sum: f64,
    pub avg: f64,
    pub min: Value,
    pub max: Value,
}

impl GroupByResult {
    /// Split a row into group columns (the first `group_len`) and aggregate columns.
    ///
    /// Aggregate columns are matched by name; unknown names are ignored.
    pub fn from_row(row: Map<String, Value>, group_len: usize) -> Self {
        let mut result = GroupByResult::default();

        for (index, (column, value)) in row.into_iter().enumerate() {
            if index < group_len {
                result.group.insert(column, value);
                continue;
            }

            match column.as_str() {
                "count" => result.count = value_as_i64(&value),
                "sum" => result.sum = value_as_f64(&value),
                "avg" => result.avg = value_as_f64(&value),
                "min" => result.min = value,
                "max" => result.max = value,
                _ => {}
            }
        }

        result
    }
}

/// Numeric view of a column, treating NULL and non-numbers as 0
pub(crate) fn value_as_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub(crate) fn value_as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}
