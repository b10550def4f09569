//! Aggregate helpers
//!
//! Stateless functions that run one aggregate query against a model's table,
//! optionally scoped by a condition set.

use crate::errors::StoreError;
use crate::query_builder::aggregation::{
    value_as_f64, value_as_i64, AggregateFunction, GroupByResult,
};
use crate::query_builder::filter::Where;
use crate::query_builder::request::{BoundClause, Request};
use crate::query_builder::QueryBuilder;
use crate::traits::{Executor, Model};
use serde_json::{Map, Value};
use std::sync::Arc;

fn scoped<T: Model>(executor: &Arc<dyn Executor>, conditions: Option<&Where>) -> QueryBuilder<T> {
    let mut query = QueryBuilder::<T>::new(Arc::clone(executor));
    if let Some(conditions) = conditions {
        query.conditions = conditions.clone();
    }
    query
}

fn table_request<T: Model>(
    executor: &Arc<dyn Executor>,
    conditions: Option<&Where>,
    selects: Vec<String>,
) -> Result<Request, StoreError> {
    let filter = match conditions {
        Some(conditions) => {
            let (sql, args) = conditions.build()?;
            BoundClause::compose(sql, args)
        }
        None => None,
    };

    Ok(Request::select(format!("{}{}", executor.table_prefix(), T::table_name()))
        .with_selects(selects)
        .with_filter(filter))
}

pub async fn sum<T: Model>(
    executor: &Arc<dyn Executor>,
    field: &str,
    conditions: Option<&Where>,
) -> Result<f64, StoreError> {
    scoped::<T>(executor, conditions).sum(field).await
}

pub async fn avg<T: Model>(
    executor: &Arc<dyn Executor>,
    field: &str,
    conditions: Option<&Where>,
) -> Result<f64, StoreError> {
    scoped::<T>(executor, conditions).avg(field).await
}

pub async fn min<T: Model>(
    executor: &Arc<dyn Executor>,
    field: &str,
    conditions: Option<&Where>,
) -> Result<Value, StoreError> {
    scoped::<T>(executor, conditions).min(field).await
}

pub async fn max<T: Model>(
    executor: &Arc<dyn Executor>,
    field: &str,
    conditions: Option<&Where>,
) -> Result<Value, StoreError> {
    scoped::<T>(executor, conditions).max(field).await
}

/// Number of distinct non-null values of `field`
pub async fn count_distinct<T: Model>(
    executor: &Arc<dyn Executor>,
    field: &str,
    conditions: Option<&Where>,
) -> Result<i64, StoreError> {
    let function = AggregateFunction::CountDistinct;
    let request = table_request::<T>(
        executor,
        conditions,
        vec![function.aliased(field, function.name())],
    )?;

    let rows = executor.fetch_all(&request).await?;
    Ok(rows
        .first()
        .and_then(|row| row.get(function.name()))
        .map(value_as_i64)
        .unwrap_or(0))
}

/// Group matching rows by `fields` and compute the given aggregate expressions.
///
/// `aggregates` are select expressions aliased to `count`, `sum`, `avg`,
/// `min` or `max`, e.g. `"COUNT(*) as count"`.
pub async fn group_by<T: Model>(
    executor: &Arc<dyn Executor>,
    fields: &[&str],
    conditions: Option<&Where>,
    aggregates: &[&str],
) -> Result<Vec<GroupByResult>, StoreError> {
    if fields.is_empty() {
        return Err(StoreError::MissingConfiguration(
            "group by requires at least one field".to_string(),
        ));
    }

    let group: Vec<String> = fields.iter().map(|field| field.to_string()).collect();
    let mut selects = group.clone();
    selects.extend(aggregates.iter().map(|expression| expression.to_string()));

    let request = table_request::<T>(executor, conditions, selects)?.with_group_by(group);
    let rows = executor.fetch_all(&request).await?;

    Ok(rows
        .into_iter()
        .map(|row| GroupByResult::from_row(row, fields.len()))
        .collect())
}

/// Several aggregates of one field in a single query, keyed by operation name.
///
/// Operations are `sum`, `avg`, `min`, `max`, `count` and `count_distinct`
/// (case-insensitive). Unknown names fail before anything is queried.
pub async fn aggregate<T: Model>(
    executor: &Arc<dyn Executor>,
    field: &str,
    conditions: Option<&Where>,
    operations: &[&str],
) -> Result<Map<String, Value>, StoreError> {
    if operations.is_empty() {
        return Err(StoreError::MissingConfiguration(
            "aggregate requires at least one operation".to_string(),
        ));
    }

    let functions = operations
        .iter()
        .map(|op| op.parse::<AggregateFunction>())
        .collect::<Result<Vec<_>, _>>()?;

    let selects = functions
        .iter()
        .map(|function| function.aliased(field, function.name()))
        .collect();

    let request = table_request::<T>(executor, conditions, selects)?;
    let row = executor
        .fetch_all(&request)
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();

    let mut results = Map::new();
    for function in functions {
        let value = row.get(function.name()).cloned().unwrap_or(Value::Null);
        let value = match function {
            AggregateFunction::Sum | AggregateFunction::Avg => Value::from(value_as_f64(&value)),
            AggregateFunction::Count | AggregateFunction::CountDistinct => {
                Value::from(value_as_i64(&value))
            }
            AggregateFunction::Min | AggregateFunction::Max => value,
        };
        results.insert(function.name().to_string(), value);
    }

    Ok(results)
}
