//! Query builder utilities
//!
//! This module provides the fluent, per-model query builder. Chain methods
//! only accumulate state; every terminal operation compiles that state into a
//! single `Request` and hands it to the executor.

use crate::errors::StoreError;
use crate::query_builder::aggregation::{value_as_f64, value_as_i64, AggregateFunction};
use crate::query_builder::filter::{ConditionKind, Where, WhereOptions};
use crate::query_builder::join::{JoinClause, JoinType};
use crate::query_builder::ordering::OrderBy;
use crate::query_builder::pagination::{page_window, Paginated};
use crate::query_builder::request::{BoundClause, Request, RequestKind, Row};
use crate::traits::{with_transaction, Executor, Model};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Query builder for constructing and running queries against one model's table
pub struct QueryBuilder<T: Model> {
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) table: String,
    pub(crate) conditions: Where,
    pub(crate) order_by: OrderBy,
    pub(crate) selects: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) preloads: Vec<String>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: Where,
    _phantom: PhantomData<T>,
}

impl<T: Model> Clone for QueryBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            table: self.table.clone(),
            conditions: self.conditions.clone(),
            order_by: self.order_by.clone(),
            selects: self.selects.clone(),
            distinct: self.distinct,
            limit: self.limit,
            offset: self.offset,
            joins: self.joins.clone(),
            preloads: self.preloads.clone(),
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: Model> std::fmt::Debug for QueryBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("table", &self.table)
            .field("conditions", &self.conditions)
            .field("order_by", &self.order_by)
            .field("selects", &self.selects)
            .field("distinct", &self.distinct)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("joins", &self.joins)
            .field("preloads", &self.preloads)
            .field("group_by", &self.group_by)
            .field("having", &self.having)
            .finish()
    }
}

impl<T: Model> QueryBuilder<T> {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let table = format!("{}{}", executor.table_prefix(), T::table_name());
        Self {
            executor,
            table,
            conditions: Where::new(),
            order_by: OrderBy::new(),
            selects: Vec::new(),
            distinct: false,
            limit: None,
            offset: None,
            joins: Vec::new(),
            preloads: Vec::new(),
            group_by: Vec::new(),
            having: Where::new(),
            _phantom: PhantomData,
        }
    }

    /// Table name including the executor's prefix
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    // ---- filters ----

    /// Equality filter; replaces an earlier filter on the same field
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.set(field, value);
        self
    }

    /// Filter with an explicit condition kind; replaces an earlier filter on the same field
    pub fn filter_with(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
        options: impl Into<WhereOptions>,
    ) -> Self {
        self.conditions.set_with(field, value, options);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter_with(field, value, ConditionKind::Equal)
    }

    pub fn where_ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter_with(field, value, ConditionKind::NotEqual)
    }

    pub fn where_in<V: Into<Value>>(self, field: impl Into<String>, values: Vec<V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        self.filter_with(field, Value::Array(values), ConditionKind::In)
    }

    pub fn where_not_in<V: Into<Value>>(self, field: impl Into<String>, values: Vec<V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        self.filter_with(field, Value::Array(values), ConditionKind::NotIn)
    }

    /// Case-insensitive substring match
    pub fn where_like(self, field: impl Into<String>, text: impl Into<Value>) -> Self {
        self.filter_with(field, text, ConditionKind::Fuzzy)
    }

    /// Inclusive range; never replaces other filters
    pub fn where_between(
        mut self,
        field: &str,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        self.conditions.add_with(
            format!("{} BETWEEN ? AND ?", field),
            Value::Array(vec![start.into(), end.into()]),
            ConditionKind::Plain,
        );
        self
    }

    /// Raw predicate with `?` placeholders; never replaces other filters
    pub fn where_raw(mut self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.conditions
            .add_with(sql, Value::Array(args), ConditionKind::Plain);
        self
    }

    /// Merge a prepared condition set.
    ///
    /// Keys present in `conditions` replace the builder's conditions on those
    /// keys; repeated keys within `conditions` are all kept, in order.
    pub fn with_where(mut self, conditions: Where) -> Self {
        if !conditions.full_text_search_fields().is_empty() {
            self.conditions
                .set_full_text_search_fields(conditions.full_text_search_fields().to_vec());
        }
        for item in conditions.items() {
            self.conditions.del_all(&item.key);
        }
        for item in conditions.items() {
            let options = WhereOptions {
                kind: item.kind,
                full_text_search_fields: item.full_text_search_fields.clone(),
            };
            self.conditions
                .add_with(item.key.clone(), item.value.clone(), options);
        }
        self
    }

    /// Default fields searched by `q` and full-text conditions
    pub fn full_text_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.set_full_text_search_fields(fields);
        self
    }

    // ---- projection, sort, paging ----

    /// Add columns to the projection; no columns selects `*`
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selects.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Add ordering
    pub fn order_by(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.order_by.append(field, desc);
        self
    }

    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(field, false)
    }

    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.order_by(field, true)
    }

    /// Append every entry of a prepared order specification
    pub fn with_order(mut self, order_by: &OrderBy) -> Self {
        for entry in order_by.entries() {
            self.order_by.append(entry.key.clone(), entry.is_desc());
        }
        self
    }

    /// Add limit
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add offset
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 1-based page; a zero `size` leaves limit and offset unchanged
    pub fn page(mut self, page: u64, size: u64) -> Self {
        if let Some((limit, offset)) = page_window(page, size) {
            self.limit = Some(limit);
            if offset.is_some() {
                self.offset = offset;
            }
        }
        self
    }

    // ---- joins, grouping, eager loading ----

    pub fn join(
        self,
        table: impl Into<String>,
        condition: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        self.join_with(JoinClause::new(JoinType::Inner, table, condition, args))
    }

    pub fn left_join(
        self,
        table: impl Into<String>,
        condition: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        self.join_with(JoinClause::new(JoinType::Left, table, condition, args))
    }

    pub fn right_join(
        self,
        table: impl Into<String>,
        condition: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        self.join_with(JoinClause::new(JoinType::Right, table, condition, args))
    }

    pub fn join_with(mut self, join: JoinClause) -> Self {
        self.joins.push(join);
        self
    }

    /// Eager-load a relation declared by `Model::association`
    pub fn preload(mut self, association: impl Into<String>) -> Self {
        self.preloads.push(association.into());
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Equality condition on grouped rows; the field may be an aggregate expression
    pub fn having(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.having.set(field, value);
        self
    }

    pub fn having_with(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
        options: impl Into<WhereOptions>,
    ) -> Self {
        self.having.set_with(field, value, options);
        self
    }

    // ---- composition ----

    fn compile_filter(&self) -> Result<Option<BoundClause>, StoreError> {
        let (sql, args) = self.conditions.build()?;
        Ok(BoundClause::compose(sql, args))
    }

    fn compile_having(&self) -> Result<Option<BoundClause>, StoreError> {
        let (sql, args) = self.having.build()?;
        Ok(BoundClause::compose(sql, args))
    }

    fn request(&self, kind: RequestKind) -> Result<Request, StoreError> {
        let mut request = Request::new(self.table.clone(), kind);
        request.selects = self.selects.clone();
        request.distinct = self.distinct;
        request.joins = self.joins.clone();
        request.filter = self.compile_filter()?;
        request.orders = self.order_by.directives();
        request.group_by = self.group_by.clone();
        request.having = self.compile_having()?;
        request.limit = self.limit;
        request.offset = self.offset;
        Ok(request)
    }

    /// The composed SELECT request
    pub fn to_request(&self) -> Result<Request, StoreError> {
        self.request(RequestKind::Select)
    }

    /// Rendered SELECT statement and its arguments, for debugging
    pub fn to_sql(&self) -> Result<(String, Vec<Value>), StoreError> {
        let request = self.to_request()?;
        self.executor.render(&request)
    }

    // ---- reads ----

    /// All matching records
    pub async fn find(&self) -> Result<Vec<T>, StoreError> {
        self.check_preloads()?;
        let request = self.to_request()?;
        let mut rows = self.executor.fetch_all(&request).await?;
        self.apply_preloads(&mut rows).await?;
        decode_rows(&self.table, rows)
    }

    /// First record by primary key, or by the explicit order when one is set
    pub async fn first(&self) -> Result<T, StoreError> {
        let mut query = self.clone();
        if query.order_by.is_empty() {
            query.order_by.asc(T::primary_key_field());
        }
        query.take_one("first").await
    }

    /// Last record by primary key, or by the explicit order reversed
    pub async fn last(&self) -> Result<T, StoreError> {
        let mut query = self.clone();
        query.order_by = if query.order_by.is_empty() {
            let mut order_by = OrderBy::new();
            order_by.desc(T::primary_key_field());
            order_by
        } else {
            query.order_by.reversed()
        };
        query.take_one("last").await
    }

    async fn take_one(mut self, operation: &str) -> Result<T, StoreError> {
        self.limit = Some(1);
        self.find()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("{} ({})", self.table, operation)))
    }

    /// Number of matching rows; number of groups when grouped
    pub async fn count(&self) -> Result<i64, StoreError> {
        let mut request = self.request(RequestKind::Count)?;
        request.orders.clear();
        request.limit = None;
        request.offset = None;
        if !request.distinct {
            request.selects.clear();
        }

        let rows = self.executor.fetch_all(&request).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("total"))
            .map(value_as_i64)
            .unwrap_or(0))
    }

    pub async fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.count().await? > 0)
    }

    /// Decode matching rows into any deserializable shape
    pub async fn scan<D: DeserializeOwned>(&self) -> Result<Vec<D>, StoreError> {
        let request = self.to_request()?;
        let rows = self.executor.fetch_all(&request).await?;
        decode_rows(&self.table, rows)
    }

    /// Values of one column across matching rows
    pub async fn pluck<V: DeserializeOwned>(&self, column: &str) -> Result<Vec<V>, StoreError> {
        let request = self.to_request()?.with_selects(vec![column.to_string()]);
        let key = column.rsplit('.').next().unwrap_or(column);

        self.executor
            .fetch_all(&request)
            .await?
            .into_iter()
            .map(|mut row| {
                let value = row.remove(key).unwrap_or(Value::Null);
                serde_json::from_value(value).map_err(|e| StoreError::decode(&self.table, e))
            })
            .collect()
    }

    async fn aggregate_value(
        &self,
        function: AggregateFunction,
        field: &str,
    ) -> Result<Value, StoreError> {
        let mut request = self
            .to_request()?
            .with_selects(vec![function.aliased(field, function.name())]);
        request.orders.clear();
        request.limit = None;
        request.offset = None;
        request.distinct = false;

        let rows = self.executor.fetch_all(&request).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(function.name()))
            .unwrap_or(Value::Null))
    }

    /// SUM over matching rows; 0.0 when nothing matches
    pub async fn sum(&self, field: &str) -> Result<f64, StoreError> {
        let value = self.aggregate_value(AggregateFunction::Sum, field).await?;
        Ok(value_as_f64(&value))
    }

    /// AVG over matching rows; 0.0 when nothing matches
    pub async fn avg(&self, field: &str) -> Result<f64, StoreError> {
        let value = self.aggregate_value(AggregateFunction::Avg, field).await?;
        Ok(value_as_f64(&value))
    }

    pub async fn min(&self, field: &str) -> Result<Value, StoreError> {
        self.aggregate_value(AggregateFunction::Min, field).await
    }

    pub async fn max(&self, field: &str) -> Result<Value, StoreError> {
        self.aggregate_value(AggregateFunction::Max, field).await
    }

    /// One page of records plus the total count under the same filters
    pub async fn paginate(&self, page: u64, page_size: u64) -> Result<Paginated<T>, StoreError> {
        let total = self.count().await?;
        let items = self.clone().page(page, page_size).find().await?;

        Ok(Paginated {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Walk matching records in windows of `size`, stopping at the first short batch
    pub async fn chunk<F, Fut>(&self, size: u64, mut callback: F) -> Result<(), StoreError>
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        self.batches(size, |batch, _| callback(batch)).await
    }

    /// Like `chunk`, ordered by primary key unless an order is set; batches are numbered from 1
    pub async fn find_in_batches<F, Fut>(&self, size: u64, callback: F) -> Result<(), StoreError>
    where
        F: FnMut(Vec<T>, u64) -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        let mut query = self.clone();
        if query.order_by.is_empty() {
            query.order_by.asc(T::primary_key_field());
        }
        query.batches(size, callback).await
    }

    async fn batches<F, Fut>(&self, size: u64, mut callback: F) -> Result<(), StoreError>
    where
        F: FnMut(Vec<T>, u64) -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        if size == 0 {
            return Err(StoreError::InvalidData(
                "batch size must be greater than 0".to_string(),
            ));
        }

        let mut offset = self.offset.unwrap_or(0);
        let mut batch_no = 1;

        loop {
            let batch = self.clone().limit(size).offset(offset).find().await?;
            let fetched = batch.len() as u64;
            if fetched == 0 {
                break;
            }

            callback(batch, batch_no).await?;

            if fetched < size {
                break;
            }
            offset += size;
            batch_no += 1;
        }

        Ok(())
    }

    // ---- writes ----

    /// Delete matching rows; refuses to run without a filter
    pub async fn delete(&self) -> Result<u64, StoreError> {
        let filter = self
            .compile_filter()?
            .ok_or_else(|| StoreError::MissingWhereClause("delete".to_string()))?;

        let request =
            Request::new(self.table.clone(), RequestKind::Delete).with_filter(Some(filter));
        self.executor.execute(&request).await
    }

    /// Set columns on matching rows; refuses to run without a filter
    pub async fn update(&self, values: Map<String, Value>) -> Result<u64, StoreError> {
        if values.is_empty() {
            return Err(StoreError::InvalidData(
                "update requires at least one column".to_string(),
            ));
        }
        let filter = self
            .compile_filter()?
            .ok_or_else(|| StoreError::MissingWhereClause("update".to_string()))?;

        let request = Request::new(
            self.table.clone(),
            RequestKind::Update {
                assignments: values.into_iter().collect(),
            },
        )
        .with_filter(Some(filter));
        self.executor.execute(&request).await
    }

    /// Same as `update`
    pub async fn update_columns(&self, values: Map<String, Value>) -> Result<u64, StoreError> {
        self.update(values).await
    }

    /// Insert one record and return it as stored
    pub async fn create(&self, record: &T) -> Result<T, StoreError> {
        let mut created = self.insert(std::slice::from_ref(record), None).await?;
        created
            .pop()
            .ok_or_else(|| StoreError::decode(&self.table, "insert returned no rows"))
    }

    /// Insert, or update every column when the primary key already exists
    pub async fn save(&self, record: &T) -> Result<T, StoreError> {
        let pk = T::primary_key_field();
        let fields = record_fields(&self.table, record)?;
        if fields.get(pk).map_or(true, Value::is_null) {
            return self.create(record).await;
        }

        let request = Request::new(
            self.table.clone(),
            RequestKind::Insert {
                columns: fields.keys().cloned().collect(),
                rows: vec![fields.into_iter().map(|(_, value)| value).collect()],
                upsert_key: Some(pk.to_string()),
            },
        );
        let mut saved: Vec<T> = decode_rows(&self.table, self.executor.fetch_all(&request).await?)?;
        saved
            .pop()
            .ok_or_else(|| StoreError::decode(&self.table, "upsert returned no rows"))
    }

    /// Insert records `size` at a time, one statement per batch
    pub async fn create_in_batches(
        &self,
        records: &[T],
        size: usize,
    ) -> Result<Vec<T>, StoreError> {
        if size == 0 {
            return Err(StoreError::InvalidData(
                "batch size must be greater than 0".to_string(),
            ));
        }

        let mut created = Vec::with_capacity(records.len());
        for batch in records.chunks(size) {
            created.extend(self.insert(batch, None).await?);
        }
        Ok(created)
    }

    async fn insert(
        &self,
        records: &[T],
        upsert_key: Option<String>,
    ) -> Result<Vec<T>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let rows = records
            .iter()
            .map(|record| record_fields(&self.table, record))
            .collect::<Result<Vec<_>, _>>()?;

        // Columns that are null in every record are left to their defaults
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for (column, value) in row {
                if !value.is_null() && !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        if columns.is_empty() {
            return Err(StoreError::InvalidData(format!(
                "nothing to insert into {}",
                self.table
            )));
        }

        let values = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        let request = Request::new(
            self.table.clone(),
            RequestKind::Insert {
                columns,
                rows: values,
                upsert_key,
            },
        );
        decode_rows(&self.table, self.executor.fetch_all(&request).await?)
    }

    /// Run `f` with a copy of this builder bound to a new transaction.
    ///
    /// Commits when `f` succeeds and rolls back when it fails.
    pub async fn transaction<F, Fut, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(QueryBuilder<T>) -> Fut,
        Fut: Future<Output = Result<R, StoreError>>,
    {
        with_transaction(&self.executor, |handle| {
            let mut query = self.clone();
            query.executor = handle;
            f(query)
        })
        .await
    }

    // ---- eager loading ----

    fn check_preloads(&self) -> Result<(), StoreError> {
        for name in &self.preloads {
            if T::association(name).is_none() {
                return Err(StoreError::UnsupportedRelation(format!(
                    "{} has no association named {}",
                    T::table_name(),
                    name
                )));
            }
        }
        Ok(())
    }

    async fn apply_preloads(&self, rows: &mut [Row]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        for name in &self.preloads {
            let association = T::association(name).ok_or_else(|| {
                StoreError::UnsupportedRelation(format!(
                    "{} has no association named {}",
                    T::table_name(),
                    name
                ))
            })?;
            let local_key = association.local_key.unwrap_or(T::primary_key_field());

            let mut keys: Vec<Value> = Vec::new();
            for row in rows.iter() {
                if let Some(key) = row.get(local_key).filter(|key| !key.is_null()) {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }

            let related = if keys.is_empty() {
                Vec::new()
            } else {
                let mut conditions = Where::new();
                conditions.set_with(association.foreign_key, Value::Array(keys), ConditionKind::In);
                let (sql, args) = conditions.build()?;
                let request = Request::select(format!(
                    "{}{}",
                    self.executor.table_prefix(),
                    association.table
                ))
                .with_filter(BoundClause::compose(sql, args));
                self.executor.fetch_all(&request).await?
            };

            for row in rows.iter_mut() {
                let key = row.get(local_key).cloned().unwrap_or(Value::Null);
                let mut matches = related
                    .iter()
                    .filter(|candidate| {
                        !key.is_null() && candidate.get(association.foreign_key) == Some(&key)
                    })
                    .map(|candidate| Value::Object(candidate.clone()));

                let value = if association.single {
                    matches.next().unwrap_or(Value::Null)
                } else {
                    Value::Array(matches.collect())
                };
                row.insert(name.clone(), value);
            }
        }

        Ok(())
    }
}

pub(crate) fn record_fields<T: Model>(
    table: &str,
    record: &T,
) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(record).map_err(|e| StoreError::decode(table, e))? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::InvalidData(format!(
            "{} records must serialize to an object, got {}",
            table, other
        ))),
    }
}

pub(crate) fn decode_rows<D: DeserializeOwned>(
    table: &str,
    rows: Vec<Row>,
) -> Result<Vec<D>, StoreError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::decode(table, e))
        })
        .collect()
}
