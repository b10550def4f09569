//! In-memory executor for unit tests
//!
//! Interprets composed requests over JSON rows. It understands the predicate
//! shapes the condition set emits (`=`, `!=`, comparisons, `ILIKE`, `in`,
//! `not in`, `BETWEEN`, parenthesized `OR` groups), ordering, paging,
//! grouping with `COUNT/SUM/AVG/MIN/MAX` selects, and writes. Joins and
//! HAVING are recorded but not evaluated.

use crate::errors::StoreError;
use crate::query_builder::request::{Request, RequestKind, Row};
use crate::traits::{Association, Executor, Model, Transactional};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<Review>>,
}

impl Product {
    pub fn new(name: &str, category: &str, price: f64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            category: category.to_string(),
            price,
            owner: String::new(),
            reviews: None,
        }
    }
}

impl Model for Product {
    fn table_name() -> &'static str {
        "products"
    }

    fn association(name: &str) -> Option<Association> {
        match name {
            "reviews" => Some(Association::has_many("reviews", "product_id")),
            _ => None,
        }
    }

    fn create_table_sql(table: &str) -> Option<String> {
        Some(format!(
            "CREATE TABLE IF NOT EXISTS {} (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL, \
             category TEXT NOT NULL, price DOUBLE PRECISION NOT NULL, \
             owner TEXT NOT NULL DEFAULT '')",
            table
        ))
    }

    fn create_indexes_sql(table: &str) -> Vec<String> {
        vec![format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_category ON {} (category)",
            table, table
        )]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub product_id: i64,
    pub rating: i64,
}

impl Model for Review {
    fn table_name() -> &'static str {
        "reviews"
    }
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    requests: Vec<Request>,
    events: Vec<String>,
}

/// Shared in-memory tables; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryExecutor {
    state: Arc<Mutex<MemoryState>>,
    table_prefix: String,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_prefix(mut self, prefix: &str) -> Self {
        self.table_prefix = prefix.to_string();
        self
    }

    pub fn handle(&self) -> Arc<dyn Executor> {
        Arc::new(self.clone())
    }

    /// Append rows given as JSON objects
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut state = self.state.lock().unwrap();
        let target = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            match row {
                Value::Object(map) => target.push(map),
                other => panic!("seed rows must be objects, got {}", other),
            }
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }

    /// `begin`, `commit` and `rollback` in the order they happened
    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    fn run(&self, request: &Request) -> (Vec<Row>, u64) {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        let table = state.tables.entry(request.table.clone()).or_default();

        match &request.kind {
            RequestKind::Select => {
                let rows = select(table, request);
                let count = rows.len() as u64;
                (rows, count)
            }
            RequestKind::Count => {
                let total = count(table, request);
                let mut row = Map::new();
                row.insert("total".to_string(), Value::from(total));
                (vec![row], 1)
            }
            RequestKind::Delete => {
                let before = table.len();
                table.retain(|row| !filter_matches(request, row));
                (Vec::new(), (before - table.len()) as u64)
            }
            RequestKind::Update { assignments } => {
                let mut affected = 0;
                for row in table.iter_mut().filter(|row| filter_matches(request, row)) {
                    for (column, value) in assignments {
                        row.insert(column.clone(), value.clone());
                    }
                    affected += 1;
                }
                (Vec::new(), affected)
            }
            RequestKind::Insert {
                columns,
                rows,
                upsert_key,
            } => {
                let mut returned = Vec::with_capacity(rows.len());
                for values in rows {
                    let mut record: Row =
                        columns.iter().cloned().zip(values.iter().cloned()).collect();

                    if let Some(key) = upsert_key {
                        let key_value = record.get(key).cloned().unwrap_or(Value::Null);
                        if let Some(existing) = table
                            .iter_mut()
                            .find(|row| row.get(key) == Some(&key_value))
                        {
                            for (column, value) in record {
                                existing.insert(column, value);
                            }
                            returned.push(existing.clone());
                            continue;
                        }
                    }

                    if record.get("id").map_or(true, Value::is_null) {
                        let next_id = table
                            .iter()
                            .filter_map(|row| row.get("id").and_then(Value::as_i64))
                            .max()
                            .unwrap_or(0)
                            + 1;
                        record.insert("id".to_string(), Value::from(next_id));
                    }
                    table.push(record.clone());
                    returned.push(record);
                }
                let count = returned.len() as u64;
                (returned, count)
            }
        }
    }

    fn snapshot(&self) -> HashMap<String, Vec<Row>> {
        self.state.lock().unwrap().tables.clone()
    }

    fn restore(&self, tables: HashMap<String, Vec<Row>>) {
        self.state.lock().unwrap().tables = tables;
    }

    fn event(&self, name: &str) {
        self.state.lock().unwrap().events.push(name.to_string());
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn fetch_all(&self, request: &Request) -> Result<Vec<Row>, StoreError> {
        Ok(self.run(request).0)
    }

    async fn execute(&self, request: &Request) -> Result<u64, StoreError> {
        Ok(self.run(request).1)
    }

    async fn execute_raw(&self, _sql: &str) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn begin(&self) -> Result<Arc<dyn Transactional>, StoreError> {
        self.event("begin");
        Ok(Arc::new(MemoryTransaction {
            inner: self.clone(),
            snapshot: Mutex::new(Some(self.snapshot())),
        }))
    }

    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }
}

/// Writes go straight to the shared tables; rollback restores the snapshot taken at begin
pub struct MemoryTransaction {
    inner: MemoryExecutor,
    snapshot: Mutex<Option<HashMap<String, Vec<Row>>>>,
}

#[async_trait]
impl Executor for MemoryTransaction {
    async fn fetch_all(&self, request: &Request) -> Result<Vec<Row>, StoreError> {
        self.inner.fetch_all(request).await
    }

    async fn execute(&self, request: &Request) -> Result<u64, StoreError> {
        self.inner.execute(request).await
    }

    async fn execute_raw(&self, sql: &str) -> Result<u64, StoreError> {
        self.inner.execute_raw(sql).await
    }

    async fn begin(&self) -> Result<Arc<dyn Transactional>, StoreError> {
        Err(StoreError::Transaction(
            "nested transactions are not supported".to_string(),
        ))
    }

    fn table_prefix(&self) -> &str {
        self.inner.table_prefix()
    }
}

#[async_trait]
impl Transactional for MemoryTransaction {
    async fn commit(&self) -> Result<(), StoreError> {
        self.snapshot
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| StoreError::Transaction("already finished".to_string()))?;
        self.inner.event("commit");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let snapshot = self
            .snapshot
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| StoreError::Transaction("already finished".to_string()))?;
        self.inner.restore(snapshot);
        self.inner.event("rollback");
        Ok(())
    }

    fn as_executor(self: Arc<Self>) -> Arc<dyn Executor> {
        self
    }
}

// ---- evaluation ----

fn filter_matches(request: &Request, row: &Row) -> bool {
    match &request.filter {
        Some(clause) => {
            let mut args = clause.args.iter();
            eval(&clause.sql, &mut args, row)
        }
        None => true,
    }
}

fn select(table: &[Row], request: &Request) -> Vec<Row> {
    let matching: Vec<&Row> = table.iter().filter(|row| filter_matches(request, row)).collect();

    let mut rows = if is_aggregate(request) {
        aggregate_rows(&matching, request)
    } else {
        let mut rows: Vec<Row> = matching.into_iter().cloned().collect();
        sort_rows(&mut rows, &request.orders);
        rows = page(rows, request);
        rows.into_iter().map(|row| project(&row, &request.selects)).collect()
    };

    if is_aggregate(request) {
        sort_rows(&mut rows, &request.orders);
        rows = page(rows, request);
    }

    if request.distinct {
        let mut unique: Vec<Row> = Vec::new();
        for row in rows {
            if !unique.contains(&row) {
                unique.push(row);
            }
        }
        rows = unique;
    }

    rows
}

fn count(table: &[Row], request: &Request) -> i64 {
    let matching: Vec<&Row> = table.iter().filter(|row| filter_matches(request, row)).collect();

    if !request.group_by.is_empty() {
        return group(&matching, &request.group_by).len() as i64;
    }
    if request.distinct && !request.selects.is_empty() {
        let mut unique: Vec<Row> = Vec::new();
        for row in matching {
            let projected = project(row, &request.selects);
            if !unique.contains(&projected) {
                unique.push(projected);
            }
        }
        return unique.len() as i64;
    }
    matching.len() as i64
}

fn page(rows: Vec<Row>, request: &Request) -> Vec<Row> {
    let offset = request.offset.unwrap_or(0) as usize;
    let limit = request.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

fn column_name(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

/// `("SUM(price)", "sum")` from `"SUM(price) as sum"`
fn split_alias(select: &str) -> (&str, &str) {
    let lower = select.to_ascii_lowercase();
    match lower.rfind(" as ") {
        Some(pos) => (select[..pos].trim(), select[pos + 4..].trim()),
        None => (select.trim(), column_name(select.trim())),
    }
}

fn aggregate_call(expression: &str) -> Option<(String, &str)> {
    let open = expression.find('(')?;
    if !expression.ends_with(')') {
        return None;
    }
    let function = expression[..open].trim().to_ascii_uppercase();
    match function.as_str() {
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" => {
            Some((function, expression[open + 1..expression.len() - 1].trim()))
        }
        _ => None,
    }
}

fn is_aggregate(request: &Request) -> bool {
    !request.group_by.is_empty()
        || request
            .selects
            .iter()
            .any(|select| aggregate_call(split_alias(select).0).is_some())
}

fn project(row: &Row, selects: &[String]) -> Row {
    if selects.is_empty() || selects.iter().any(|s| s == "*" || s.ends_with(".*")) {
        return row.clone();
    }
    selects
        .iter()
        .map(|select| {
            let (expression, alias) = split_alias(select);
            let value = row
                .get(column_name(expression))
                .cloned()
                .unwrap_or(Value::Null);
            (alias.to_string(), value)
        })
        .collect()
}

fn group<'a>(rows: &[&'a Row], fields: &[String]) -> Vec<Vec<&'a Row>> {
    let mut keys: Vec<Vec<Value>> = Vec::new();
    let mut groups: Vec<Vec<&Row>> = Vec::new();

    for &row in rows {
        let key: Vec<Value> = fields
            .iter()
            .map(|field| row.get(column_name(field)).cloned().unwrap_or(Value::Null))
            .collect();
        match keys.iter().position(|existing| *existing == key) {
            Some(index) => groups[index].push(row),
            None => {
                keys.push(key);
                groups.push(vec![row]);
            }
        }
    }

    groups
}

fn aggregate_rows(rows: &[&Row], request: &Request) -> Vec<Row> {
    let groups = if request.group_by.is_empty() {
        vec![rows.to_vec()]
    } else {
        group(rows, &request.group_by)
    };

    let selects: Vec<String> = if request.selects.is_empty() {
        request.group_by.clone()
    } else {
        request.selects.clone()
    };

    groups
        .into_iter()
        .map(|members| {
            selects
                .iter()
                .map(|select| {
                    let (expression, alias) = split_alias(select);
                    let value = match aggregate_call(expression) {
                        Some((function, argument)) => {
                            apply_aggregate(&function, argument, &members)
                        }
                        None => members
                            .first()
                            .and_then(|row| row.get(column_name(expression)).cloned())
                            .unwrap_or(Value::Null),
                    };
                    (alias.to_string(), value)
                })
                .collect()
        })
        .collect()
}

fn apply_aggregate(function: &str, argument: &str, rows: &[&Row]) -> Value {
    if function == "COUNT" && argument == "*" {
        return Value::from(rows.len() as i64);
    }

    let (distinct, column) = match argument.strip_prefix("DISTINCT ") {
        Some(column) => (true, column.trim()),
        None => (false, argument),
    };

    let mut values: Vec<Value> = rows
        .iter()
        .filter_map(|row| row.get(column_name(column)))
        .filter(|value| !value.is_null())
        .cloned()
        .collect();
    if distinct {
        let mut unique = Vec::new();
        for value in values {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        values = unique;
    }

    match function {
        "COUNT" => Value::from(values.len() as i64),
        "SUM" | "AVG" if values.is_empty() => Value::Null,
        "SUM" => Value::from(values.iter().filter_map(Value::as_f64).sum::<f64>()),
        "AVG" => {
            let total: f64 = values.iter().filter_map(Value::as_f64).sum();
            Value::from(total / values.len() as f64)
        }
        "MIN" => values
            .into_iter()
            .min_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal))
            .unwrap_or(Value::Null),
        "MAX" => values
            .into_iter()
            .max_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal))
            .unwrap_or(Value::Null),
        other => panic!("unsupported aggregate in memory executor: {}", other),
    }
}

fn sort_rows(rows: &mut [Row], orders: &[String]) {
    if orders.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for order in orders {
            let (column, desc) = match order.rsplit_once(' ') {
                Some((column, direction)) => {
                    (column.trim(), direction.eq_ignore_ascii_case("DESC"))
                }
                None => (order.as_str(), false),
            };
            let left = a.get(column_name(column)).unwrap_or(&Value::Null);
            let right = b.get(column_name(column)).unwrap_or(&Value::Null);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                // NULLs sort last ascending, like Postgres
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ => compare(left, right).unwrap_or(Ordering::Equal),
            };
            let ordering = if desc { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    compare(a, b) == Some(Ordering::Equal) || a == b
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn ilike(value: &Value, pattern: &Value) -> bool {
    if value.is_null() {
        return false;
    }
    let value = text(value).to_lowercase();
    let pattern = text(pattern).to_lowercase();
    match (pattern.strip_prefix('%'), pattern.strip_suffix('%')) {
        (Some(_), Some(_)) if pattern.len() >= 2 => value.contains(&pattern[1..pattern.len() - 1]),
        (Some(rest), None) => value.ends_with(rest),
        (None, Some(rest)) => value.starts_with(rest),
        _ => value == pattern,
    }
}

/// Split at `separator` outside parentheses and quotes
fn split_top_level<'a>(expression: &'a str, separator: &str) -> Vec<&'a str> {
    let bytes = expression.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_literal = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_literal = !in_literal,
            b'(' if !in_literal => depth += 1,
            b')' if !in_literal => depth -= 1,
            _ if depth == 0 && !in_literal && bytes[i..].starts_with(separator.as_bytes()) => {
                parts.push(&expression[start..i]);
                i += separator.len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&expression[start..]);
    parts
}

/// Inner text when the whole expression is wrapped in one pair of parentheses
fn strip_outer_parens(expression: &str) -> Option<&str> {
    if !expression.starts_with('(') || !expression.ends_with(')') {
        return None;
    }
    let mut depth = 0;
    for (i, ch) in expression.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != expression.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(&expression[1..expression.len() - 1])
}

fn eval<'a>(expression: &str, args: &mut std::slice::Iter<'a, Value>, row: &Row) -> bool {
    let expression = expression.trim();

    if let Some(inner) = strip_outer_parens(expression) {
        return eval(inner, args, row);
    }

    let alternatives = split_top_level(expression, " OR ");
    if alternatives.len() > 1 {
        // Evaluate every branch so arguments are consumed in order
        let results: Vec<bool> = alternatives.iter().map(|part| eval(part, args, row)).collect();
        return results.into_iter().any(|matched| matched);
    }

    let mut conjuncts: Vec<String> = Vec::new();
    for part in split_top_level(expression, " AND ") {
        match conjuncts.last_mut() {
            Some(last) if last.ends_with("BETWEEN ?") => {
                last.push_str(" AND ");
                last.push_str(part);
            }
            _ => conjuncts.push(part.to_string()),
        }
    }
    if conjuncts.len() > 1 {
        let results: Vec<bool> = conjuncts.iter().map(|part| eval(part, args, row)).collect();
        return results.into_iter().all(|matched| matched);
    }

    eval_comparison(expression, args, row)
}

fn eval_comparison<'a>(
    expression: &str,
    args: &mut std::slice::Iter<'a, Value>,
    row: &Row,
) -> bool {
    let (column, operation) = expression
        .split_once(' ')
        .unwrap_or_else(|| panic!("unsupported predicate: {}", expression));
    let value = row.get(column_name(column)).unwrap_or(&Value::Null);
    let mut next = || {
        args.next()
            .unwrap_or_else(|| panic!("missing argument for: {}", expression))
    };

    match operation.trim() {
        "= ?" => equal(value, next()),
        "!= ?" | "<> ?" => !value.is_null() && !equal(value, next()),
        "> ?" => compare(value, next()) == Some(Ordering::Greater),
        ">= ?" => matches!(compare(value, next()), Some(Ordering::Greater | Ordering::Equal)),
        "< ?" => compare(value, next()) == Some(Ordering::Less),
        "<= ?" => matches!(compare(value, next()), Some(Ordering::Less | Ordering::Equal)),
        "ILIKE ?" | "LIKE ?" => ilike(value, next()),
        "in (?)" | "IN (?)" => match next() {
            Value::Array(items) => items.iter().any(|item| equal(value, item)),
            single => equal(value, single),
        },
        "not in (?)" | "NOT IN (?)" => match next() {
            Value::Array(items) => {
                !value.is_null()
                    && !items.is_empty()
                    && !items.iter().any(|item| equal(value, item))
            }
            single => !value.is_null() && !equal(value, single),
        },
        "BETWEEN ? AND ?" => {
            let low = next();
            let high = next();
            matches!(compare(value, low), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare(value, high), Some(Ordering::Less | Ordering::Equal))
        }
        "IS NULL" => value.is_null(),
        "IS NOT NULL" => !value.is_null(),
        other => panic!("unsupported operator in memory executor: {}", other),
    }
}
