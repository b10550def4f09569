//! Condition sets
//!
//! A `Where` is an ordered list of `WhereOne` items that compiles into one
//! AND-joined predicate with `?` placeholders and a positional argument list.

use crate::errors::StoreError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Reserved key that always compiles as a full-text search
pub const FULL_TEXT_SEARCH_KEY: &str = "q";

/// Comparison performed by a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionKind {
    #[default]
    Equal, // =
    NotEqual,       // !=
    Fuzzy,          // ILIKE %value%
    In,             // in (?)
    NotIn,          // not in (?)
    Plain,          // raw boolean expression in the key
    FullTextSearch, // (f1 ILIKE ? OR f2 ILIKE ? ...)
}

/// Options accepted by `Where::set_with` / `Where::add_with`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereOptions {
    pub kind: ConditionKind,
    pub full_text_search_fields: Vec<String>,
}

impl WhereOptions {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            full_text_search_fields: Vec::new(),
        }
    }

    pub fn equal() -> Self {
        Self::new(ConditionKind::Equal)
    }

    pub fn not_equal() -> Self {
        Self::new(ConditionKind::NotEqual)
    }

    pub fn fuzzy() -> Self {
        Self::new(ConditionKind::Fuzzy)
    }

    pub fn in_list() -> Self {
        Self::new(ConditionKind::In)
    }

    pub fn not_in_list() -> Self {
        Self::new(ConditionKind::NotIn)
    }

    pub fn plain() -> Self {
        Self::new(ConditionKind::Plain)
    }

    /// Full-text search over the given fields; an empty list falls back to the
    /// owning set's default fields at build time
    pub fn full_text_search<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            kind: ConditionKind::FullTextSearch,
            full_text_search_fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ConditionKind> for WhereOptions {
    fn from(kind: ConditionKind) -> Self {
        Self::new(kind)
    }
}

/// A single named filter criterion
#[derive(Debug, Clone, PartialEq)]
pub struct WhereOne {
    pub key: String,
    pub value: Value,
    pub kind: ConditionKind,
    pub full_text_search_fields: Vec<String>,
}

impl WhereOne {
    fn new(key: String, value: Value, options: WhereOptions) -> Self {
        Self {
            key,
            value,
            kind: options.kind,
            full_text_search_fields: options.full_text_search_fields,
        }
    }
}

/// Ordered condition set compiled to `(predicate, args)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    items: Vec<WhereOne>,
    full_text_search_fields: Vec<String>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set of equality conditions from flat key/value input
    pub fn from_map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut where_ = Self::new();
        for (key, value) in pairs {
            where_.set(key, value);
        }
        where_
    }

    /// Default fields for full-text items without their own list (and for `q`)
    pub fn with_full_text_search_fields<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.set_full_text_search_fields(fields);
        self
    }

    pub fn set_full_text_search_fields<S: Into<String>>(
        &mut self,
        fields: impl IntoIterator<Item = S>,
    ) {
        self.full_text_search_fields = fields.into_iter().map(Into::into).collect();
    }

    pub fn full_text_search_fields(&self) -> &[String] {
        &self.full_text_search_fields
    }

    /// Replace any condition on `key` with an equality condition
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.set_with(key, value, WhereOptions::default())
    }

    /// Replace any condition on `key` (delete, then append)
    pub fn set_with(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        options: impl Into<WhereOptions>,
    ) -> &mut Self {
        let key = key.into();
        if self.get(&key).is_some() {
            self.del(&key);
        }
        self.add_with(key, value, options)
    }

    /// Append an equality condition, keeping existing ones on the same key
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.add_with(key, value, WhereOptions::default())
    }

    /// Append a condition unconditionally
    pub fn add_with(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        options: impl Into<WhereOptions>,
    ) -> &mut Self {
        self.items
            .push(WhereOne::new(key.into(), value.into(), options.into()));
        self
    }

    /// Value of the first condition on `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| &item.value)
    }

    /// Remove the first condition on `key`
    pub fn del(&mut self, key: &str) -> &mut Self {
        if let Some(index) = self.items.iter().position(|item| item.key == key) {
            self.items.remove(index);
        }
        self
    }

    /// Remove every condition on `key`
    pub fn del_all(&mut self, key: &str) -> &mut Self {
        self.items.retain(|item| item.key != key);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WhereOne] {
        &self.items
    }

    pub fn reset(&mut self) {
        self.items.clear();
    }

    /// Compile into an AND-joined predicate and its positional arguments
    pub fn build(&self) -> Result<(String, Vec<Value>), StoreError> {
        let mut clauses = Vec::with_capacity(self.items.len());
        let mut args = Vec::with_capacity(self.items.len());

        for item in &self.items {
            let kind = if item.key == FULL_TEXT_SEARCH_KEY {
                ConditionKind::FullTextSearch
            } else {
                item.kind
            };

            match kind {
                ConditionKind::Equal => {
                    clauses.push(format!("{} = ?", item.key));
                    args.push(item.value.clone());
                }
                ConditionKind::NotEqual => {
                    clauses.push(format!("{} != ?", item.key));
                    args.push(item.value.clone());
                }
                ConditionKind::Fuzzy => {
                    clauses.push(format!("{} ILIKE ?", item.key));
                    args.push(Value::String(fuzzy(&value_text(&item.value))));
                }
                ConditionKind::In => {
                    clauses.push(format!("{} in (?)", item.key));
                    args.push(item.value.clone());
                }
                ConditionKind::NotIn => {
                    clauses.push(format!("{} not in (?)", item.key));
                    args.push(item.value.clone());
                }
                ConditionKind::Plain => {
                    clauses.push(format!("({})", item.key));
                    match &item.value {
                        Value::Array(values) => args.extend(values.iter().cloned()),
                        other => args.push(other.clone()),
                    }
                }
                ConditionKind::FullTextSearch => {
                    let (clause, search_args) = self.build_full_text_search(item)?;
                    clauses.push(clause);
                    args.extend(search_args);
                }
            }
        }

        Ok((clauses.join(" AND "), args))
    }

    fn build_full_text_search(&self, item: &WhereOne) -> Result<(String, Vec<Value>), StoreError> {
        let fields = if item.key == FULL_TEXT_SEARCH_KEY && !self.full_text_search_fields.is_empty()
        {
            &self.full_text_search_fields
        } else if !item.full_text_search_fields.is_empty() {
            &item.full_text_search_fields
        } else {
            &self.full_text_search_fields
        };

        if fields.is_empty() {
            return Err(StoreError::InvalidCondition(format!(
                "full text search fields are required (key: {})",
                item.key
            )));
        }

        let keyword = item.value.as_str().ok_or_else(|| {
            StoreError::InvalidCondition(format!(
                "value must be string when full text search is requested (key: {})",
                item.key
            ))
        })?;
        let pattern = fuzzy(&keyword.replacen(":*", "", 1));

        let clause = fields
            .iter()
            .map(|field| format!("{} ILIKE ?", field))
            .collect::<Vec<_>>()
            .join(" OR ");
        let args = vec![Value::String(pattern); fields.len()];

        Ok((format!("({})", clause), args))
    }

    /// Log every condition at debug level
    pub fn debug(&self) {
        for item in &self.items {
            tracing::debug!(
                key = %item.key,
                value = %item.value,
                kind = ?item.kind,
                "[where]"
            );
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Where {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(iter)
    }
}

impl From<HashMap<String, Value>> for Where {
    fn from(map: HashMap<String, Value>) -> Self {
        Self::from_map(map)
    }
}

impl From<Map<String, Value>> for Where {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_map(map)
    }
}

impl From<Vec<(String, Value)>> for Where {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        Self::from_map(pairs)
    }
}

/// String form used for pattern arguments
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn fuzzy(text: &str) -> String {
    format!("%{}%", text)
}
