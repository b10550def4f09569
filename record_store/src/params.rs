//! Query-string parameters
//!
//! Turns `key=value` pairs from a list endpoint into paging, ordering and a
//! condition set that can be applied to a [`QueryBuilder`].

use crate::errors::StoreError;
use crate::query_builder::{OrderBy, QueryBuilder, Where, WhereOptions};
use crate::traits::Model;
use config::QueryConfig;

const PAGE_KEYS: &[&str] = &["page"];
const PAGE_SIZE_KEYS: &[&str] = &["pageSize", "page-size"];
const ORDER_BY_KEYS: &[&str] = &["orderBy", "order-by"];

/// Marker suffix that turns a value into a fuzzy match, e.g. `name=lap:*`
const FUZZY_SUFFIX: &str = "*";

#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub page: u64,
    pub page_size: u64,
    pub order_by: OrderBy,
    pub conditions: Where,
}

impl QueryParams {
    /// Parse query pairs using the paging limits in `config`.
    ///
    /// A page or page size that is missing, zero or not a number falls back to
    /// the default; larger values are capped.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>, config: &QueryConfig) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut page = None;
        let mut page_size = None;
        let mut order_by = OrderBy::new();
        let mut conditions = Where::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());

            if PAGE_KEYS.contains(&key) {
                page = parse_positive(value);
            } else if PAGE_SIZE_KEYS.contains(&key) {
                page_size = page_size.or(parse_positive(value));
            } else if ORDER_BY_KEYS.contains(&key) {
                if order_by.is_empty() {
                    order_by = OrderBy::parse(value);
                }
            } else if let Some((pattern, marker)) = value.rsplit_once(':') {
                if marker == FUZZY_SUFFIX {
                    conditions.set_with(key, pattern, WhereOptions::fuzzy());
                }
            } else {
                conditions.set(key, value);
            }
        }

        Self {
            page: page.unwrap_or(1).min(config.max_page.max(1)),
            page_size: page_size
                .unwrap_or(config.default_page_size)
                .min(config.max_page_size.max(1)),
            order_by,
            conditions,
        }
    }

    /// Row offset of the first record on the current page
    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1)).saturating_mul(self.page_size)
    }

    /// Apply conditions, ordering and paging to `query`
    pub fn apply<T: Model>(&self, query: QueryBuilder<T>) -> QueryBuilder<T> {
        query
            .with_where(self.conditions.clone())
            .with_order(&self.order_by)
            .page(self.page, self.page_size)
    }
}

fn parse_positive(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| *value > 0)
}

/// Read a positive integer `id` from path or query pairs
pub fn id<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<i64, StoreError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let raw = pairs
        .into_iter()
        .find(|(key, _)| key.as_ref() == "id")
        .map(|(_, value)| value.as_ref().to_string())
        .unwrap_or_default();

    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(StoreError::InvalidData(format!("invalid id: {}", raw))),
    }
}
