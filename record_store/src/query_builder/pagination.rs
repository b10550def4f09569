//! Query builder utilities
//!
//! This module provides paging helpers.

use serde::{Deserialize, Serialize};

/// One page of results together with the total match count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u64,
    pub page_size: u64,
}

impl<T> Paginated<T> {
    /// Number of pages needed to hold `total` rows
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 || self.total <= 0 {
            return 0;
        }
        (self.total as u64).div_ceil(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// Limit and offset for a 1-based page. `None` when `size` is zero.
pub fn page_window(page: u64, size: u64) -> Option<(u64, Option<u64>)> {
    if size == 0 {
        return None;
    }
    let offset = if page > 0 { Some((page - 1) * size) } else { None };
    Some((size, offset))
}
