//! Sort specifications

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn from_desc(desc: bool) -> Self {
        if desc {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByOne {
    pub key: String,
    pub order: SortOrder,
}

impl OrderByOne {
    pub fn is_desc(&self) -> bool {
        self.order == SortOrder::Desc
    }

    /// `"<key> ASC"` or `"<key> DESC"`
    pub fn clause(&self) -> String {
        format!("{} {}", self.key, self.order.to_sql())
    }
}

/// Ordered list of sort keys; the first entry is the primary key.
///
/// Unlike `Where::set`, adding a key that is already present appends a
/// second entry instead of replacing the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
    entries: Vec<OrderByOne>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sort key
    pub fn append(&mut self, key: impl Into<String>, desc: bool) -> &mut Self {
        self.entries.push(OrderByOne {
            key: key.into(),
            order: SortOrder::from_desc(desc),
        });
        self
    }

    pub fn asc(&mut self, key: impl Into<String>) -> &mut Self {
        self.append(key, false)
    }

    pub fn desc(&mut self, key: impl Into<String>) -> &mut Self {
        self.append(key, true)
    }

    /// Direction of the first entry for `key`: `Some(true)` when descending
    pub fn get(&self, key: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(OrderByOne::is_desc)
    }

    /// Remove the first entry for `key`
    pub fn del(&mut self, key: &str) -> &mut Self {
        if let Some(index) = self.entries.iter().position(|entry| entry.key == key) {
            self.entries.remove(index);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[OrderByOne] {
        &self.entries
    }

    /// Single combined clause for raw SQL: `"a ASC,b DESC"`
    pub fn build(&self) -> String {
        self.directives().join(",")
    }

    /// One directive per entry, applied in order by the query builder
    pub fn directives(&self) -> Vec<String> {
        self.entries.iter().map(OrderByOne::clause).collect()
    }

    /// Same keys with every direction flipped
    pub fn reversed(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|entry| OrderByOne {
                    key: entry.key.clone(),
                    order: entry.order.reversed(),
                })
                .collect(),
        }
    }

    /// Parse external input such as `"name:asc,price:desc"`.
    ///
    /// Entries without a direction sort ascending; entries with an unknown
    /// direction are skipped.
    pub fn parse(raw: &str) -> Self {
        let mut order_by = Self::new();

        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            match part.split_once(':') {
                None => {
                    order_by.asc(part);
                }
                Some((key, direction)) => {
                    let key = key.trim();
                    if key.is_empty() {
                        continue;
                    }
                    match direction.trim().to_ascii_lowercase().as_str() {
                        "asc" => {
                            order_by.asc(key);
                        }
                        "desc" => {
                            order_by.desc(key);
                        }
                        _ => {}
                    }
                }
            }
        }

        order_by
    }

    /// Log every entry at debug level
    pub fn debug(&self) {
        for entry in &self.entries {
            tracing::debug!(key = %entry.key, order = entry.order.to_sql(), "[order_by]");
        }
    }
}
