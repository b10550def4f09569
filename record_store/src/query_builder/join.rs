//! Join descriptors

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    /// FULL OUTER JOIN
    Full,
}

impl JoinType {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }
}

/// A join descriptor: target table, ON predicate with `?` placeholders and its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub condition: String,
    pub args: Vec<Value>,
}

impl JoinClause {
    pub fn new(
        join_type: JoinType,
        table: impl Into<String>,
        condition: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: None,
            condition: condition.into(),
            args,
        }
    }

    /// Add an alias for the joined table
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Get the table reference (alias if present, otherwise table name)
    pub fn table_ref(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// `"<TYPE> JOIN <table> [AS alias] ON <condition>"`, placeholders untouched
    pub fn to_sql(&self) -> String {
        let table_part = match &self.alias {
            Some(alias) => format!("{} AS {}", self.table, alias),
            None => self.table.clone(),
        };
        format!("{} {} ON {}", self.join_type.to_sql(), table_part, self.condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_type_to_sql() {
        assert_eq!(JoinType::Inner.to_sql(), "INNER JOIN");
        assert_eq!(JoinType::Left.to_sql(), "LEFT JOIN");
        assert_eq!(JoinType::Right.to_sql(), "RIGHT JOIN");
        assert_eq!(JoinType::Full.to_sql(), "FULL OUTER JOIN");
    }

    #[test]
    fn test_join_clause_sql() {
        let join = JoinClause::new(
            JoinType::Left,
            "orders",
            "orders.user_id = users.id AND orders.status = ?",
            vec![json!("paid")],
        );

        assert_eq!(
            join.to_sql(),
            "LEFT JOIN orders ON orders.user_id = users.id AND orders.status = ?"
        );
        assert_eq!(join.args, vec![json!("paid")]);
        assert_eq!(join.table_ref(), "orders");
    }

    #[test]
    fn test_join_clause_with_alias() {
        let join = JoinClause::new(JoinType::Inner, "orders", "o.user_id = users.id", vec![])
            .with_alias("o");

        assert_eq!(join.alias, Some("o".to_string()));
        assert_eq!(join.table_ref(), "o");
        assert_eq!(join.to_sql(), "INNER JOIN orders AS o ON o.user_id = users.id");
    }
}
