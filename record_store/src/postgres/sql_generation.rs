//! Query builder utilities
//!
//! This module turns composed requests into PostgreSQL statements.

use crate::errors::StoreError;
use crate::query_builder::request::{BoundClause, Request, RequestKind};
use serde_json::Value;

pub struct SqlGenerator;

impl SqlGenerator {
    /// Final statement with `$n` placeholders and its flattened arguments
    pub fn render(request: &Request) -> Result<(String, Vec<Value>), StoreError> {
        let (sql, args) = Self::compose(request);
        Self::number_placeholders(&sql, args)
    }

    /// Statement with `?` placeholders, arguments in placeholder order
    pub fn compose(request: &Request) -> (String, Vec<Value>) {
        let mut args = Vec::new();

        let sql = match &request.kind {
            RequestKind::Select => Self::build_select(request, &mut args),
            RequestKind::Count => Self::build_count(request, &mut args),
            RequestKind::Delete => {
                let mut sql = format!("DELETE FROM {}", request.table);
                sql.push_str(&Self::build_where_clause(request.filter.as_ref(), &mut args));
                sql
            }
            RequestKind::Update { assignments } => {
                let set_clause = assignments
                    .iter()
                    .map(|(column, value)| {
                        args.push(value.clone());
                        format!("{} = ?", column)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");

                let mut sql = format!("UPDATE {} SET {}", request.table, set_clause);
                sql.push_str(&Self::build_where_clause(request.filter.as_ref(), &mut args));
                sql
            }
            RequestKind::Insert {
                columns,
                rows,
                upsert_key,
            } => Self::build_insert(
                &request.table,
                columns,
                rows,
                upsert_key.as_deref(),
                &mut args,
            ),
        };

        (sql, args)
    }

    fn build_select(request: &Request, args: &mut Vec<Value>) -> String {
        let mut sql = String::from("SELECT ");
        if request.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&Self::build_projection(request));
        sql.push_str(" FROM ");
        sql.push_str(&request.table);
        sql.push_str(&Self::build_join_clauses(request, args));
        sql.push_str(&Self::build_where_clause(request.filter.as_ref(), args));
        sql.push_str(&Self::build_group_by_clause(&request.group_by));
        sql.push_str(&Self::build_having_clause(request.having.as_ref(), args));
        sql.push_str(&Self::build_order_clause(&request.orders));
        sql.push_str(&Self::build_limit_clause(request.limit, request.offset));
        sql
    }

    /// Grouped or distinct counts count the rows of a subquery
    fn build_count(request: &Request, args: &mut Vec<Value>) -> String {
        if request.group_by.is_empty() && !request.distinct {
            let mut sql = format!("SELECT COUNT(*) AS total FROM {}", request.table);
            sql.push_str(&Self::build_join_clauses(request, args));
            sql.push_str(&Self::build_where_clause(request.filter.as_ref(), args));
            return sql;
        }

        let mut inner = String::from("SELECT ");
        if request.distinct {
            inner.push_str("DISTINCT ");
        }
        if request.selects.is_empty() && !request.group_by.is_empty() {
            inner.push_str(&request.group_by.join(", "));
        } else {
            inner.push_str(&Self::build_projection(request));
        }
        inner.push_str(" FROM ");
        inner.push_str(&request.table);
        inner.push_str(&Self::build_join_clauses(request, args));
        inner.push_str(&Self::build_where_clause(request.filter.as_ref(), args));
        inner.push_str(&Self::build_group_by_clause(&request.group_by));
        inner.push_str(&Self::build_having_clause(request.having.as_ref(), args));

        format!("SELECT COUNT(*) AS total FROM ({}) AS counted", inner)
    }

    fn build_insert(
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
        upsert_key: Option<&str>,
        args: &mut Vec<Value>,
    ) -> String {
        let row_placeholder = format!("({})", vec!["?"; columns.len()].join(", "));
        let values = rows
            .iter()
            .map(|row| {
                args.extend(row.iter().cloned());
                row_placeholder.clone()
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            values
        );

        if let Some(key) = upsert_key {
            let updates = columns
                .iter()
                .filter(|column| column.as_str() != key)
                .map(|column| format!("{} = EXCLUDED.{}", column, column))
                .collect::<Vec<_>>();

            if updates.is_empty() {
                sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", key));
            } else {
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO UPDATE SET {}",
                    key,
                    updates.join(", ")
                ));
            }
        }

        sql.push_str(" RETURNING *");
        sql
    }

    /// Explicit columns, else every column of the main table
    fn build_projection(request: &Request) -> String {
        if !request.selects.is_empty() {
            request.selects.join(", ")
        } else if !request.joins.is_empty() {
            format!("{}.*", request.table)
        } else {
            "*".to_string()
        }
    }

    fn build_join_clauses(request: &Request, args: &mut Vec<Value>) -> String {
        request
            .joins
            .iter()
            .map(|join| {
                args.extend(join.args.iter().cloned());
                format!(" {}", join.to_sql())
            })
            .collect()
    }

    fn build_where_clause(filter: Option<&BoundClause>, args: &mut Vec<Value>) -> String {
        match filter {
            Some(clause) => {
                args.extend(clause.args.iter().cloned());
                format!(" WHERE {}", clause.sql)
            }
            None => String::new(),
        }
    }

    fn build_group_by_clause(group_by: &[String]) -> String {
        if group_by.is_empty() {
            String::new()
        } else {
            format!(" GROUP BY {}", group_by.join(", "))
        }
    }

    fn build_having_clause(having: Option<&BoundClause>, args: &mut Vec<Value>) -> String {
        match having {
            Some(clause) => {
                args.extend(clause.args.iter().cloned());
                format!(" HAVING {}", clause.sql)
            }
            None => String::new(),
        }
    }

    /// Build ORDER BY clause
    pub fn build_order_clause(orders: &[String]) -> String {
        if orders.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", orders.join(", "))
        }
    }

    /// Build LIMIT/OFFSET clause
    pub fn build_limit_clause(limit: Option<u64>, offset: Option<u64>) -> String {
        let mut clause = String::new();

        if let Some(limit) = limit {
            clause.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = offset {
            clause.push_str(&format!(" OFFSET {}", offset));
        }

        clause
    }

    /// Rewrite `?` to `$n`, expanding array arguments into one placeholder per
    /// element. Nulls and empty arrays render as `NULL` and bind nothing.
    /// Placeholders inside single-quoted literals are left alone.
    pub fn number_placeholders(
        sql: &str,
        args: Vec<Value>,
    ) -> Result<(String, Vec<Value>), StoreError> {
        let expected = args.len();
        let mut args = args.into_iter();
        let mut values = Vec::with_capacity(expected);
        let mut output = String::with_capacity(sql.len() + expected * 2);
        let mut in_literal = false;
        let mut consumed = 0;

        for ch in sql.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    output.push(ch);
                }
                '?' if !in_literal => {
                    let arg = args.next().ok_or_else(|| {
                        StoreError::InvalidCondition(format!(
                            "statement has more placeholders than arguments ({}): {}",
                            expected, sql
                        ))
                    })?;
                    consumed += 1;

                    match arg {
                        Value::Null => output.push_str("NULL"),
                        Value::Array(items) if items.is_empty() => output.push_str("NULL"),
                        Value::Array(items) => {
                            let placeholders = items
                                .into_iter()
                                .map(|item| placeholder(&mut values, item))
                                .collect::<Vec<_>>();
                            output.push_str(&placeholders.join(", "));
                        }
                        other => output.push_str(&placeholder(&mut values, other)),
                    }
                }
                _ => output.push(ch),
            }
        }

        if consumed != expected {
            return Err(StoreError::InvalidCondition(format!(
                "statement has {} placeholders but {} arguments: {}",
                consumed, expected, sql
            )));
        }

        Ok((output, values))
    }
}

fn placeholder(values: &mut Vec<Value>, value: Value) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    values.push(value);
    format!("${}", values.len())
}
