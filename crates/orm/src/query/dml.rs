//! Query Builder DML operations (INSERT, UPDATE)

use serde_json::Value;

use super::builder::QueryBuilder;
use super::types::*;

impl QueryBuilder {
    /// Start an INSERT query
    pub fn insert_into(mut self, table: &str) -> Self {
        self.query_type = QueryType::Insert;
        self.insert_table = Some(table.to_string());
        self
    }

    /// Start an UPDATE query; existing WHERE conditions are kept
    pub fn update(mut self, table: &str) -> Self {
        self.query_type = QueryType::Update;
        self.update_table = Some(table.to_string());
        self
    }

    /// Set a column value (for INSERT/UPDATE)
    pub fn set<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.set_clauses.push(SetClause {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    /// Set multiple values at once
    pub fn set_values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (column, value) in values {
            self.set_clauses.push(SetClause { column, value });
        }
        self
    }

    /// Ask an INSERT to hand back one generated column
    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }
}
