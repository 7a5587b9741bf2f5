//! Query Builder - Core builder implementation

use super::types::*;

/// Structured statement state for SELECT, INSERT and UPDATE queries.
///
/// Every verb consumes and returns the builder so calls chain fluently.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    pub(crate) query_type: QueryType,
    pub(crate) select_fields: Vec<String>,
    pub(crate) from_table: Option<String>,
    pub(crate) insert_table: Option<String>,
    pub(crate) update_table: Option<String>,
    pub(crate) set_clauses: Vec<SetClause>,
    pub(crate) returning: Option<String>,
    pub(crate) where_conditions: Vec<WhereCondition>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<i64>,
    pub(crate) offset_value: Option<i64>,
    pub(crate) distinct: bool,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self {
            query_type: QueryType::Select,
            select_fields: Vec::new(),
            from_table: None,
            insert_table: None,
            update_table: None,
            set_clauses: Vec::new(),
            returning: None,
            where_conditions: Vec::new(),
            joins: Vec::new(),
            order_by: Vec::new(),
            limit_count: None,
            offset_value: None,
            distinct: false,
        }
    }

    /// Create a SELECT query against `table`
    pub fn table(table: &str) -> Self {
        Self::new().from(table)
    }

    /// Kind of statement this builder renders
    pub fn query_type(&self) -> &QueryType {
        &self.query_type
    }

    /// The FROM source, possibly aliased (`posts as self_x`)
    pub fn from_source(&self) -> Option<&str> {
        self.from_table.as_deref()
    }

    /// Columns explicitly selected so far
    pub fn columns(&self) -> &[String] {
        &self.select_fields
    }

    /// WHERE conditions in the order they were added
    pub fn wheres(&self) -> &[WhereCondition] {
        &self.where_conditions
    }

    /// JOIN clauses in the order they were added
    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    /// Column set by INSERT ... RETURNING, if any
    pub fn returning_column(&self) -> Option<&str> {
        self.returning.as_deref()
    }

    /// LIMIT value, if any
    pub fn limit_value(&self) -> Option<i64> {
        self.limit_count
    }
}
