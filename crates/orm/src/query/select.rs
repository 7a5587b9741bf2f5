//! Query Builder SELECT, JOIN, ORDER BY and pagination operations

use super::builder::QueryBuilder;
use super::types::*;

impl QueryBuilder {
    /// Replace the SELECT list
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select_fields = fields.iter().map(|f| f.trim().to_string()).collect();
        self
    }

    /// Append to the SELECT list
    pub fn add_select(mut self, fields: &[&str]) -> Self {
        self.select_fields
            .extend(fields.iter().map(|f| f.trim().to_string()));
        self
    }

    /// Add SELECT DISTINCT to the query
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Add custom SELECT expression
    pub fn select_raw(mut self, expression: &str) -> Self {
        self.select_fields.push(expression.to_string());
        self
    }

    /// Set the FROM table
    pub fn from(mut self, table: &str) -> Self {
        self.from_table = Some(table.to_string());
        self
    }

    /// Add INNER JOIN to the query
    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Inner, table, first, operator, second)
    }

    /// Add LEFT JOIN to the query
    pub fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Left, table, first, operator, second)
    }

    fn push_join(
        mut self,
        join_type: JoinType,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> Self {
        self.joins.push(JoinClause {
            join_type,
            table: table.to_string(),
            first: first.to_string(),
            operator: QueryOperator::parse(operator).unwrap_or(QueryOperator::Equal),
            second: second.to_string(),
        });
        self
    }

    /// Add ORDER BY clause (ascending)
    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), OrderDirection::Asc));
        self
    }

    /// Add ORDER BY clause (descending)
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), OrderDirection::Desc));
        self
    }

    /// Add LIMIT clause
    pub fn limit(mut self, count: i64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, count: i64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// Add pagination (LIMIT + OFFSET), pages are 1-based
    pub fn paginate(mut self, per_page: i64, page: i64) -> Self {
        self.limit_count = Some(per_page);
        self.offset_value = Some((page.max(1) - 1).saturating_mul(per_page));
        self
    }
}
