//! Query Builder WHERE clause operations

use serde_json::Value;

use super::builder::QueryBuilder;
use super::types::*;

impl QueryBuilder {
    fn push_where(mut self, boolean: WhereBoolean, kind: WhereKind) -> Self {
        self.where_conditions.push(WhereCondition { boolean, kind });
        self
    }

    fn operator_or_equal(operator: &str) -> QueryOperator {
        QueryOperator::parse(operator).unwrap_or_else(|| {
            tracing::warn!("Unknown operator '{}', falling back to '='", operator);
            QueryOperator::Equal
        })
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T>(self, column: &str, value: T) -> Self
    where
        T: Into<Value>,
    {
        self.push_where(
            WhereBoolean::And,
            WhereKind::Basic {
                column: column.to_string(),
                operator: QueryOperator::Equal,
                value: value.into(),
            },
        )
    }

    /// Add WHERE condition with custom operator
    pub fn where_condition<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::Basic {
                column: column.to_string(),
                operator: Self::operator_or_equal(operator),
                value: value.into(),
            },
        )
    }

    /// Add OR WHERE condition with custom operator
    pub fn or_where<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.push_where(
            WhereBoolean::Or,
            WhereKind::Basic {
                column: column.to_string(),
                operator: Self::operator_or_equal(operator),
                value: value.into(),
            },
        )
    }

    /// Add WHERE condition with IN
    pub fn where_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::In {
                column: column.to_string(),
                values: values.into_iter().map(|v| v.into()).collect(),
                negated: false,
            },
        )
    }

    /// Add WHERE condition with NOT IN
    pub fn where_not_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::In {
                column: column.to_string(),
                values: values.into_iter().map(|v| v.into()).collect(),
                negated: true,
            },
        )
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(self, column: &str) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::Null {
                column: column.to_string(),
                negated: false,
            },
        )
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(self, column: &str) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::Null {
                column: column.to_string(),
                negated: true,
            },
        )
    }

    /// Compare two columns
    pub fn where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::Column {
                first: first.to_string(),
                operator: Self::operator_or_equal(operator),
                second: second.to_string(),
            },
        )
    }

    /// Add raw WHERE condition for complex cases
    pub fn where_raw(self, raw_condition: &str) -> Self {
        self.push_where(WhereBoolean::And, WhereKind::Raw(raw_condition.to_string()))
    }

    /// Compare the scalar result of a subquery against a value
    pub fn where_subquery<T: Into<Value>>(
        self,
        subquery: QueryBuilder,
        operator: &str,
        value: T,
    ) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::Subquery {
                query: Box::new(subquery),
                operator: Self::operator_or_equal(operator),
                value: value.into(),
            },
        )
    }

    /// Add EXISTS subquery condition
    pub fn where_exists(self, subquery: QueryBuilder) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::Exists {
                query: Box::new(subquery),
                negated: false,
            },
        )
    }

    /// Add NOT EXISTS subquery condition
    pub fn where_not_exists(self, subquery: QueryBuilder) -> Self {
        self.push_where(
            WhereBoolean::And,
            WhereKind::Exists {
                query: Box::new(subquery),
                negated: true,
            },
        )
    }

    /// Group the conditions added by `f` in parentheses
    pub fn where_nested<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let nested = f(QueryBuilder::new()).where_conditions;
        if nested.is_empty() {
            return self;
        }
        self.push_where(WhereBoolean::And, WhereKind::Nested(nested))
    }

    /// Apply `f` so that an OR among the conditions it adds cannot escape
    /// the conditions already present
    pub fn scoped<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let existing = std::mem::take(&mut self.where_conditions);
        let mut scoped = f(self);
        let added = std::mem::replace(&mut scoped.where_conditions, existing);
        scoped.append_scoped(added)
    }

    /// Append `added` after the current conditions, grouping it when it
    /// contains an OR
    pub(crate) fn append_scoped(mut self, added: Vec<WhereCondition>) -> Self {
        let has_or = added
            .iter()
            .any(|condition| condition.boolean == WhereBoolean::Or);

        if has_or && !self.where_conditions.is_empty() {
            self.push_where(WhereBoolean::And, WhereKind::Nested(added))
        } else {
            self.where_conditions.extend(added);
            self
        }
    }
}
