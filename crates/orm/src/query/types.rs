//! Query Builder Types - Core types and enums for query building

use std::fmt;

use serde_json::Value;

use super::builder::QueryBuilder;

/// Query operator types
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
}

impl QueryOperator {
    /// Parse a textual comparison operator, case-insensitively
    pub fn parse(operator: &str) -> Option<Self> {
        match operator.trim().to_uppercase().as_str() {
            "=" => Some(QueryOperator::Equal),
            "!=" | "<>" => Some(QueryOperator::NotEqual),
            ">" => Some(QueryOperator::GreaterThan),
            ">=" => Some(QueryOperator::GreaterThanOrEqual),
            "<" => Some(QueryOperator::LessThan),
            "<=" => Some(QueryOperator::LessThanOrEqual),
            "LIKE" => Some(QueryOperator::Like),
            "NOT LIKE" => Some(QueryOperator::NotLike),
            _ => None,
        }
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
        }
    }
}

/// How a condition is chained onto the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereBoolean {
    And,
    Or,
}

impl fmt::Display for WhereBoolean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereBoolean::And => write!(f, "AND"),
            WhereBoolean::Or => write!(f, "OR"),
        }
    }
}

/// Shape of a single WHERE predicate
#[derive(Debug, Clone)]
pub enum WhereKind {
    /// `column op value`
    Basic {
        column: String,
        operator: QueryOperator,
        value: Value,
    },
    /// `column [NOT] IN (values)`; an empty list never matches
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
    /// `first op second`, both sides identifiers
    Column {
        first: String,
        operator: QueryOperator,
        second: String,
    },
    /// Verbatim SQL fragment
    Raw(String),
    /// `(subquery) op value`
    Subquery {
        query: Box<QueryBuilder>,
        operator: QueryOperator,
        value: Value,
    },
    /// `[NOT] EXISTS (subquery)`
    Exists {
        query: Box<QueryBuilder>,
        negated: bool,
    },
    /// Parenthesised group of conditions
    Nested(Vec<WhereCondition>),
}

/// Where clause condition
#[derive(Debug, Clone)]
pub struct WhereCondition {
    pub boolean: WhereBoolean,
    pub kind: WhereKind,
}

/// Join types
#[derive(Debug, Clone, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Join clause
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub first: String,
    pub operator: QueryOperator,
    pub second: String,
}

/// Order by direction
#[derive(Debug, Clone, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Query types supported by the builder
#[derive(Debug, Clone, PartialEq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
}

/// Set clause for UPDATE and INSERT operations
#[derive(Debug, Clone)]
pub struct SetClause {
    pub column: String,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse() {
        assert_eq!(QueryOperator::parse("<>"), Some(QueryOperator::NotEqual));
        assert_eq!(QueryOperator::parse("like"), Some(QueryOperator::Like));
        assert_eq!(QueryOperator::parse(">="), Some(QueryOperator::GreaterThanOrEqual));
        assert_eq!(QueryOperator::parse("between"), None);
    }
}
