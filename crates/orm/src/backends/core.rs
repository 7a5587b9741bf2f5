//! Core Database Backend Traits
//!
//! The ORM never talks to a driver directly. Every statement goes through a
//! [`Connection`], which receives the structured [`QueryBuilder`] and hands
//! back plain attribute rows.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OrmResult;
use crate::query::{Grammar, QueryBuilder};

/// A fetched row: column name to value
pub type Row = BTreeMap<String, Value>;

/// Abstract database connection trait
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection name, used in logs
    fn name(&self) -> &str;

    /// Identifier quoting for this connection's dialect
    fn grammar(&self) -> Grammar {
        Grammar::default()
    }

    /// Execute a SELECT and return the result rows in order
    async fn select(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>>;

    /// Execute an INSERT, returning the `RETURNING` column if one was requested
    async fn insert(&self, query: &QueryBuilder) -> OrmResult<Option<Value>>;

    /// Execute an UPDATE and return the affected row count
    async fn update(&self, query: &QueryBuilder) -> OrmResult<u64>;
}

/// Log a statement at debug level when query logging is enabled
pub(crate) fn log_query(connection: &str, query: &QueryBuilder) {
    if crate::config::global().log_queries {
        tracing::debug!("[{}] {}", connection, query.to_sql());
    }
}
