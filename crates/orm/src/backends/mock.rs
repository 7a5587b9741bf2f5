//! In-memory scripted connection
//!
//! `MockConnection` answers SELECTs from a FIFO of scripted responses and
//! records every statement it is asked to run, so callers can assert on the
//! exact SQL and on how many queries were issued.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::core::{log_query, Connection, Row};
use crate::error::{ModelError, OrmResult};
use crate::query::{QueryBuilder, QueryType};

/// A statement the mock connection received
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub kind: QueryType,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<OrmResult<Vec<Row>>>,
    write_error: Option<ModelError>,
    executed: Vec<ExecutedQuery>,
    next_id: i64,
    affected_rows: u64,
}

/// Scripted connection used in tests
#[derive(Debug)]
pub struct MockConnection {
    name: String,
    state: Mutex<MockState>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            state: Mutex::new(MockState {
                next_id: 1,
                affected_rows: 1,
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the rows returned by the next SELECT
    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.state().responses.push_back(Ok(rows));
        self
    }

    /// Queue rows given as a JSON array of objects
    pub fn push_json(&self, rows: Value) -> &Self {
        self.push_rows(rows_from_json(rows))
    }

    /// Make the next SELECT fail
    pub fn push_error(&self, error: ModelError) -> &Self {
        self.state().responses.push_back(Err(error));
        self
    }

    /// Make every following INSERT and UPDATE fail
    pub fn fail_writes(&self, error: ModelError) -> &Self {
        self.state().write_error = Some(error);
        self
    }

    /// Value handed out for the next generated primary key
    pub fn set_next_id(&self, id: i64) -> &Self {
        self.state().next_id = id;
        self
    }

    /// Row count reported by UPDATE statements
    pub fn set_affected_rows(&self, count: u64) -> &Self {
        self.state().affected_rows = count;
        self
    }

    /// Every statement executed so far
    pub fn executed(&self) -> Vec<ExecutedQuery> {
        self.state().executed.clone()
    }

    /// Inlined SQL of every statement executed so far
    pub fn executed_sql(&self) -> Vec<String> {
        self.state().executed.iter().map(|q| q.sql.clone()).collect()
    }

    /// Number of statements executed so far
    pub fn query_count(&self) -> usize {
        self.state().executed.len()
    }

    /// Forget recorded statements
    pub fn clear_log(&self) {
        self.state().executed.clear();
    }

    fn record(&self, query: &QueryBuilder) {
        log_query(&self.name, query);
        let (_, params) = query.to_sql_with_params();
        self.state().executed.push(ExecutedQuery {
            kind: query.query_type().clone(),
            sql: query.to_sql(),
            params,
        });
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        self.record(query);
        self.state().responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn insert(&self, query: &QueryBuilder) -> OrmResult<Option<Value>> {
        self.record(query);
        let mut state = self.state();
        if let Some(error) = state.write_error.clone() {
            return Err(error);
        }

        let Some(column) = query.returning_column() else {
            return Ok(None);
        };

        let provided = query
            .set_clauses
            .iter()
            .find(|clause| clause.column == column)
            .map(|clause| clause.value.clone());

        match provided {
            Some(value) => Ok(Some(value)),
            None => {
                let id = state.next_id;
                state.next_id += 1;
                Ok(Some(Value::from(id)))
            }
        }
    }

    async fn update(&self, query: &QueryBuilder) -> OrmResult<u64> {
        self.record(query);
        let state = self.state();
        match state.write_error.clone() {
            Some(error) => Err(error),
            None => Ok(state.affected_rows),
        }
    }
}

/// Build rows from a JSON array of objects; anything else yields no rows
pub fn rows_from_json(rows: Value) -> Vec<Row> {
    match rows {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map.into_iter().collect()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_rows_are_fifo() {
        let conn = MockConnection::new();
        conn.push_json(json!([{"id": 1}])).push_json(json!([{"id": 2}, {"id": 3}]));

        let query = QueryBuilder::table("users");
        assert_eq!(conn.select(&query).await.unwrap().len(), 1);
        assert_eq!(conn.select(&query).await.unwrap().len(), 2);
        assert!(conn.select(&query).await.unwrap().is_empty());
        assert_eq!(conn.query_count(), 3);
    }

    #[tokio::test]
    async fn test_insert_hands_out_ids() {
        let conn = MockConnection::new();
        conn.set_next_id(7);
        let query = QueryBuilder::new()
            .insert_into("users")
            .set("name", "a")
            .returning("id");

        assert_eq!(conn.insert(&query).await.unwrap(), Some(json!(7)));
        assert_eq!(conn.insert(&query).await.unwrap(), Some(json!(8)));
    }

    #[tokio::test]
    async fn test_error_injection() {
        let conn = MockConnection::new();
        conn.push_error(ModelError::Database("boom".to_string()));
        let result = conn.select(&QueryBuilder::table("users")).await;
        assert_eq!(result, Err(ModelError::Database("boom".to_string())));
    }
}
