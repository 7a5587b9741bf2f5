//! PostgreSQL Backend Implementation
//!
//! Runs rendered statements on a sqlx Postgres pool and converts result rows
//! into attribute maps.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Pool, Postgres, Row as SqlxRow, TypeInfo};

use super::core::{log_query, Connection, Row};
use crate::error::{OrmError, OrmResult};
use crate::query::QueryBuilder;

/// PostgreSQL connection backed by a sqlx pool
#[derive(Debug, Clone)]
pub struct PostgresConnection {
    name: String,
    pool: Pool<Postgres>,
}

impl PostgresConnection {
    /// Wrap an existing pool
    pub fn new(name: impl Into<String>, pool: Pool<Postgres>) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    /// Open a pool for `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> OrmResult<Self> {
        if !database_url.starts_with("postgresql://") && !database_url.starts_with("postgres://") {
            return Err(OrmError::Connection("Invalid PostgreSQL URL scheme".to_string()));
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create database pool: {}", e);
                OrmError::Connection(format!("Failed to create PostgreSQL pool: {}", e))
            })?;

        Ok(Self::new("pgsql", pool))
    }

    /// The underlying pool
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    fn prepare<'q>(sql: &'q str, params: &[JsonValue]) -> Query<'q, Postgres, PgArguments> {
        params
            .iter()
            .fold(sqlx::query(sql), |query, param| bind_value(query, param))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        log_query(&self.name, query);
        let (sql, params) = query.to_sql_with_params();

        let rows = Self::prepare(&sql, &params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Query fetch failed: {}", e);
                OrmError::Query(format!("Query fetch failed: {}", e))
            })?;

        rows.iter().map(row_to_attributes).collect()
    }

    async fn insert(&self, query: &QueryBuilder) -> OrmResult<Option<JsonValue>> {
        log_query(&self.name, query);
        let (sql, params) = query.to_sql_with_params();
        let prepared = Self::prepare(&sql, &params);

        match query.returning_column() {
            Some(column) => {
                let row = prepared.fetch_one(&self.pool).await.map_err(|e| {
                    tracing::error!("Insert failed: {}", e);
                    OrmError::Query(format!("Insert failed: {}", e))
                })?;
                let index = row
                    .columns()
                    .iter()
                    .position(|col| col.name() == column)
                    .ok_or_else(|| OrmError::Query(format!("Column '{}' not found", column)))?;
                Ok(Some(column_to_json(&row, index)?))
            }
            None => {
                prepared.execute(&self.pool).await.map_err(|e| {
                    tracing::error!("Insert failed: {}", e);
                    OrmError::Query(format!("Insert failed: {}", e))
                })?;
                Ok(None)
            }
        }
    }

    async fn update(&self, query: &QueryBuilder) -> OrmResult<u64> {
        log_query(&self.name, query);
        let (sql, params) = query.to_sql_with_params();

        let result = Self::prepare(&sql, &params)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Query execution failed: {}", e);
                OrmError::Query(format!("Query execution failed: {}", e))
            })?;

        Ok(result.rows_affected())
    }
}

/// Bind a JSON value to a sqlx query
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &JsonValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        JsonValue::Null => query.bind(Option::<String>::None),
        JsonValue::Bool(b) => query.bind(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        JsonValue::String(s) => query.bind(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => query.bind(value.clone()),
    }
}

fn row_to_attributes(row: &PgRow) -> OrmResult<Row> {
    let mut attributes = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        attributes.insert(column.name().to_string(), column_to_json(row, index)?);
    }
    Ok(attributes)
}

fn decode<'r, T>(row: &'r PgRow, index: usize) -> OrmResult<Option<T>>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
        .map_err(|e| OrmError::Query(format!("Failed to decode column {}: {}", index, e)))
}

/// Convert a PostgreSQL column value to JSON
fn column_to_json(row: &PgRow, index: usize) -> OrmResult<JsonValue> {
    let type_name = row.columns()[index].type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => decode::<bool>(row, index)?.map(JsonValue::from),
        "INT2" => decode::<i16>(row, index)?.map(JsonValue::from),
        "INT4" => decode::<i32>(row, index)?.map(JsonValue::from),
        "INT8" => decode::<i64>(row, index)?.map(JsonValue::from),
        "FLOAT4" => decode::<f32>(row, index)?.map(|f| JsonValue::from(f as f64)),
        "FLOAT8" => decode::<f64>(row, index)?.map(JsonValue::from),
        "UUID" => decode::<uuid::Uuid>(row, index)?.map(|u| JsonValue::from(u.to_string())),
        "TIMESTAMPTZ" => decode::<chrono::DateTime<chrono::Utc>>(row, index)?
            .map(|dt| JsonValue::from(dt.format(&crate::config::global().date_format).to_string())),
        "TIMESTAMP" => decode::<chrono::NaiveDateTime>(row, index)?
            .map(|dt| JsonValue::from(dt.format(&crate::config::global().date_format).to_string())),
        "DATE" => decode::<chrono::NaiveDate>(row, index)?.map(|d| JsonValue::from(d.to_string())),
        "JSON" | "JSONB" => decode::<JsonValue>(row, index)?,
        _ => decode::<String>(row, index)?.map(JsonValue::from),
    };

    Ok(value.unwrap_or(JsonValue::Null))
}
