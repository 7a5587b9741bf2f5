//! Entity-level query adapter
//!
//! `ModelQuery` forwards structured verbs to a [`QueryBuilder`], executes it
//! on the model's connection, hydrates the rows into entities and runs the
//! eager loader over the resulting batch.

use std::fmt;

use serde_json::Value;

use super::builder::QueryBuilder;
use crate::backends::Row;
use crate::error::{ModelError, ModelResult, RelationshipError};
use crate::model::attributes::IntoAttributes;
use crate::model::{Collection, Entity};
use crate::relationships::eager_loading::{
    eager_load_relations, EagerConstraint, EagerLoads, IntoEagerLoads,
};

/// Query scoped to one model, with pending eager loads
#[derive(Clone)]
pub struct ModelQuery {
    query: QueryBuilder,
    model: Entity,
    eager_loads: EagerLoads,
}

impl ModelQuery {
    /// Query over `model`'s table, including the model's default eager loads
    pub fn new(model: Entity) -> Self {
        let eager_loads = EagerLoads::parse(model.schema().eager_loads.clone());
        Self::without_eager_loads(model).with(eager_loads)
    }

    /// Query over `model`'s table with nothing to eager load
    pub fn without_eager_loads(model: Entity) -> Self {
        Self {
            query: QueryBuilder::table(model.table()),
            model,
            eager_loads: EagerLoads::new(),
        }
    }

    /// Prototype entity of the queried model
    pub fn model(&self) -> &Entity {
        &self.model
    }

    /// Underlying statement state
    pub fn base(&self) -> &QueryBuilder {
        &self.query
    }

    /// Consume the adapter, keeping only the statement
    pub fn into_base(self) -> QueryBuilder {
        self.query
    }

    /// Apply a transformation to the underlying statement
    pub fn map_base<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.query = f(self.query);
        self
    }

    /// Apply a caller constraint so its conditions stay grouped apart from
    /// the ones already on the query
    pub fn scoped<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ModelQuery) -> ModelQuery,
    {
        let existing = std::mem::take(&mut self.query.where_conditions);
        let mut scoped = f(self);
        let added = std::mem::replace(&mut scoped.query.where_conditions, existing);
        scoped.map_base(|q| q.append_scoped(added))
    }

    pub fn eager_loads(&self) -> &EagerLoads {
        &self.eager_loads
    }

    pub fn to_sql(&self) -> String {
        self.query.to_sql()
    }

    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.map_base(|q| q.where_eq(column, value))
    }

    pub fn where_condition<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.map_base(|q| q.where_condition(column, operator, value))
    }

    pub fn or_where<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.map_base(|q| q.or_where(column, operator, value))
    }

    pub fn where_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        self.map_base(|q| q.where_in(column, values))
    }

    pub fn where_not_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        self.map_base(|q| q.where_not_in(column, values))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.map_base(|q| q.where_null(column))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.map_base(|q| q.where_not_null(column))
    }

    pub fn where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.map_base(|q| q.where_column(first, operator, second))
    }

    pub fn where_raw(self, sql: &str) -> Self {
        self.map_base(|q| q.where_raw(sql))
    }

    pub fn where_nested<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.map_base(|q| q.where_nested(f))
    }

    /// Equality on every entry of `attributes`
    pub fn where_attributes(self, attributes: impl IntoAttributes) -> Self {
        attributes
            .into_attributes()
            .into_iter()
            .fold(self, |query, (column, value)| query.where_eq(&column, value))
    }

    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.map_base(|q| q.join(table, first, operator, second))
    }

    pub fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.map_base(|q| q.left_join(table, first, operator, second))
    }

    pub fn select(self, columns: &[&str]) -> Self {
        self.map_base(|q| q.select(columns))
    }

    pub fn add_select(self, columns: &[&str]) -> Self {
        self.map_base(|q| q.add_select(columns))
    }

    pub fn take(self, count: i64) -> Self {
        self.map_base(|q| q.limit(count))
    }

    pub fn skip(self, count: i64) -> Self {
        self.map_base(|q| q.offset(count))
    }

    pub fn order_by(self, column: &str) -> Self {
        self.map_base(|q| q.order_by(column))
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.map_base(|q| q.order_by_desc(column))
    }

    /// Restrict to one page of the model's page size (1-based)
    pub fn for_page(self, page: i64) -> Self {
        let per_page = i64::from(self.model.schema().per_page());
        self.map_base(|q| q.paginate(per_page, page))
    }

    /// Add relations to eager load; repeated calls accumulate
    pub fn with(mut self, relations: impl IntoEagerLoads) -> Self {
        self.eager_loads.merge(relations.into_eager_loads());
        self
    }

    /// Eager load `path`, constraining the relation query with `constraint`
    pub fn with_where<F>(self, path: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        let mut loads = EagerLoads::new();
        loads.insert(path, EagerConstraint::new(constraint));
        self.with(loads)
    }

    /// Only keep models having `count` related rows compared by `operator`
    pub fn has(self, relation: &str, operator: &str, count: i64) -> ModelResult<Self> {
        self.where_has_count(relation, operator, count, |q| q)
    }

    /// Only keep models having at least one related row matching `constraint`
    pub fn where_has<F>(self, relation: &str, constraint: F) -> ModelResult<Self>
    where
        F: FnOnce(ModelQuery) -> ModelQuery,
    {
        self.where_has_count(relation, ">=", 1, constraint)
    }

    fn where_has_count<F>(
        self,
        name: &str,
        operator: &str,
        count: i64,
        constraint: F,
    ) -> ModelResult<Self>
    where
        F: FnOnce(ModelQuery) -> ModelQuery,
    {
        let relation = self.model.relation_without_constraints(name).ok_or_else(|| {
            RelationshipError::NotFound {
                relation: name.to_string(),
                model: self.model.class_name().to_string(),
            }
        })?;

        let count_query = relation
            .relation_count_query(&self)
            .scoped(constraint)
            .into_base();
        Ok(self.map_base(|q| q.where_subquery(count_query, operator, count)))
    }

    /// Execute and hydrate without eager loading
    pub async fn get_models(&self) -> ModelResult<Vec<Entity>> {
        let rows = self.fetch_rows().await?;
        Ok(self.model.hydrate(rows))
    }

    async fn fetch_rows(&self) -> ModelResult<Vec<Row>> {
        let connection = self.model.require_connection()?;
        connection.select(&self.query).await.map_err(|e| {
            tracing::error!("Query on '{}' failed: {}", self.model.table(), e);
            e
        })
    }

    /// Eager load this query's relations onto `models`
    pub async fn eager_load_relations(&self, models: &mut Vec<Entity>) -> ModelResult<()> {
        if models.is_empty() || self.eager_loads.is_empty() {
            return Ok(());
        }
        eager_load_relations(models, &self.eager_loads, false).await
    }

    /// Execute, hydrate and eager load
    pub async fn get(self) -> ModelResult<Collection> {
        let mut models = self.get_models().await?;
        self.eager_load_relations(&mut models).await?;
        Ok(Collection::new(models))
    }

    /// `get` selecting `columns` unless columns were already chosen
    pub async fn get_columns(self, columns: &[&str]) -> ModelResult<Collection> {
        let query = if self.query.columns().is_empty() && columns != ["*"] {
            self.select(columns)
        } else {
            self
        };
        query.get().await
    }

    /// First matching entity
    pub async fn first(self) -> ModelResult<Option<Entity>> {
        Ok(self.take(1).get().await?.into_iter().next())
    }

    /// First matching entity or a `NotFound` error
    pub async fn first_or_fail(self) -> ModelResult<Entity> {
        let table = self.model.table();
        self.first()
            .await?
            .ok_or_else(|| ModelError::NotFound(table.to_string()))
    }

    /// Find by primary key
    pub async fn find<T: Into<Value>>(self, id: T) -> ModelResult<Option<Entity>> {
        let key = self.model.qualified_key_name();
        self.where_eq(&key, id).first().await
    }

    /// Find several by primary key; no query is run for an empty list
    pub async fn find_many<T: Into<Value>>(self, ids: Vec<T>) -> ModelResult<Collection> {
        if ids.is_empty() {
            return Ok(Collection::empty());
        }
        let key = self.model.qualified_key_name();
        self.where_in(&key, ids).get().await
    }

    /// Every row of the table
    pub async fn all(self) -> ModelResult<Collection> {
        self.get().await
    }

    /// Run an UPDATE with this query's conditions
    pub async fn update(&self, values: impl IntoAttributes) -> ModelResult<u64> {
        let connection = self.model.require_connection()?;
        let statement = self
            .query
            .clone()
            .update(self.model.table())
            .set_values(values.into_attributes());
        connection.update(&statement).await
    }
}

impl fmt::Debug for ModelQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelQuery")
            .field("model", &self.model.class_name())
            .field("sql", &self.query.to_sql())
            .field("eager_loads", &self.eager_loads.paths())
            .finish()
    }
}
