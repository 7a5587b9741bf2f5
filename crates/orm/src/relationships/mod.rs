//! Relationships Module - relation declarations, resolution and eager loading
//!
//! Models declare relations through a [`RelationFactory`]; each declaration
//! yields a [`Relation`] carrying a query already scoped to the parent. The
//! eager loader builds the same relations with their scoping suppressed and
//! replaces it with a batched constraint over the whole parent batch.

pub mod base;
pub mod dictionary;
pub mod eager_loading;
pub mod has_many;
pub mod has_many_through;
pub mod has_one;
pub mod has_one_or_many;

use std::fmt;

use serde::ser::{Serialize, Serializer};
use serde_json::Value;

pub use base::RelationBase;
pub use eager_loading::{EagerConstraint, EagerLoads, IntoEagerLoads};
pub use has_many::HasMany;
pub use has_many_through::HasManyThrough;
pub use has_one::HasOne;
pub use has_one_or_many::HasOneOrMany;

use crate::error::{ModelResult, RelationshipError};
use crate::model::attributes::IntoAttributes;
use crate::model::{Collection, Entity, Model};
use crate::query::ModelQuery;

/// Relation cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    HasManyThrough,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::HasOne => write!(f, "has-one"),
            RelationKind::HasMany => write!(f, "has-many"),
            RelationKind::HasManyThrough => write!(f, "has-many-through"),
        }
    }
}

/// Resolved value stored in an entity's relation slot
#[derive(Debug, Clone)]
pub enum RelationValue {
    One(Option<Box<Entity>>),
    Many(Collection),
}

impl RelationValue {
    pub fn one(&self) -> Option<&Entity> {
        match self {
            RelationValue::One(entity) => entity.as_deref(),
            RelationValue::Many(_) => None,
        }
    }

    pub fn many(&self) -> Option<&Collection> {
        match self {
            RelationValue::Many(collection) => Some(collection),
            RelationValue::One(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RelationValue::One(entity) => entity.is_none(),
            RelationValue::Many(collection) => collection.is_empty(),
        }
    }

    /// Zero value of the same cardinality
    pub(crate) fn empty_like(&self) -> RelationValue {
        match self {
            RelationValue::One(_) => RelationValue::One(None),
            RelationValue::Many(_) => RelationValue::Many(Collection::empty()),
        }
    }

    pub(crate) fn into_entities(self) -> Vec<Entity> {
        match self {
            RelationValue::One(entity) => entity.map(|e| vec![*e]).unwrap_or_default(),
            RelationValue::Many(collection) => collection.into_vec(),
        }
    }

    pub fn to_json(&self) -> ModelResult<Value> {
        match self {
            RelationValue::One(Some(entity)) => entity.to_json(),
            RelationValue::One(None) => Ok(Value::Null),
            RelationValue::Many(collection) => collection.to_json(),
        }
    }
}

impl Serialize for RelationValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

/// A declared association, scoped to one parent entity
#[derive(Debug, Clone)]
pub enum Relation {
    HasOne(HasOne),
    HasMany(HasMany),
    HasManyThrough(HasManyThrough),
}

impl Relation {
    pub fn kind(&self) -> RelationKind {
        match self {
            Relation::HasOne(_) => RelationKind::HasOne,
            Relation::HasMany(_) => RelationKind::HasMany,
            Relation::HasManyThrough(_) => RelationKind::HasManyThrough,
        }
    }

    fn base(&self) -> &RelationBase {
        match self {
            Relation::HasOne(r) => &r.base,
            Relation::HasMany(r) => &r.base,
            Relation::HasManyThrough(r) => &r.base,
        }
    }

    fn base_mut(&mut self) -> &mut RelationBase {
        match self {
            Relation::HasOne(r) => &mut r.base,
            Relation::HasMany(r) => &mut r.base,
            Relation::HasManyThrough(r) => &mut r.base,
        }
    }

    pub fn query(&self) -> &ModelQuery {
        &self.base().query
    }

    pub fn parent(&self) -> &Entity {
        &self.base().parent
    }

    pub fn related(&self) -> &Entity {
        &self.base().related
    }

    /// Layer extra conditions onto the relation query, grouped apart from
    /// the relation's own key constraints
    pub fn constrain<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ModelQuery) -> ModelQuery,
    {
        self.base_mut().map_query(|query| query.scoped(f));
        self
    }

    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.constrain(|q| q.where_eq(column, value))
    }

    pub fn where_condition<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.constrain(|q| q.where_condition(column, operator, value))
    }

    pub fn to_sql(&self) -> String {
        match self {
            Relation::HasManyThrough(r) => r.select_query().to_sql(),
            _ => self.query().to_sql(),
        }
    }

    /// Result shaped by cardinality
    pub async fn get_results(&self) -> ModelResult<RelationValue> {
        match self {
            Relation::HasOne(r) => Ok(RelationValue::One(r.get_results().await?.map(Box::new))),
            Relation::HasMany(r) => Ok(RelationValue::Many(r.get_results().await?)),
            Relation::HasManyThrough(r) => Ok(RelationValue::Many(r.get_results().await?)),
        }
    }

    /// Every row of the relation query
    pub async fn get(&self) -> ModelResult<Collection> {
        match self {
            Relation::HasManyThrough(r) => r.get_results().await,
            _ => self.query().clone().get().await,
        }
    }

    pub async fn first(&self) -> ModelResult<Option<Entity>> {
        match self {
            Relation::HasManyThrough(r) => r.select_query().first().await,
            _ => self.query().clone().first().await,
        }
    }

    pub async fn find<T: Into<Value>>(&self, id: T) -> ModelResult<Option<Entity>> {
        match self {
            Relation::HasManyThrough(r) => r.find(id).await,
            _ => self.query().clone().find(id).await,
        }
    }

    pub async fn find_many<T: Into<Value>>(&self, ids: Vec<T>) -> ModelResult<Collection> {
        match self {
            Relation::HasManyThrough(r) => r.find_many(ids).await,
            _ => self.query().clone().find_many(ids).await,
        }
    }

    /// Batched `IN` constraint over the local keys of `models`
    pub(crate) fn add_eager_constraints(&mut self, models: &[Entity]) {
        match self {
            Relation::HasOne(r) => r.add_eager_constraints(models),
            Relation::HasMany(r) => r.add_eager_constraints(models),
            Relation::HasManyThrough(r) => r.add_eager_constraints(models),
        }
    }

    /// Give every model the zero value for `relation`
    pub(crate) fn init_relation(&self, models: &mut [Entity], relation: &str) {
        match self {
            Relation::HasOne(r) => r.init_relation(models, relation),
            Relation::HasMany(r) => r.init_relation(models, relation),
            Relation::HasManyThrough(r) => r.init_relation(models, relation),
        }
    }

    pub(crate) fn match_results(&self, models: &mut [Entity], results: Vec<Entity>, relation: &str) {
        match self {
            Relation::HasOne(r) => r.match_results(models, results, relation),
            Relation::HasMany(r) => r.match_results(models, results, relation),
            Relation::HasManyThrough(r) => r.match_results(models, results, relation),
        }
    }

    /// Execute the batched query, including nested eager loads
    pub(crate) async fn get_eager(&self) -> ModelResult<Vec<Entity>> {
        match self {
            Relation::HasManyThrough(r) => r.get_eager().await,
            _ => Ok(self.query().clone().get().await?.into_vec()),
        }
    }

    /// Correlated count subquery against `parent_query`
    pub(crate) fn relation_count_query(&self, parent_query: &ModelQuery) -> ModelQuery {
        match self {
            Relation::HasOne(r) => r.relation_count_query(parent_query),
            Relation::HasMany(r) => r.relation_count_query(parent_query),
            Relation::HasManyThrough(r) => r.relation_count_query(),
        }
    }

    fn one_or_many(&self, operation: &str) -> ModelResult<&HasOneOrMany> {
        match self {
            Relation::HasOne(r) => Ok(&**r),
            Relation::HasMany(r) => Ok(&**r),
            Relation::HasManyThrough(_) => Err(RelationshipError::Unsupported {
                operation: operation.to_string(),
                kind: self.kind().to_string(),
            }
            .into()),
        }
    }

    pub async fn save(&self, model: Entity) -> ModelResult<Entity> {
        self.one_or_many("save")?.save(model).await
    }

    pub async fn save_many(&self, models: Vec<Entity>) -> ModelResult<Vec<Entity>> {
        self.one_or_many("save_many")?.save_many(models).await
    }

    pub async fn create(&self, attributes: impl IntoAttributes) -> ModelResult<Entity> {
        self.one_or_many("create")?.create(attributes).await
    }

    pub async fn create_many<A: IntoAttributes>(&self, records: Vec<A>) -> ModelResult<Vec<Entity>> {
        self.one_or_many("create_many")?.create_many(records).await
    }

    pub async fn find_or_new<T: Into<Value>>(&self, id: T) -> ModelResult<Entity> {
        self.one_or_many("find_or_new")?.find_or_new(id).await
    }

    pub async fn first_or_new(&self, attributes: impl IntoAttributes) -> ModelResult<Entity> {
        self.one_or_many("first_or_new")?.first_or_new(attributes).await
    }

    pub async fn first_or_create(&self, attributes: impl IntoAttributes) -> ModelResult<Entity> {
        self.one_or_many("first_or_create")?
            .first_or_create(attributes)
            .await
    }

    pub async fn update_or_create(
        &self,
        attributes: impl IntoAttributes,
        values: impl IntoAttributes,
    ) -> ModelResult<Entity> {
        self.one_or_many("update_or_create")?
            .update_or_create(attributes, values)
            .await
    }

    pub async fn update(&self, values: impl IntoAttributes) -> ModelResult<u64> {
        self.one_or_many("update")?.update(values).await
    }
}

/// Relation constructors handed to [`Model::relation`]
pub struct RelationFactory<'a> {
    parent: &'a Entity,
    constraints: bool,
}

impl<'a> RelationFactory<'a> {
    pub(crate) fn new(parent: &'a Entity, constraints: bool) -> Self {
        Self {
            parent,
            constraints,
        }
    }

    /// Entity the relation is declared on
    pub fn parent(&self) -> &Entity {
        self.parent
    }

    fn base<R: Model>(&self) -> RelationBase {
        RelationBase::new(self.parent, Entity::new::<R>(), self.constraints)
    }

    fn keys<R: Model>(&self, foreign_key: Option<&str>, local_key: Option<&str>) -> (String, String) {
        let foreign_key = foreign_key.unwrap_or_else(|| self.parent.foreign_key());
        let foreign_key = if foreign_key.contains('.') {
            foreign_key.to_string()
        } else {
            format!("{}.{}", R::table_name(), foreign_key)
        };
        let local_key = local_key.unwrap_or_else(|| self.parent.key_name()).to_string();
        (foreign_key, local_key)
    }

    /// One related row whose `foreign_key` holds the parent's `local_key`
    ///
    /// Defaults: `foreign_key` is the parent's foreign key, `local_key` its
    /// primary key.
    pub fn has_one<R: Model>(&self, foreign_key: Option<&str>, local_key: Option<&str>) -> Relation {
        let (foreign_key, local_key) = self.keys::<R>(foreign_key, local_key);
        Relation::HasOne(HasOne::new(self.base::<R>(), foreign_key, local_key))
    }

    /// Every related row whose `foreign_key` holds the parent's `local_key`
    pub fn has_many<R: Model>(&self, foreign_key: Option<&str>, local_key: Option<&str>) -> Relation {
        let (foreign_key, local_key) = self.keys::<R>(foreign_key, local_key);
        Relation::HasMany(HasMany::new(self.base::<R>(), foreign_key, local_key))
    }

    /// Related rows of `R` reached through `T`
    ///
    /// Defaults: `first_key` is the parent's foreign key (on `T`),
    /// `second_key` is `T`'s foreign key (on `R`), `local_key` the parent's
    /// primary key.
    pub fn has_many_through<R: Model, T: Model>(
        &self,
        first_key: Option<&str>,
        second_key: Option<&str>,
        local_key: Option<&str>,
    ) -> Relation {
        let through = Entity::new::<T>();
        let first_key = first_key
            .unwrap_or_else(|| self.parent.foreign_key())
            .to_string();
        let second_key = second_key
            .map(str::to_string)
            .unwrap_or_else(|| through.foreign_key().to_string());
        let local_key = local_key.unwrap_or_else(|| self.parent.key_name()).to_string();

        Relation::HasManyThrough(HasManyThrough::new(
            self.base::<R>(),
            through,
            first_key,
            second_key,
            local_key,
        ))
    }
}
