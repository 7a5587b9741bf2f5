//! HasManyThrough Relationship - far parent reaches related rows via an intermediate table
//!
//! `first_key` lives on the through table and points at the far parent;
//! `second_key` lives on the related table and points at the through row.

use serde_json::Value;

use super::base::RelationBase;
use super::dictionary::{collect_keys, Dictionary};
use super::RelationValue;
use crate::error::ModelResult;
use crate::model::{Collection, Entity};
use crate::query::ModelQuery;

/// Many related rows reached through one intermediate model
#[derive(Debug, Clone)]
pub struct HasManyThrough {
    pub(crate) base: RelationBase,
    through: Entity,
    first_key: String,
    second_key: String,
    local_key: String,
}

impl HasManyThrough {
    /// `base.parent` is the far parent
    pub(crate) fn new(
        base: RelationBase,
        through: Entity,
        first_key: String,
        second_key: String,
        local_key: String,
    ) -> Self {
        let mut relation = Self {
            base,
            through,
            first_key,
            second_key,
            local_key,
        };

        let joined = relation.set_join(relation.base.query.clone());
        relation.base.query = joined;

        if relation.base.constraints {
            let column = relation.qualified_first_key();
            let local_value = relation
                .base
                .parent
                .store()
                .get_raw(&relation.local_key)
                .cloned()
                .unwrap_or(Value::Null);
            relation.base.map_query(|q| q.where_eq(&column, local_value));
        }

        relation
    }

    fn set_join(&self, query: ModelQuery) -> ModelQuery {
        let foreign_key = format!("{}.{}", self.base.related.table(), self.second_key);
        query.join(
            self.through.table(),
            &self.through.qualified_key_name(),
            "=",
            &foreign_key,
        )
    }

    pub fn through(&self) -> &Entity {
        &self.through
    }

    pub fn first_key(&self) -> &str {
        &self.first_key
    }

    pub fn second_key(&self) -> &str {
        &self.second_key
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    /// `through_table.first_key`
    pub fn qualified_first_key(&self) -> String {
        format!("{}.{}", self.through.table(), self.first_key)
    }

    /// Relation query selecting the related columns plus the far parent key
    pub(crate) fn select_query(&self) -> ModelQuery {
        let first_key = self.qualified_first_key();
        if self.base.query.base().columns().is_empty() {
            let related = format!("{}.*", self.base.related.table());
            self.base
                .query
                .clone()
                .add_select(&[related.as_str(), first_key.as_str()])
        } else {
            self.base.query.clone().add_select(&[first_key.as_str()])
        }
    }

    pub(crate) fn add_eager_constraints(&mut self, models: &[Entity]) {
        let keys = collect_keys(models, &self.local_key);
        let column = self.qualified_first_key();
        self.base.map_query(|q| q.where_in(&column, keys));
    }

    pub(crate) fn init_relation(&self, models: &mut [Entity], relation: &str) {
        for model in models.iter_mut() {
            model.set_relation(relation, RelationValue::Many(Collection::empty()));
        }
    }

    /// Results are keyed by the selected `first_key` column
    pub(crate) fn match_results(&self, models: &mut [Entity], results: Vec<Entity>, relation: &str) {
        let dictionary = Dictionary::build(results, &self.first_key);

        for model in models.iter_mut() {
            let Some(key) = model.store().get_raw(&self.local_key).cloned() else {
                continue;
            };
            if let Some(matches) = dictionary.get(&key) {
                model.set_relation(relation, RelationValue::Many(Collection::new(matches.to_vec())));
            }
        }
    }

    pub async fn get_results(&self) -> ModelResult<Collection> {
        self.select_query().get().await
    }

    pub(crate) async fn get_eager(&self) -> ModelResult<Vec<Entity>> {
        Ok(self.select_query().get().await?.into_vec())
    }

    /// Related row with `id` among this relation's rows
    pub async fn find<T: Into<Value>>(&self, id: T) -> ModelResult<Option<Entity>> {
        let key = self.base.related.qualified_key_name();
        self.select_query().where_eq(&key, id).first().await
    }

    /// Related rows with any of `ids`; no query is run for an empty list
    pub async fn find_many<T: Into<Value>>(&self, ids: Vec<T>) -> ModelResult<Collection> {
        if ids.is_empty() {
            return Ok(Collection::empty());
        }
        let key = self.base.related.qualified_key_name();
        self.select_query().where_in(&key, ids).get().await
    }

    /// Correlated `COUNT(*)` joined through the intermediate table
    pub(crate) fn relation_count_query(&self) -> ModelQuery {
        let far_parent_key = format!("{}.{}", self.base.parent.table(), self.local_key);
        let first = self.base.wrap(&far_parent_key);
        let second = self.base.wrap(&self.qualified_first_key());

        self.base
            .query
            .clone()
            .map_base(|q| q.select_raw("COUNT(*)"))
            .where_column(&first, "=", &second)
    }
}
