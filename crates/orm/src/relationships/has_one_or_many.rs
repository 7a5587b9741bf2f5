//! Behaviour shared by HasOne and HasMany
//!
//! The related table carries a foreign key pointing at a local key on the
//! parent. Writes through the relation stamp that foreign key onto the
//! related entity before saving it.

use chrono::Utc;
use serde_json::Value;

use super::base::{relation_count_hash, RelationBase};
use super::dictionary::{collect_keys, Dictionary};
use super::RelationValue;
use crate::error::ModelResult;
use crate::model::attributes::{remove_table_from_key, IntoAttributes, UPDATED_AT};
use crate::model::{Collection, Entity};
use crate::query::ModelQuery;

/// Relation whose foreign key lives on the related table
#[derive(Debug, Clone)]
pub struct HasOneOrMany {
    pub(crate) base: RelationBase,
    foreign_key: String,
    local_key: String,
}

impl HasOneOrMany {
    /// `foreign_key` is qualified with the related table
    pub(crate) fn new(base: RelationBase, foreign_key: String, local_key: String) -> Self {
        let mut relation = Self {
            base,
            foreign_key,
            local_key,
        };
        if relation.base.constraints {
            relation.add_constraints();
        }
        relation
    }

    fn add_constraints(&mut self) {
        let parent_key = self.parent_key().unwrap_or(Value::Null);
        let foreign_key = self.foreign_key.clone();
        self.base.map_query(|q| q.where_eq(&foreign_key, parent_key));
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// Foreign key without its table prefix
    pub fn plain_foreign_key(&self) -> &str {
        remove_table_from_key(&self.foreign_key)
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    /// Raw value of the local key on the parent
    pub fn parent_key(&self) -> Option<Value> {
        self.base.parent.store().get_raw(&self.local_key).cloned()
    }

    /// `parent_table.local_key`
    pub fn qualified_parent_key_name(&self) -> String {
        format!("{}.{}", self.base.parent.table(), self.local_key)
    }

    pub(crate) fn add_eager_constraints(&mut self, models: &[Entity]) {
        let keys = collect_keys(models, &self.local_key);
        let foreign_key = self.foreign_key.clone();
        self.base.map_query(|q| q.where_in(&foreign_key, keys));
    }

    /// Attach results to the parents whose local key they reference
    pub(crate) fn match_one_or_many(
        &self,
        models: &mut [Entity],
        results: Vec<Entity>,
        relation: &str,
        one: bool,
    ) {
        let dictionary = Dictionary::build(results, self.plain_foreign_key());
        tracing::trace!(
            "Matching '{}' across {} parent key(s)",
            relation,
            dictionary.len()
        );

        for model in models.iter_mut() {
            let Some(key) = model.store().get_raw(&self.local_key).cloned() else {
                continue;
            };
            let Some(matches) = dictionary.get(&key) else {
                continue;
            };
            let value = if one {
                RelationValue::One(matches.first().cloned().map(Box::new))
            } else {
                RelationValue::Many(Collection::new(matches.to_vec()))
            };
            model.set_relation(relation, value);
        }
    }

    /// Correlated `COUNT(*)` over the related table for `has` filters
    pub(crate) fn relation_count_query(&self, parent_query: &ModelQuery) -> ModelQuery {
        let query = self.base.query.clone().map_base(|q| q.select_raw("COUNT(*)"));

        if parent_query.base().from_source() == self.base.query.base().from_source() {
            return self.self_relation_count_query(query);
        }

        let first = self.base.wrap(&self.foreign_key);
        let second = self.base.wrap(&self.qualified_parent_key_name());
        query.where_column(&first, "=", &second)
    }

    fn self_relation_count_query(&self, query: ModelQuery) -> ModelQuery {
        let hash = relation_count_hash();
        let table = self.base.related.table();
        let first = self
            .base
            .wrap(&format!("{}.{}", hash, self.plain_foreign_key()));
        let second = self.base.wrap(&self.qualified_parent_key_name());

        query
            .map_base(|q| q.from(&format!("{} as {}", table, hash)))
            .where_column(&first, "=", &second)
    }

    /// Fresh related entity pointing at the parent
    fn new_related(&self) -> ModelResult<Entity> {
        let mut instance = self.base.related.new_instance();
        if let Some(key) = self.parent_key() {
            instance.set(self.plain_foreign_key(), key)?;
        }
        Ok(instance)
    }

    /// Stamp the foreign key onto `model` and save it
    pub async fn save(&self, mut model: Entity) -> ModelResult<Entity> {
        model.set(self.plain_foreign_key(), self.parent_key().unwrap_or(Value::Null))?;
        if model.connection().is_none() {
            if let Some(connection) = self.base.parent.connection() {
                model.set_connection(connection);
            }
        }
        model.save().await?;
        Ok(model)
    }

    pub async fn save_many(&self, models: Vec<Entity>) -> ModelResult<Vec<Entity>> {
        let mut saved = Vec::with_capacity(models.len());
        for model in models {
            saved.push(self.save(model).await?);
        }
        Ok(saved)
    }

    /// Build, fill, link and save a new related entity
    pub async fn create(&self, attributes: impl IntoAttributes) -> ModelResult<Entity> {
        let mut instance = self.base.related.new_instance();
        instance.force_fill(attributes)?;
        self.save(instance).await
    }

    pub async fn create_many<A: IntoAttributes>(&self, records: Vec<A>) -> ModelResult<Vec<Entity>> {
        let mut created = Vec::with_capacity(records.len());
        for attributes in records {
            created.push(self.create(attributes).await?);
        }
        Ok(created)
    }

    /// Related entity with `id`, or an unsaved one linked to the parent
    pub async fn find_or_new<T: Into<Value>>(&self, id: T) -> ModelResult<Entity> {
        let key = self.base.related.qualified_key_name();
        match self.base.query.clone().where_eq(&key, id).first().await? {
            Some(found) => Ok(found),
            None => self.new_related(),
        }
    }

    /// First related entity matching `attributes`, or an unsaved one filled with them
    pub async fn first_or_new(&self, attributes: impl IntoAttributes) -> ModelResult<Entity> {
        let attributes = attributes.into_attributes();
        let found = self
            .base
            .query
            .clone()
            .where_attributes(attributes.clone())
            .first()
            .await?;

        match found {
            Some(found) => Ok(found),
            None => {
                let mut instance = self.new_related()?;
                instance.fill(attributes)?;
                Ok(instance)
            }
        }
    }

    pub async fn first_or_create(&self, attributes: impl IntoAttributes) -> ModelResult<Entity> {
        let attributes = attributes.into_attributes();
        let found = self
            .base
            .query
            .clone()
            .where_attributes(attributes.clone())
            .first()
            .await?;

        match found {
            Some(found) => Ok(found),
            None => self.create(attributes).await,
        }
    }

    /// Find by `attributes`, apply `values` and save
    pub async fn update_or_create(
        &self,
        attributes: impl IntoAttributes,
        values: impl IntoAttributes,
    ) -> ModelResult<Entity> {
        let mut instance = self.first_or_new(attributes).await?;
        instance.fill(values)?;
        self.save(instance).await
    }

    /// Mass update every related row, touching `updated_at` when the model has timestamps
    pub async fn update(&self, values: impl IntoAttributes) -> ModelResult<u64> {
        let mut values = values.into_attributes();
        let related = &self.base.related;
        if related.schema().uses_timestamps() && !values.contains_key(UPDATED_AT) {
            let now = related
                .store()
                .from_date_time(&Value::String(Utc::now().to_rfc3339()))?;
            values.insert(UPDATED_AT.to_string(), Value::String(now));
        }
        self.base.query.update(values).await
    }
}
