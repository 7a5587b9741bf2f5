//! Ordered, immutable sequence of entities

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;

use crate::error::ModelResult;
use crate::model::Entity;
use crate::relationships::eager_loading::{eager_load_relations, IntoEagerLoads};

/// Entities in result order; operations return new collections
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<Entity>,
}

impl Collection {
    pub fn new(items: Vec<Entity>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Entity> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Entity] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Entity> {
        self.items
    }

    /// Read one attribute from every entity
    pub fn pluck(&self, key: &str) -> ModelResult<Vec<Value>> {
        self.items
            .iter()
            .map(|entity| entity.get_attribute(key).map(|v| v.unwrap_or(Value::Null)))
            .collect()
    }

    /// Primary key of every entity
    pub fn model_keys(&self) -> Vec<Value> {
        self.items
            .iter()
            .map(|entity| entity.key().cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Entities for which `predicate` holds
    pub fn filter<F>(&self, predicate: F) -> Collection
    where
        F: Fn(&Entity) -> bool,
    {
        self.items.iter().filter(|e| predicate(e)).cloned().collect()
    }

    /// Eager load relations onto this collection, skipping ones already loaded
    pub async fn load(self, relations: impl IntoEagerLoads) -> ModelResult<Collection> {
        let loads = relations.into_eager_loads();
        let mut items = self.items;
        if !items.is_empty() {
            eager_load_relations(&mut items, &loads, false).await?;
        }
        Ok(Collection::new(items))
    }

    /// Eager load relations onto this collection, reloading ones already present
    pub async fn load_fresh(self, relations: impl IntoEagerLoads) -> ModelResult<Collection> {
        let loads = relations.into_eager_loads();
        let mut items = self.items;
        if !items.is_empty() {
            eager_load_relations(&mut items, &loads, true).await?;
        }
        Ok(Collection::new(items))
    }

    pub fn to_json(&self) -> ModelResult<Value> {
        self.items
            .iter()
            .map(Entity::to_json)
            .collect::<ModelResult<Vec<_>>>()
            .map(Value::Array)
    }
}

impl From<Vec<Entity>> for Collection {
    fn from(items: Vec<Entity>) -> Self {
        Self::new(items)
    }
}

impl FromIterator<Entity> for Collection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in &self.items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}
