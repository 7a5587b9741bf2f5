//! HasMany Relationship - parent model has many related models

use std::ops::{Deref, DerefMut};

use super::base::RelationBase;
use super::has_one_or_many::HasOneOrMany;
use super::RelationValue;
use crate::error::ModelResult;
use crate::model::{Collection, Entity};

/// HasMany relationship - every related row carrying the parent's key
#[derive(Debug, Clone)]
pub struct HasMany {
    inner: HasOneOrMany,
}

impl HasMany {
    pub(crate) fn new(base: RelationBase, foreign_key: String, local_key: String) -> Self {
        let constraints = base.constraints;
        let mut inner = HasOneOrMany::new(base, foreign_key, local_key);
        if constraints {
            let foreign_key = inner.foreign_key().to_string();
            inner.base.map_query(|q| q.where_not_null(&foreign_key));
        }
        Self { inner }
    }

    /// Every related entity of the parent
    pub async fn get_results(&self) -> ModelResult<Collection> {
        self.inner.base.query.clone().get().await
    }

    pub(crate) fn init_relation(&self, models: &mut [Entity], relation: &str) {
        for model in models.iter_mut() {
            model.set_relation(relation, RelationValue::Many(Collection::empty()));
        }
    }

    /// All matching results per parent, in result order
    pub(crate) fn match_results(&self, models: &mut [Entity], results: Vec<Entity>, relation: &str) {
        self.inner.match_one_or_many(models, results, relation, false);
    }
}

impl Deref for HasMany {
    type Target = HasOneOrMany;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for HasMany {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
