//! HasOne Relationship - parent model has one related model

use std::ops::{Deref, DerefMut};

use super::base::RelationBase;
use super::has_one_or_many::HasOneOrMany;
use super::RelationValue;
use crate::error::ModelResult;
use crate::model::Entity;

/// HasOne relationship - the related table points back with a foreign key
#[derive(Debug, Clone)]
pub struct HasOne {
    inner: HasOneOrMany,
}

impl HasOne {
    pub(crate) fn new(base: RelationBase, foreign_key: String, local_key: String) -> Self {
        Self {
            inner: HasOneOrMany::new(base, foreign_key, local_key),
        }
    }

    /// Related entity of the parent, if any
    pub async fn get_results(&self) -> ModelResult<Option<Entity>> {
        self.inner.base.query.clone().first().await
    }

    pub(crate) fn init_relation(&self, models: &mut [Entity], relation: &str) {
        for model in models.iter_mut() {
            model.set_relation(relation, RelationValue::One(None));
        }
    }

    /// First matching result per parent
    pub(crate) fn match_results(&self, models: &mut [Entity], results: Vec<Entity>, relation: &str) {
        self.inner.match_one_or_many(models, results, relation, true);
    }
}

impl Deref for HasOne {
    type Target = HasOneOrMany;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for HasOne {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
