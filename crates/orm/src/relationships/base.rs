//! State shared by every relation kind

use uuid::Uuid;

use crate::model::Entity;
use crate::query::{Grammar, ModelQuery};

/// Query, parent and related prototype of a relation
#[derive(Debug, Clone)]
pub struct RelationBase {
    pub(crate) query: ModelQuery,
    pub(crate) parent: Entity,
    pub(crate) related: Entity,
    pub(crate) constraints: bool,
}

impl RelationBase {
    /// The related prototype inherits the parent's connection
    pub(crate) fn new(parent: &Entity, related: Entity, constraints: bool) -> Self {
        let related = match parent.connection() {
            Some(connection) => related.on(connection),
            None => related,
        };

        Self {
            query: related.new_query(),
            parent: parent.without_relations(),
            related,
            constraints,
        }
    }

    pub fn query(&self) -> &ModelQuery {
        &self.query
    }

    pub fn parent(&self) -> &Entity {
        &self.parent
    }

    pub fn related(&self) -> &Entity {
        &self.related
    }

    pub(crate) fn map_query<F>(&mut self, f: F)
    where
        F: FnOnce(ModelQuery) -> ModelQuery,
    {
        self.query = f(self.query.clone());
    }

    pub(crate) fn grammar(&self) -> Grammar {
        self.parent
            .connection()
            .map(|connection| connection.grammar())
            .unwrap_or_default()
    }

    pub(crate) fn wrap(&self, identifier: &str) -> String {
        self.grammar().wrap(identifier)
    }
}

/// Unique alias for a table joined to itself in a count query
pub(crate) fn relation_count_hash() -> String {
    format!("self_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_hashes_are_unique() {
        let first = relation_count_hash();
        assert!(first.starts_with("self_"));
        assert_eq!(first.len(), "self_".len() + 32);
        assert_ne!(first, relation_count_hash());
    }
}
