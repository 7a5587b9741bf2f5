//! Eager Loading System - Prevents N+1 query problems with batched relation loading
//!
//! Relation paths are parsed into an ordered constraint table where every
//! ancestor of a dotted path is registered before the path itself. Loading
//! resolves only the top-level names against the current batch; deeper paths
//! are handed to the relation query of their first segment, so each level of
//! nesting costs exactly one query per relation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{ModelResult, RelationshipError};
use crate::model::{Collection, Entity};
use crate::query::ModelQuery;
use crate::relationships::RelationValue;

/// Boxed future used for the recursive loading path
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Constraint callback applied to a relation query
pub type ConstraintFn = Arc<dyn Fn(ModelQuery) -> ModelQuery + Send + Sync>;

/// Constraint attached to an eager-load path; the default does nothing
#[derive(Clone, Default)]
pub struct EagerConstraint(Option<ConstraintFn>);

impl EagerConstraint {
    pub fn new<F>(constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        Self(Some(Arc::new(constraint)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    pub fn apply(&self, query: ModelQuery) -> ModelQuery {
        match &self.0 {
            Some(constraint) => constraint(query),
            None => query,
        }
    }
}

impl fmt::Debug for EagerConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_noop() { "noop" } else { "constraint" })
    }
}

/// Ordered table of relation paths to their constraints
#[derive(Debug, Clone, Default)]
pub struct EagerLoads {
    entries: Vec<(String, EagerConstraint)>,
}

impl EagerLoads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse any supported relation list
    pub fn parse(relations: impl IntoEagerLoads) -> Self {
        relations.into_eager_loads()
    }

    /// Builder form of `insert` without a constraint
    pub fn with(mut self, path: &str) -> Self {
        self.insert(path, EagerConstraint::none());
        self
    }

    /// Builder form of `insert` with a constraint
    pub fn with_constraint<F>(mut self, path: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.insert(path, EagerConstraint::new(constraint));
        self
    }

    /// Register `path`, adding no-op entries for missing ancestors first and
    /// then setting the constraint of the exact path
    pub fn insert(&mut self, path: &str, constraint: EagerConstraint) {
        let path = path.trim();
        if path.is_empty() {
            return;
        }

        let mut progress = String::new();
        for segment in path.split('.') {
            if !progress.is_empty() {
                progress.push('.');
            }
            progress.push_str(segment);
            if !self.contains(&progress) {
                self.entries.push((progress.clone(), EagerConstraint::none()));
            }
        }

        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| name == path) {
            entry.1 = constraint;
        }
    }

    /// Add every entry of `other`; a no-op never replaces an existing constraint
    pub fn merge(&mut self, other: EagerLoads) {
        for (path, constraint) in other.entries {
            if constraint.is_noop() && self.contains(&path) {
                continue;
            }
            self.insert(&path, constraint);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == path)
    }

    pub fn get(&self, path: &str) -> Option<&EagerConstraint> {
        self.entries
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, constraint)| constraint)
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries without a `.`, resolved against the current batch
    pub fn top_level(&self) -> impl Iterator<Item = (&str, &EagerConstraint)> {
        self.entries
            .iter()
            .filter(|(name, _)| !name.contains('.'))
            .map(|(name, constraint)| (name.as_str(), constraint))
    }

    /// Paths below `name`, re-rooted at the relation
    pub fn nested_under(&self, name: &str) -> EagerLoads {
        let prefix = format!("{}.", name);
        EagerLoads {
            entries: self
                .entries
                .iter()
                .filter_map(|(path, constraint)| {
                    path.strip_prefix(&prefix)
                        .map(|rest| (rest.to_string(), constraint.clone()))
                })
                .collect(),
        }
    }
}

/// Inputs accepted by `with`
pub trait IntoEagerLoads {
    fn into_eager_loads(self) -> EagerLoads;
}

impl IntoEagerLoads for EagerLoads {
    fn into_eager_loads(self) -> EagerLoads {
        self
    }
}

impl IntoEagerLoads for &str {
    fn into_eager_loads(self) -> EagerLoads {
        EagerLoads::new().with(self)
    }
}

impl IntoEagerLoads for String {
    fn into_eager_loads(self) -> EagerLoads {
        EagerLoads::new().with(&self)
    }
}

impl IntoEagerLoads for &[&str] {
    fn into_eager_loads(self) -> EagerLoads {
        self.iter().fold(EagerLoads::new(), |loads, path| loads.with(path))
    }
}

impl<const N: usize> IntoEagerLoads for [&str; N] {
    fn into_eager_loads(self) -> EagerLoads {
        self.as_slice().into_eager_loads()
    }
}

impl IntoEagerLoads for Vec<&str> {
    fn into_eager_loads(self) -> EagerLoads {
        self.as_slice().into_eager_loads()
    }
}

impl IntoEagerLoads for Vec<String> {
    fn into_eager_loads(self) -> EagerLoads {
        self.iter().fold(EagerLoads::new(), |loads, path| loads.with(path))
    }
}

impl IntoEagerLoads for Vec<(&str, EagerConstraint)> {
    fn into_eager_loads(self) -> EagerLoads {
        let mut loads = EagerLoads::new();
        for (path, constraint) in self {
            loads.insert(path, constraint);
        }
        loads
    }
}

/// Eager load `loads` onto `models`
///
/// Relations already present on a model are skipped unless `force` is set;
/// nested paths still descend into them.
pub fn eager_load_relations<'a>(
    models: &'a mut Vec<Entity>,
    loads: &'a EagerLoads,
    force: bool,
) -> BoxFuture<'a, ModelResult<()>> {
    Box::pin(async move {
        if models.is_empty() {
            return Ok(());
        }

        let top_level: Vec<(String, EagerConstraint)> = loads
            .top_level()
            .map(|(name, constraint)| (name.to_string(), constraint.clone()))
            .collect();

        for (name, constraint) in top_level {
            let nested = loads.nested_under(&name);

            let pending: Vec<usize> = models
                .iter()
                .enumerate()
                .filter(|(_, model)| force || !model.relation_loaded(&name))
                .map(|(index, _)| index)
                .collect();

            if pending.len() == models.len() {
                load_relation(models.as_mut_slice(), &name, &constraint, nested).await?;
                continue;
            }

            if !pending.is_empty() {
                let mut batch: Vec<Entity> = pending.iter().map(|&i| models[i].clone()).collect();
                load_relation(&mut batch, &name, &constraint, nested.clone()).await?;
                for (index, model) in pending.iter().zip(batch) {
                    models[*index] = model;
                }
            }

            if !nested.is_empty() {
                descend_into_loaded(models, &pending, &name, &nested).await?;
            }
        }

        Ok(())
    })
}

/// One batched query for `name`, matched back onto every model
async fn load_relation(
    models: &mut [Entity],
    name: &str,
    constraint: &EagerConstraint,
    nested: EagerLoads,
) -> ModelResult<()> {
    let Some(mut relation) = models[0].relation_without_constraints(name) else {
        return Err(RelationshipError::NotFound {
            relation: name.to_string(),
            model: models[0].class_name().to_string(),
        }
        .into());
    };

    relation.add_eager_constraints(models);
    let relation = relation.constrain(|query| constraint.apply(query.with(nested)));

    tracing::debug!(
        "Eager loading '{}' for {} {} model(s)",
        name,
        models.len(),
        models[0].class_name()
    );

    let results = relation.get_eager().await?;

    relation.init_relation(models, name);
    relation.match_results(models, results, name);
    Ok(())
}

/// Apply nested paths to relations that were already loaded
async fn descend_into_loaded(
    models: &mut [Entity],
    skip: &[usize],
    name: &str,
    nested: &EagerLoads,
) -> ModelResult<()> {
    let mut owners = Vec::new();
    let mut children = Vec::new();

    for (index, model) in models.iter_mut().enumerate() {
        if skip.contains(&index) {
            continue;
        }
        if let Some(value) = model.take_relation(name) {
            let shape = value.empty_like();
            let entities = value.into_entities();
            owners.push((index, shape, entities.len()));
            children.extend(entities);
        }
    }

    if children.is_empty() {
        for (index, shape, _) in owners {
            models[index].set_relation(name, shape);
        }
        return Ok(());
    }

    eager_load_relations(&mut children, nested, false).await?;

    let mut children = children.into_iter();
    for (index, shape, count) in owners {
        let entities: Vec<Entity> = children.by_ref().take(count).collect();
        let value = match shape {
            RelationValue::One(_) => RelationValue::One(entities.into_iter().next().map(Box::new)),
            RelationValue::Many(_) => RelationValue::Many(Collection::new(entities)),
        };
        models[index].set_relation(name, value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_path_registers_ancestors() {
        let loads = EagerLoads::parse(["a.b.c"]);

        assert_eq!(loads.paths(), vec!["a", "a.b", "a.b.c"]);
        assert!(loads.get("a").unwrap().is_noop());
        assert!(loads.get("a.b").unwrap().is_noop());
    }

    #[test]
    fn test_explicit_ancestor_constraint_survives() {
        let loads = EagerLoads::new()
            .with_constraint("a", |q| q.take(5))
            .with("a.b");

        assert!(!loads.get("a").unwrap().is_noop());
        assert!(loads.get("a.b").unwrap().is_noop());
    }

    #[test]
    fn test_exact_path_constraint_overrides_auto_inserted_noop() {
        let loads = EagerLoads::new()
            .with("a.b")
            .with_constraint("a", |q| q.take(1));

        assert_eq!(loads.paths(), vec!["a", "a.b"]);
        assert!(!loads.get("a").unwrap().is_noop());
    }

    #[test]
    fn test_merge_is_additive() {
        let mut loads = EagerLoads::new().with_constraint("posts", |q| q.take(3));
        loads.merge(EagerLoads::parse(vec!["posts", "country"]));

        assert_eq!(loads.paths(), vec!["posts", "country"]);
        assert!(!loads.get("posts").unwrap().is_noop());
    }

    #[test]
    fn test_nested_under_reroots_paths() {
        let loads = EagerLoads::parse(["posts.comments.author", "posts.tags", "country"]);
        let nested = loads.nested_under("posts");

        assert_eq!(nested.paths(), vec!["comments", "comments.author", "tags"]);
        assert_eq!(
            loads.top_level().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["posts", "country"]
        );
    }
}
