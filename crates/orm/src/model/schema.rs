//! Cached per-model metadata

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::model::attributes::AttributeSchema;
use crate::model::Model;
use crate::relationships::{Relation, RelationFactory};

/// Relation lookup for one model type
pub(crate) type RelationResolver = fn(&str, &RelationFactory<'_>) -> Option<Relation>;

static SCHEMAS: Lazy<DashMap<TypeId, Arc<Schema>>> = Lazy::new(DashMap::new);

/// Everything an entity needs to know about its model, built once per type
pub struct Schema {
    pub(crate) type_id: TypeId,
    pub(crate) class_name: &'static str,
    pub(crate) table: &'static str,
    pub(crate) primary_key: &'static str,
    pub(crate) incrementing: bool,
    pub(crate) timestamps: bool,
    pub(crate) hidden: Vec<String>,
    pub(crate) visible: Vec<String>,
    pub(crate) per_page: u32,
    pub(crate) eager_loads: Vec<String>,
    pub(crate) foreign_key: String,
    pub(crate) attributes: Arc<AttributeSchema>,
    pub(crate) relations: RelationResolver,
}

impl Schema {
    /// Cached schema for `M`
    pub fn of<M: Model>() -> Arc<Schema> {
        let type_id = TypeId::of::<M>();
        if let Some(schema) = SCHEMAS.get(&type_id) {
            return schema.value().clone();
        }

        let schema = Arc::new(Self::build::<M>());
        SCHEMAS.entry(type_id).or_insert(schema).value().clone()
    }

    fn build<M: Model>() -> Self {
        tracing::trace!("Building schema for {}", M::class_name());
        Self {
            type_id: TypeId::of::<M>(),
            class_name: M::class_name(),
            table: M::table_name(),
            primary_key: M::primary_key_name(),
            incrementing: M::incrementing(),
            timestamps: M::uses_timestamps(),
            hidden: M::hidden().iter().map(|k| k.to_string()).collect(),
            visible: M::visible().iter().map(|k| k.to_string()).collect(),
            per_page: M::per_page(),
            eager_loads: M::eager_loads().iter().map(|k| k.to_string()).collect(),
            foreign_key: M::foreign_key(),
            attributes: Arc::new(AttributeSchema::for_model::<M>()),
            relations: M::relation,
        }
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    /// `table.primary_key`
    pub fn qualified_key_name(&self) -> String {
        format!("{}.{}", self.table, self.primary_key)
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn uses_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn attributes(&self) -> &AttributeSchema {
        &self.attributes
    }

    /// Whether a serialized key is shown
    pub(crate) fn is_visible(&self, key: &str) -> bool {
        if !self.visible.is_empty() && !self.visible.iter().any(|k| k == key) {
            return false;
        }
        !self.hidden.iter().any(|k| k == key)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("class_name", &self.class_name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}
