//! Entity - a live record of some model
//!
//! An entity pairs the cached [`Schema`] of its model with its own attribute
//! store, loaded relations, connection and observers. Reading a key that is
//! neither an attribute nor a getter falls through to the relation of the
//! same name, which is fetched once and cached.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::backends::{Connection, Row};
use crate::error::{ModelError, ModelResult};
use crate::model::attributes::{AttributeStore, IntoAttributes, CREATED_AT, UPDATED_AT};
use crate::model::lifecycle::{EventDispatcher, LifecycleEvent, ModelObserver};
use crate::model::schema::Schema;
use crate::model::Model;
use crate::query::{ModelQuery, QueryBuilder};
use crate::relationships::eager_loading::{eager_load_relations, IntoEagerLoads};
use crate::relationships::{Relation, RelationFactory, RelationValue};

/// What a key on an entity resolved to
#[derive(Debug, Clone)]
pub enum Property {
    Attribute(Value),
    Relation(RelationValue),
}

/// One record of a model
#[derive(Clone)]
pub struct Entity {
    schema: Arc<Schema>,
    store: AttributeStore,
    relations: BTreeMap<String, RelationValue>,
    exists: bool,
    connection: Option<Arc<dyn Connection>>,
    events: EventDispatcher,
}

impl Entity {
    /// Fresh, unsaved entity of `M`
    pub fn new<M: Model>() -> Self {
        Self::from_schema(Schema::of::<M>())
    }

    /// Fresh entity of the model described by `schema`
    pub fn from_schema(schema: Arc<Schema>) -> Self {
        let mut entity = Self {
            store: AttributeStore::new(schema.attributes.clone()),
            events: EventDispatcher::for_type(schema.type_id),
            schema,
            relations: BTreeMap::new(),
            exists: false,
            connection: None,
        };
        entity.fire(LifecycleEvent::Initialized);
        entity
    }

    /// New entity of `M` mass assigned from `attributes`
    pub fn make<M: Model>(attributes: impl IntoAttributes) -> ModelResult<Self> {
        let mut entity = Self::new::<M>();
        entity.fill(attributes)?;
        Ok(entity)
    }

    /// Bind to `connection`
    pub fn on(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn set_connection(&mut self, connection: Arc<dyn Connection>) {
        self.connection = Some(connection);
    }

    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.clone()
    }

    pub(crate) fn require_connection(&self) -> ModelResult<Arc<dyn Connection>> {
        self.connection.clone().ok_or_else(|| {
            ModelError::Connection(format!(
                "No connection set for model '{}'",
                self.class_name()
            ))
        })
    }

    /// Empty entity of the same model on the same connection
    pub fn new_instance(&self) -> Entity {
        let mut instance = Self::from_schema(self.schema.clone());
        instance.connection = self.connection.clone();
        instance
    }

    /// Entities for fetched rows; each is marked as existing and clean
    pub fn hydrate(&self, rows: Vec<Row>) -> Vec<Entity> {
        rows.into_iter()
            .map(|row| {
                let mut entity = self.new_instance();
                entity.store.set_raw_attributes(row, true);
                entity.exists = true;
                entity
            })
            .collect()
    }

    /// Copy with no loaded relations
    pub fn without_relations(&self) -> Entity {
        Entity {
            schema: self.schema.clone(),
            store: self.store.clone(),
            relations: BTreeMap::new(),
            exists: self.exists,
            connection: self.connection.clone(),
            events: self.events.clone(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn class_name(&self) -> &'static str {
        self.schema.class_name()
    }

    pub fn table(&self) -> &'static str {
        self.schema.table()
    }

    pub fn key_name(&self) -> &'static str {
        self.schema.primary_key()
    }

    pub fn qualified_key_name(&self) -> String {
        self.schema.qualified_key_name()
    }

    pub fn foreign_key(&self) -> &str {
        self.schema.foreign_key()
    }

    /// Whether the entity has been persisted
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Raw primary key value
    pub fn key(&self) -> Option<&Value> {
        self.store.get_raw(self.key_name())
    }

    /// Attribute through the read pipeline
    pub fn get_attribute(&self, key: &str) -> ModelResult<Option<Value>> {
        self.store.get_value(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.store.set(key, value)
    }

    pub fn set_raw(&mut self, key: &str, value: impl Into<Value>) {
        self.store.set_raw(key, value);
    }

    pub fn fill(&mut self, attributes: impl IntoAttributes) -> ModelResult<()> {
        self.store.fill(attributes)
    }

    pub fn force_fill(&mut self, attributes: impl IntoAttributes) -> ModelResult<()> {
        self.store.force_fill(attributes)
    }

    pub fn attributes(&self) -> &Row {
        self.store.attributes()
    }

    pub fn store(&self) -> &AttributeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AttributeStore {
        &mut self.store
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }

    pub fn dirty(&self) -> Row {
        self.store.dirty()
    }

    pub fn date(&self, key: &str) -> ModelResult<Option<DateTime<Utc>>> {
        self.store.date(key)
    }

    /// Relation `name` scoped to this entity
    pub fn relation(&self, name: &str) -> Option<Relation> {
        (self.schema.relations)(name, &RelationFactory::new(self, true))
    }

    /// Relation `name` without its per-parent constraint
    pub fn relation_without_constraints(&self, name: &str) -> Option<Relation> {
        (self.schema.relations)(name, &RelationFactory::new(self, false))
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn get_relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    pub fn set_relation(&mut self, name: &str, value: RelationValue) {
        self.relations.insert(name.to_string(), value);
    }

    pub(crate) fn take_relation(&mut self, name: &str) -> Option<RelationValue> {
        self.relations.remove(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, RelationValue> {
        &self.relations
    }

    /// Attribute, loaded relation, or relation fetched and cached on first access
    pub async fn get(&mut self, key: &str) -> ModelResult<Option<Property>> {
        if self.store.has(key) {
            return Ok(self.store.get_value(key)?.map(Property::Attribute));
        }

        if let Some(value) = self.relations.get(key) {
            return Ok(Some(Property::Relation(value.clone())));
        }

        Ok(self.load_relation(key).await?.map(Property::Relation))
    }

    /// Fetch relation `name` and cache it; `None` when it is not declared
    pub async fn load_relation(&mut self, name: &str) -> ModelResult<Option<RelationValue>> {
        let Some(relation) = self.relation(name) else {
            tracing::trace!("{} has no relation '{}'", self.class_name(), name);
            return Ok(None);
        };

        let value = relation.get_results().await?;
        self.set_relation(name, value.clone());
        Ok(Some(value))
    }

    /// Query over this model's table
    pub fn new_query(&self) -> ModelQuery {
        ModelQuery::new(self.without_relations())
    }

    /// Query over this model's table ignoring default eager loads
    pub fn new_query_without_relations(&self) -> ModelQuery {
        ModelQuery::without_eager_loads(self.without_relations())
    }

    /// Observe only this entity
    pub fn observe(&mut self, observer: impl ModelObserver + 'static) {
        self.events.add(Arc::new(observer));
    }

    fn fire(&mut self, event: LifecycleEvent) {
        if self.events.is_empty() {
            return;
        }
        let events = self.events.clone();
        events.fire(event, self);
    }

    /// Insert or update, firing lifecycle events around the write
    pub async fn save(&mut self) -> ModelResult<()> {
        let connection = self.require_connection()?;
        self.fire(LifecycleEvent::Saving);

        if self.exists {
            if self.is_dirty() {
                self.perform_update(connection.as_ref()).await?;
            }
        } else {
            self.perform_insert(connection.as_ref()).await?;
        }

        self.fire(LifecycleEvent::Saved);
        self.store.sync_original();
        Ok(())
    }

    async fn perform_update(&mut self, connection: &dyn Connection) -> ModelResult<()> {
        self.fire(LifecycleEvent::Updating);

        if self.schema.uses_timestamps() && !self.store.is_attribute_dirty(UPDATED_AT) {
            self.touch(UPDATED_AT)?;
        }

        let key = self
            .key()
            .filter(|key| !key.is_null())
            .cloned()
            .ok_or(ModelError::MissingPrimaryKey)?;

        let statement = QueryBuilder::new()
            .update(self.table())
            .set_values(self.store.dirty())
            .where_eq(self.key_name(), key);

        connection.update(&statement).await.map_err(|e| {
            tracing::error!("Failed to update {}: {}", self.class_name(), e);
            e
        })?;

        self.fire(LifecycleEvent::Updated);
        Ok(())
    }

    async fn perform_insert(&mut self, connection: &dyn Connection) -> ModelResult<()> {
        self.fire(LifecycleEvent::Creating);

        if self.schema.uses_timestamps() {
            if !self.store.is_attribute_dirty(UPDATED_AT) {
                self.touch(UPDATED_AT)?;
            }
            if !self.store.is_attribute_dirty(CREATED_AT) {
                self.touch(CREATED_AT)?;
            }
        }

        let mut statement = QueryBuilder::new()
            .insert_into(self.table())
            .set_values(self.store.attributes().clone());
        if self.schema.incrementing {
            statement = statement.returning(self.key_name());
        }

        let id = connection.insert(&statement).await.map_err(|e| {
            tracing::error!("Failed to insert {}: {}", self.class_name(), e);
            e
        })?;

        if self.schema.incrementing {
            if let Some(id) = id {
                let key_name = self.key_name();
                self.store.set_raw(key_name, id);
            }
        }

        self.exists = true;
        self.fire(LifecycleEvent::Created);
        Ok(())
    }

    fn touch(&mut self, column: &str) -> ModelResult<()> {
        self.store.set(column, Utc::now().to_rfc3339())
    }

    /// Eager load onto this entity, skipping relations already loaded
    pub async fn load(&mut self, relations: impl IntoEagerLoads) -> ModelResult<()> {
        self.load_with(relations, false).await
    }

    /// Eager load onto this entity, reloading relations already present
    pub async fn load_fresh(&mut self, relations: impl IntoEagerLoads) -> ModelResult<()> {
        self.load_with(relations, true).await
    }

    async fn load_with(&mut self, relations: impl IntoEagerLoads, force: bool) -> ModelResult<()> {
        let loads = relations.into_eager_loads();
        let mut batch = vec![self.clone()];
        eager_load_relations(&mut batch, &loads, force).await?;
        if let Some(loaded) = batch.pop() {
            *self = loaded;
        }
        Ok(())
    }

    /// Visible attributes through the read pipeline, with loaded relations nested
    pub fn to_json(&self) -> ModelResult<Value> {
        let mut map = Map::new();

        for key in self.store.attributes().keys() {
            if !self.schema.is_visible(key) {
                continue;
            }
            let value = self.store.get_value(key)?.unwrap_or(Value::Null);
            map.insert(key.clone(), value);
        }

        for (name, relation) in &self.relations {
            if self.schema.is_visible(name) {
                map.insert(name.clone(), relation.to_json()?);
            }
        }

        Ok(Value::Object(map))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.class_name())
            .field("exists", &self.exists)
            .field("attributes", self.store.attributes())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockConnection;
    use serde_json::json;

    struct Note;

    impl Model for Note {
        fn table_name() -> &'static str {
            "notes"
        }

        fn hidden() -> &'static [&'static str] {
            &["secret"]
        }

        fn casts() -> &'static [(&'static str, &'static str)] {
            &[("meta", "json")]
        }
    }

    struct Draft;

    impl Model for Draft {
        fn table_name() -> &'static str {
            "drafts"
        }

        fn uses_timestamps() -> bool {
            false
        }
    }

    #[test]
    fn test_to_json_applies_casts_and_hidden() {
        let mut note = Entity::new::<Note>();
        note.set("meta", json!({"a": 1})).unwrap();
        note.set("secret", "x").unwrap();
        note.set("title", "hello").unwrap();

        assert_eq!(
            note.to_json().unwrap(),
            json!({"meta": {"a": 1}, "title": "hello"})
        );
    }

    #[test]
    fn test_new_instances_do_not_share_attributes() {
        let mut first = Entity::new::<Note>();
        first.set("title", "a").unwrap();
        let second = first.new_instance();

        assert!(second.attributes().is_empty());
        assert!(!second.exists());
    }

    #[tokio::test]
    async fn test_save_without_connection_fails() {
        let mut note = Entity::new::<Note>();
        let err = note.save().await.unwrap_err();
        assert!(matches!(err, ModelError::Connection(_)));
    }

    #[tokio::test]
    async fn test_insert_assigns_key_and_update_sends_dirty_only() {
        let mock = Arc::new(MockConnection::new());
        mock.set_next_id(7);

        let mut draft = Entity::new::<Draft>().on(mock.clone());
        draft.set("title", "first").unwrap();
        draft.set("body", "text").unwrap();
        draft.save().await.unwrap();

        assert!(draft.exists());
        assert_eq!(draft.key(), Some(&json!(7)));
        assert!(!draft.is_dirty());

        draft.set("title", "second").unwrap();
        draft.save().await.unwrap();

        let sql = mock.executed_sql();
        assert_eq!(
            sql[0],
            "INSERT INTO drafts (body, title) VALUES ('text', 'first') RETURNING id"
        );
        assert_eq!(sql[1], "UPDATE drafts SET title = 'second' WHERE id = 7");
    }

    #[tokio::test]
    async fn test_clean_existing_entity_runs_no_update() {
        let mock = Arc::new(MockConnection::new());
        let mut draft = Entity::new::<Draft>().on(mock.clone());
        let mut rows = draft.hydrate(vec![vec![("id", json!(1))].into_attributes()]);
        draft = rows.remove(0);

        draft.save().await.unwrap();
        assert_eq!(mock.query_count(), 0);
    }
}
