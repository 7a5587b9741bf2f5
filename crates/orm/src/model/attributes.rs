//! Attribute storage with cast, mutator and date pipelines
//!
//! Every entity owns an [`AttributeStore`]: the raw values as persisted, a
//! snapshot of the original values for dirty tracking, and a shared
//! [`AttributeSchema`] describing how values are transformed on the way in
//! and out.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::backends::Row;
use crate::error::{ModelError, ModelResult};
use crate::model::Model;

/// Name of the creation timestamp column
pub const CREATED_AT: &str = "created_at";

/// Name of the last-update timestamp column
pub const UPDATED_AT: &str = "updated_at";

/// Getter override: receives the raw stored value, returns the exposed value
pub type GetMutator = Arc<dyn Fn(Option<&Value>) -> Value + Send + Sync>;

/// Setter override: receives the store and the incoming value
pub type SetMutator = Arc<dyn Fn(&mut AttributeStore, Value) + Send + Sync>;

/// Registered getter/setter table keyed by attribute name
#[derive(Clone, Default)]
pub struct Mutators {
    getters: HashMap<String, GetMutator>,
    setters: HashMap<String, SetMutator>,
}

impl Mutators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a getter for `key`
    pub fn getter<F>(&mut self, key: &str, getter: F) -> &mut Self
    where
        F: Fn(Option<&Value>) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(key.to_string(), Arc::new(getter));
        self
    }

    /// Register a setter for `key`
    pub fn setter<F>(&mut self, key: &str, setter: F) -> &mut Self
    where
        F: Fn(&mut AttributeStore, Value) + Send + Sync + 'static,
    {
        self.setters.insert(key.to_string(), Arc::new(setter));
        self
    }

    pub fn has_getter(&self, key: &str) -> bool {
        self.getters.contains_key(key)
    }

    pub fn has_setter(&self, key: &str) -> bool {
        self.setters.contains_key(key)
    }

    fn get_mutator(&self, key: &str) -> Option<GetMutator> {
        self.getters.get(key).cloned()
    }

    fn set_mutator(&self, key: &str) -> Option<SetMutator> {
        self.setters.get(key).cloned()
    }
}

impl fmt::Debug for Mutators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut getters: Vec<_> = self.getters.keys().collect();
        let mut setters: Vec<_> = self.setters.keys().collect();
        getters.sort();
        setters.sort();
        f.debug_struct("Mutators")
            .field("getters", &getters)
            .field("setters", &setters)
            .finish()
    }
}

/// Target shape of a cast attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastType {
    Int,
    Float,
    String,
    Bool,
    Array,
    Json,
    Object,
    Collection,
    /// Unrecognised kind; values pass through untouched
    Unknown(String),
}

impl CastType {
    pub fn parse(kind: &str) -> Self {
        match kind.trim().to_lowercase().as_str() {
            "int" | "integer" => CastType::Int,
            "real" | "float" | "double" => CastType::Float,
            "string" => CastType::String,
            "bool" | "boolean" => CastType::Bool,
            "array" => CastType::Array,
            "json" => CastType::Json,
            "object" => CastType::Object,
            "collection" => CastType::Collection,
            other => CastType::Unknown(other.to_string()),
        }
    }

    /// Kinds stored as JSON text
    pub fn is_json(&self) -> bool {
        matches!(
            self,
            CastType::Array | CastType::Json | CastType::Object | CastType::Collection
        )
    }

    fn read(&self, key: &str, raw: &Value) -> ModelResult<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let value = match self {
            CastType::Int => match raw {
                Value::Number(n) => n
                    .as_i64()
                    .map(Value::from)
                    .or_else(|| n.as_f64().map(|f| Value::from(f.trunc() as i64)))
                    .unwrap_or(Value::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(0)),
                Value::Bool(b) => Value::from(i64::from(*b)),
                other => other.clone(),
            },
            CastType::Float => match raw {
                Value::Number(n) => n.as_f64().map(Value::from).unwrap_or(Value::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(0.0)),
                Value::Bool(b) => Value::from(if *b { 1.0 } else { 0.0 }),
                other => other.clone(),
            },
            CastType::String => match raw {
                Value::String(_) => raw.clone(),
                other => Value::String(other.to_string()),
            },
            CastType::Bool => Value::Bool(is_truthy(raw) && raw != &Value::from("0")),
            CastType::Array | CastType::Json | CastType::Object | CastType::Collection => {
                match raw {
                    Value::String(text) => serde_json::from_str(text).map_err(|e| {
                        ModelError::Serialization(format!(
                            "Failed to decode '{}' as JSON: {}",
                            key, e
                        ))
                    })?,
                    other => other.clone(),
                }
            }
            CastType::Unknown(kind) => {
                tracing::warn!("Unknown cast type '{}' for attribute '{}'", kind, key);
                raw.clone()
            }
        };

        Ok(value)
    }
}

/// Per-model attribute rules, shared by every entity of that model
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub(crate) fillable: Vec<String>,
    pub(crate) guarded: Vec<String>,
    pub(crate) casts: HashMap<String, CastType>,
    pub(crate) dates: HashSet<String>,
    pub(crate) date_format: String,
    pub(crate) mutators: Mutators,
}

impl AttributeSchema {
    /// Build the attribute rules declared by `M`
    pub fn for_model<M: Model>() -> Self {
        let mut dates: HashSet<String> = M::dates().iter().map(|d| d.to_string()).collect();
        if M::uses_timestamps() {
            dates.insert(CREATED_AT.to_string());
            dates.insert(UPDATED_AT.to_string());
        }

        let mut mutators = Mutators::new();
        M::mutators(&mut mutators);

        Self {
            fillable: M::fillable().iter().map(|k| k.to_string()).collect(),
            guarded: M::guarded().iter().map(|k| k.to_string()).collect(),
            casts: M::casts()
                .iter()
                .map(|(key, kind)| (key.to_string(), CastType::parse(kind)))
                .collect(),
            dates,
            date_format: M::date_format()
                .map(str::to_string)
                .unwrap_or_else(|| crate::config::global().date_format.clone()),
            mutators,
        }
    }

    pub fn is_date(&self, key: &str) -> bool {
        self.dates.contains(key)
    }

    pub fn cast(&self, key: &str) -> Option<&CastType> {
        self.casts.get(key)
    }

    pub fn is_json_castable(&self, key: &str) -> bool {
        self.casts.get(key).map(CastType::is_json).unwrap_or(false)
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// Mass-assignment check
    pub fn is_fillable(&self, key: &str) -> bool {
        if self.fillable.iter().any(|k| k == key) {
            return true;
        }

        if self.guarded.iter().any(|k| k != "*" && k == key) {
            return false;
        }

        self.fillable.is_empty() && !key.starts_with('_')
    }
}

/// Anything that can be turned into a set of attributes
pub trait IntoAttributes {
    fn into_attributes(self) -> Row;
}

impl IntoAttributes for Row {
    fn into_attributes(self) -> Row {
        self
    }
}

impl IntoAttributes for serde_json::Map<String, Value> {
    fn into_attributes(self) -> Row {
        self.into_iter().collect()
    }
}

/// Non-object JSON values carry no attributes
impl IntoAttributes for Value {
    fn into_attributes(self) -> Row {
        match self {
            Value::Object(map) => map.into_attributes(),
            _ => Row::new(),
        }
    }
}

impl<K: Into<String>> IntoAttributes for Vec<(K, Value)> {
    fn into_attributes(self) -> Row {
        self.into_iter().map(|(k, v)| (k.into(), v)).collect()
    }
}

/// Per-entity key/value store
#[derive(Debug, Clone)]
pub struct AttributeStore {
    schema: Arc<AttributeSchema>,
    attributes: Row,
    original: Row,
}

impl AttributeStore {
    pub fn new(schema: Arc<AttributeSchema>) -> Self {
        Self {
            schema,
            attributes: Row::new(),
            original: Row::new(),
        }
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Set an attribute through the mutator, date and cast pipelines
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> ModelResult<()> {
        let mut value = value.into();

        if let Some(setter) = self.schema.mutators.set_mutator(key) {
            setter(self, value);
            return Ok(());
        }

        if self.schema.is_date(key) && is_truthy(&value) {
            value = Value::String(self.from_date_time(&value)?);
        }

        if !value.is_null() && self.schema.is_json_castable(key) {
            value = Value::String(serde_json::to_string(&value)?);
        }

        self.attributes.insert(key.to_string(), value);
        Ok(())
    }

    /// Store a value as-is
    pub fn set_raw(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Replace every raw attribute, optionally syncing the original snapshot
    pub fn set_raw_attributes(&mut self, attributes: Row, sync: bool) {
        self.attributes = attributes;
        if sync {
            self.sync_original();
        }
    }

    /// Raw stored value
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Read an attribute through the mutator, cast and date pipelines
    pub fn get_value(&self, key: &str) -> ModelResult<Option<Value>> {
        let raw = self.attributes.get(key);

        if let Some(getter) = self.schema.mutators.get_mutator(key) {
            return Ok(Some(getter(raw)));
        }

        let Some(raw) = raw else {
            return Ok(None);
        };

        if let Some(cast) = self.schema.cast(key) {
            return cast.read(key, raw).map(Some);
        }

        if self.schema.is_date(key) && !raw.is_null() {
            return Ok(Some(match parse_date(raw, &self.schema.date_format) {
                Some(date) => Value::String(date.to_rfc3339()),
                None => {
                    tracing::warn!("Attribute '{}' is not a recognised date: {}", key, raw);
                    raw.clone()
                }
            }));
        }

        Ok(Some(raw.clone()))
    }

    /// Whether `key` resolves to an attribute rather than a relation
    pub fn has(&self, key: &str) -> bool {
        self.attributes.contains_key(key) || self.schema.mutators.has_getter(key)
    }

    /// A date attribute as a UTC timestamp
    pub fn date(&self, key: &str) -> ModelResult<Option<DateTime<Utc>>> {
        match self.attributes.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => parse_date(raw, &self.schema.date_format)
                .map(Some)
                .ok_or_else(|| {
                    ModelError::Validation(format!("Attribute '{}' is not a valid date", key))
                }),
        }
    }

    pub fn is_fillable(&self, key: &str) -> bool {
        self.schema.is_fillable(key)
    }

    /// Mass assign, skipping attributes that are not fillable.
    ///
    /// Either every fillable entry is stored or, on error, none are.
    pub fn fill(&mut self, attributes: impl IntoAttributes) -> ModelResult<()> {
        self.assign(attributes, true)
    }

    /// Mass assign without the fillable check; all-or-nothing like [`fill`](Self::fill)
    pub fn force_fill(&mut self, attributes: impl IntoAttributes) -> ModelResult<()> {
        self.assign(attributes, false)
    }

    fn assign(&mut self, attributes: impl IntoAttributes, check_fillable: bool) -> ModelResult<()> {
        let mut staged = self.clone();
        for (key, value) in attributes.into_attributes() {
            let key = remove_table_from_key(&key);
            if check_fillable && !staged.is_fillable(key) {
                tracing::trace!("Dropping non-fillable attribute '{}'", key);
                continue;
            }
            staged.set(key, value)?;
        }
        self.attributes = staged.attributes;
        Ok(())
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn original(&self) -> &Row {
        &self.original
    }

    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Attributes changed since the last sync
    pub fn dirty(&self) -> Row {
        self.attributes
            .iter()
            .filter(|(key, value)| self.original.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes
            .iter()
            .any(|(key, value)| self.original.get(key) != Some(value))
    }

    pub fn is_attribute_dirty(&self, key: &str) -> bool {
        self.attributes.get(key) != self.original.get(key)
    }

    /// Convert an incoming date to its storage string
    pub fn from_date_time(&self, value: &Value) -> ModelResult<String> {
        parse_date(value, &self.schema.date_format)
            .map(|date| date.format(&self.schema.date_format).to_string())
            .ok_or_else(|| ModelError::Validation(format!("Unable to parse date from {}", value)))
    }
}

/// Strip a qualifying table prefix: `posts.title` becomes `title`
pub fn remove_table_from_key(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parse RFC 3339, the storage format, `YYYY-MM-DD` or a unix timestamp
pub(crate) fn parse_date(value: &Value, format: &str) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(date) = DateTime::parse_from_rfc3339(text) {
                return Some(date.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return Some(Utc.from_utc_datetime(&naive));
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Profile;

    impl Model for Profile {
        fn table_name() -> &'static str {
            "profiles"
        }

        fn guarded() -> &'static [&'static str] {
            &["*", "is_admin"]
        }

        fn dates() -> &'static [&'static str] {
            &["born_on"]
        }

        fn casts() -> &'static [(&'static str, &'static str)] {
            &[
                ("meta", "json"),
                ("tags", "array"),
                ("age", "integer"),
                ("active", "boolean"),
                ("weird", "money"),
            ]
        }

        fn date_format() -> Option<&'static str> {
            Some("%Y-%m-%d %H:%M:%S")
        }

        fn mutators(mutators: &mut Mutators) {
            mutators
                .getter("display_name", |raw| {
                    Value::from(raw.and_then(Value::as_str).unwrap_or("anonymous").to_uppercase())
                })
                .setter("email", |store, value| {
                    let lowered = value.as_str().unwrap_or_default().to_lowercase();
                    store.set_raw("email", lowered);
                });
        }
    }

    fn store() -> AttributeStore {
        AttributeStore::new(Arc::new(AttributeSchema::for_model::<Profile>()))
    }

    #[test]
    fn test_fill_skips_internal_keys() {
        let mut attrs = store();
        attrs.fill(json!({"foo": 1, "_internal": 2})).unwrap();

        assert_eq!(attrs.get_raw("foo"), Some(&json!(1)));
        assert_eq!(attrs.get_raw("_internal"), None);
    }

    #[test]
    fn test_fill_strips_table_prefix_and_respects_guarded() {
        let mut attrs = store();
        attrs
            .fill(json!({"profiles.nickname": "neo", "is_admin": true}))
            .unwrap();

        assert_eq!(attrs.get_raw("nickname"), Some(&json!("neo")));
        assert!(!attrs.has("is_admin"));

        attrs.force_fill(json!({"is_admin": true})).unwrap();
        assert_eq!(attrs.get_raw("is_admin"), Some(&json!(true)));
    }

    #[test]
    fn test_json_cast_round_trip() {
        let mut attrs = store();
        attrs.set("meta", json!({"a": 1, "nested": [1, 2]})).unwrap();

        assert!(attrs.get_raw("meta").unwrap().is_string());
        assert_eq!(
            attrs.get_value("meta").unwrap(),
            Some(json!({"a": 1, "nested": [1, 2]}))
        );
    }

    #[test]
    fn test_scalar_casts() {
        let mut attrs = store();
        attrs.set_raw("age", "42");
        attrs.set_raw("active", 1);

        assert_eq!(attrs.get_value("age").unwrap(), Some(json!(42)));
        assert_eq!(attrs.get_value("active").unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_unknown_cast_passes_through() {
        let mut attrs = store();
        attrs.set("weird", json!({"x": 1})).unwrap();

        assert_eq!(attrs.get_raw("weird"), Some(&json!({"x": 1})));
        assert_eq!(attrs.get_value("weird").unwrap(), Some(json!({"x": 1})));
    }

    #[test]
    fn test_date_pipeline() {
        let mut attrs = store();
        attrs.set("born_on", "1999-12-31T23:00:00+00:00").unwrap();
        assert_eq!(attrs.get_raw("born_on"), Some(&json!("1999-12-31 23:00:00")));
        assert_eq!(
            attrs.get_value("born_on").unwrap(),
            Some(json!("1999-12-31T23:00:00+00:00"))
        );

        attrs.set("created_at", 0).unwrap();
        assert_eq!(attrs.get_raw("created_at"), Some(&json!(0)));

        attrs.set("updated_at", 86_400).unwrap();
        assert_eq!(attrs.get_raw("updated_at"), Some(&json!("1970-01-02 00:00:00")));

        assert!(attrs.set("born_on", "not a date").is_err());
    }

    #[test]
    fn test_mutators_take_precedence() {
        let mut attrs = store();
        attrs.set("email", "Neo@Matrix.IO").unwrap();
        assert_eq!(attrs.get_raw("email"), Some(&json!("neo@matrix.io")));

        assert!(attrs.has("display_name"));
        assert_eq!(
            attrs.get_value("display_name").unwrap(),
            Some(json!("ANONYMOUS"))
        );
    }

    #[test]
    fn test_dirty_tracking() {
        let mut attrs = store();
        attrs.set_raw_attributes(
            vec![("id", json!(1)), ("name", json!("a"))].into_attributes(),
            true,
        );
        assert!(!attrs.is_dirty());

        attrs.set("name", "b").unwrap();
        assert!(attrs.is_dirty());
        assert!(attrs.is_attribute_dirty("name"));
        assert_eq!(attrs.dirty().keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn test_failed_fill_leaves_attributes_untouched() {
        let mut store = store();
        store.force_fill(json!({"name": "before"})).unwrap();

        let err = store
            .force_fill(json!({"a_name": "kept", "born_on": "garbage", "z_bio": "lost"}))
            .unwrap_err();

        assert!(matches!(err, ModelError::Validation(_)));
        assert_eq!(store.attributes().len(), 1);
        assert_eq!(store.get_raw("name"), Some(&json!("before")));
    }
}

