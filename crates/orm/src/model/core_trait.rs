//! Core Model Trait - Base definition for database entities
//!
//! A `Model` is a zero-sized marker type describing one table: its metadata,
//! attribute rules and the relations it declares. Instances of a model are
//! [`Entity`](crate::model::Entity) values built from the cached schema.

use convert_case::{Case, Casing};

use crate::model::attributes::Mutators;
use crate::relationships::{Relation, RelationFactory};

/// Core trait for database models
pub trait Model: Send + Sync + 'static {
    /// Table name for this model
    fn table_name() -> &'static str;

    /// Short class name, used for default foreign keys and error messages
    fn class_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Primary key field name
    fn primary_key_name() -> &'static str {
        "id"
    }

    /// Whether the primary key is generated by the database
    fn incrementing() -> bool {
        true
    }

    /// Check if this model uses timestamps (created_at, updated_at)
    fn uses_timestamps() -> bool {
        true
    }

    /// Attributes that may be mass assigned
    fn fillable() -> &'static [&'static str] {
        &[]
    }

    /// Attributes that may never be mass assigned
    fn guarded() -> &'static [&'static str] {
        &["*"]
    }

    /// Attributes left out of serialized output
    fn hidden() -> &'static [&'static str] {
        &[]
    }

    /// When non-empty, the only attributes included in serialized output
    fn visible() -> &'static [&'static str] {
        &[]
    }

    /// Attributes handled by the date pipeline
    fn dates() -> &'static [&'static str] {
        &[]
    }

    /// Attribute casts as `(attribute, kind)` pairs
    fn casts() -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Storage format for dates; `None` uses the global configuration
    fn date_format() -> Option<&'static str> {
        None
    }

    /// Page size for `for_page`
    fn per_page() -> u32 {
        crate::config::global().per_page
    }

    /// Relations eager loaded on every query
    fn eager_loads() -> &'static [&'static str] {
        &[]
    }

    /// Register attribute getters and setters
    fn mutators(_mutators: &mut Mutators) {}

    /// Resolve a relation by name
    ///
    /// ```ignore
    /// fn relation(name: &str, factory: &RelationFactory<'_>) -> Option<Relation> {
    ///     match name {
    ///         "posts" => Some(factory.has_many::<Post>(None, None)),
    ///         _ => None,
    ///     }
    /// }
    /// ```
    fn relation(_name: &str, _factory: &RelationFactory<'_>) -> Option<Relation> {
        None
    }

    /// Default foreign key other tables use to point at this model
    fn foreign_key() -> String {
        format!("{}_id", Self::class_name().to_case(Case::Snake))
    }
}
