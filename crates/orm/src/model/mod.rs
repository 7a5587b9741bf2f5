//! Model System - model declarations and the entities built from them
//!
//! - `core_trait`: the `Model` trait a table declaration implements
//! - `schema`: per-model metadata, built once and cached
//! - `attributes`: attribute store with cast, mutator and date pipelines
//! - `entity`: live records and persistence
//! - `collection`: ordered result sets
//! - `lifecycle`: lifecycle events and observers
//! - `query_methods`: model-level query entry points

pub mod attributes;
pub mod collection;
pub mod core_trait;
pub mod entity;
pub mod lifecycle;
pub mod query_methods;
pub mod schema;

pub use attributes::{AttributeSchema, AttributeStore, CastType, IntoAttributes, Mutators};
pub use collection::Collection;
pub use core_trait::Model;
pub use entity::{Entity, Property};
pub use lifecycle::{clear_observers, observe, EventDispatcher, LifecycleEvent, ModelObserver};
pub use query_methods::QueryMethods;
pub use schema::Schema;
