//! # expressive-orm
//!
//! Active-record style ORM: models declare their table, attribute rules and
//! relations; entities carry typed attributes through cast, mutator and date
//! pipelines; relations are resolved lazily or eager loaded in batches with
//! one query per relation path.
//!
//! Statements are built as structured [`QueryBuilder`] values and executed
//! through a [`Connection`], either the sqlx-backed [`PostgresConnection`] or
//! the scripted [`MockConnection`] used in tests.

pub mod backends;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod relationships;

pub use backends::{Connection, MockConnection, PostgresConnection, Row};
pub use config::OrmConfig;
pub use error::*;
pub use model::*;
pub use query::{Grammar, ModelQuery, QueryBuilder, QueryType};
pub use relationships::{
    EagerConstraint, EagerLoads, IntoEagerLoads, Relation, RelationFactory, RelationKind,
    RelationValue,
};
