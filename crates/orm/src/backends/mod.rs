//! Database Backend Abstractions
//!
//! The [`Connection`] seam plus the PostgreSQL adapter and a scripted mock
//! connection for tests.

pub mod core;
pub mod mock;
pub mod postgres;

pub use self::core::{Connection, Row};
pub use self::mock::{rows_from_json, ExecutedQuery, MockConnection};
pub use self::postgres::PostgresConnection;
