//! Query Builder Module - structured statements and the model-level adapter

pub mod builder;
pub mod dml;
pub mod grammar;
pub mod model_query;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

pub use builder::QueryBuilder;
pub use grammar::Grammar;
pub use model_query::ModelQuery;
pub use types::{
    JoinClause, JoinType, OrderDirection, QueryOperator, QueryType, SetClause, WhereBoolean,
    WhereCondition, WhereKind,
};
