//! Error types for the ORM system
//!
//! Provides error handling for query execution, attribute casting,
//! relationship resolution and configuration.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(String),
    /// Model not found in database
    #[error("Record not found in table '{0}'")]
    NotFound(String),
    /// Attribute value could not be accepted
    #[error("Validation error: {0}")]
    Validation(String),
    /// Primary key is missing or invalid
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,
    /// Relationship resolution failed
    #[error("Relationship error: {0}")]
    Relationship(String),
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Entity has no connection to run queries on
    #[error("Connection error: {0}")]
    Connection(String),
    /// Query building error
    #[error("Query error: {0}")]
    Query(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<ConfigError> for ModelError {
    fn from(err: ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

/// Error types for relationship operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelationshipError {
    /// The model does not declare a relation with this name
    #[error("Call to undefined relationship '{relation}' on model '{model}'")]
    NotFound { relation: String, model: String },
    /// The relation cannot perform the requested operation
    #[error("Operation '{operation}' is not supported by {kind} relations")]
    Unsupported { operation: String, kind: String },
    /// Invalid relationship configuration
    #[error("Invalid relationship configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<RelationshipError> for ModelError {
    fn from(err: RelationshipError) -> Self {
        ModelError::Relationship(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_error_conversion() {
        let err: ModelError = RelationshipError::NotFound {
            relation: "posts".to_string(),
            model: "User".to_string(),
        }
        .into();

        assert_eq!(
            err.to_string(),
            "Relationship error: Call to undefined relationship 'posts' on model 'User'"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ModelError = parse_err.into();

        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
