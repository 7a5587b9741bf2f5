//! ORM configuration
//!
//! Process-wide settings for the attribute pipeline and query logging,
//! loaded from environment variables or installed explicitly at startup.

use std::env;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::OnceCell;
use thiserror::Error;

/// Default storage format for date attributes
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static GLOBAL_CONFIG: OnceCell<OrmConfig> = OnceCell::new();

/// Configuration error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue { field: String, value: String, expected: String },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("Configuration has already been initialized")]
    AlreadyInitialized,
}

/// ORM configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OrmConfig {
    /// chrono format string used to store date attributes
    pub date_format: String,
    /// Log every executed statement at debug level
    pub log_queries: bool,
    /// Default page size for `ModelQuery::for_page`
    pub per_page: u32,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            log_queries: false,
            per_page: 15,
        }
    }
}

impl OrmConfig {
    /// Load configuration from `EXPRESSIVE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let date_format = lookup("EXPRESSIVE_DATE_FORMAT").unwrap_or(defaults.date_format);

        let log_queries = match lookup("EXPRESSIVE_LOG_QUERIES") {
            Some(value) => parse_bool("log_queries", &value)?,
            None => defaults.log_queries,
        };

        let per_page = match lookup("EXPRESSIVE_PER_PAGE") {
            Some(value) => value.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                field: "per_page".to_string(),
                value,
                expected: "positive integer".to_string(),
            })?,
            None => defaults.per_page,
        };

        Ok(OrmConfig {
            date_format,
            log_queries,
            per_page,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.date_format.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "date_format".to_string(),
                reason: "Date format cannot be empty".to_string(),
            });
        }

        // The format must be able to read back what it writes.
        let probe = NaiveDate::from_ymd_opt(2001, 2, 3)
            .and_then(|d| d.and_hms_opt(4, 5, 6))
            .ok_or_else(|| ConfigError::ValidationFailed {
                field: "date_format".to_string(),
                reason: "Unable to build probe timestamp".to_string(),
            })?;
        let rendered = probe.format(&self.date_format).to_string();
        if NaiveDateTime::parse_from_str(&rendered, &self.date_format).is_err() {
            return Err(ConfigError::ValidationFailed {
                field: "date_format".to_string(),
                reason: format!(
                    "'{}' does not round-trip a full timestamp",
                    self.date_format
                ),
            });
        }

        if self.per_page == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "per_page".to_string(),
                reason: "Page size cannot be 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Install the process-wide configuration
pub fn init(config: OrmConfig) -> Result<(), ConfigError> {
    config.validate()?;
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// Get the process-wide configuration, loading it from the environment on
/// first use
pub fn global() -> &'static OrmConfig {
    GLOBAL_CONFIG.get_or_init(|| {
        match OrmConfig::from_env().and_then(|config| config.validate().map(|_| config)) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Ignoring ORM environment configuration: {}", err);
                OrmConfig::default()
            }
        }
    })
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = OrmConfig::from_source(source(&[])).unwrap();
        assert_eq!(config, OrmConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_values_from_source() {
        let config = OrmConfig::from_source(source(&[
            ("EXPRESSIVE_DATE_FORMAT", "%Y/%m/%d %H:%M:%S"),
            ("EXPRESSIVE_LOG_QUERIES", "true"),
            ("EXPRESSIVE_PER_PAGE", "50"),
        ]))
        .unwrap();

        assert_eq!(config.date_format, "%Y/%m/%d %H:%M:%S");
        assert!(config.log_queries);
        assert_eq!(config.per_page, 50);
    }

    #[test]
    fn test_invalid_per_page() {
        let err = OrmConfig::from_source(source(&[("EXPRESSIVE_PER_PAGE", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "per_page"));
    }

    #[test]
    fn test_lossy_date_format_rejected() {
        let config = OrmConfig {
            date_format: "%Y".to_string(),
            ..OrmConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
