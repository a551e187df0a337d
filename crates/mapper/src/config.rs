//! Mapper configuration
//!
//! Pagination bounds, the deadlock retry cap and the default date storage
//! representation. Passed explicitly to `Mapper::new`; there is no global.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::model::DateStorage;

/// Default values for mapper configuration
pub struct MapperDefaults;

impl MapperDefaults {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;
    pub const MAX_CONFLICT_RETRIES: u32 = 3;
}

/// Runtime configuration shared by every model mapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Limit applied when a collection query asks for none
    pub default_limit: i64,
    /// Upper bound for any requested limit
    pub max_limit: i64,
    /// Additional attempts after a transient conflict
    pub max_conflict_retries: u32,
    /// Storage representation for date attributes that declare none
    pub date_storage: DateStorage,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            default_limit: MapperDefaults::DEFAULT_LIMIT,
            max_limit: MapperDefaults::MAX_LIMIT,
            max_conflict_retries: MapperDefaults::MAX_CONFLICT_RETRIES,
            date_storage: DateStorage::Epoch,
        }
    }
}

impl MapperConfig {
    /// Set the maximum limit
    pub fn with_max_limit(mut self, max_limit: i64) -> Self {
        self.max_limit = max_limit;
        self
    }

    /// Set the default limit
    pub fn with_default_limit(mut self, default_limit: i64) -> Self {
        self.default_limit = default_limit;
        self
    }

    /// Set the retry cap for transient conflicts
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Set the default date storage representation
    pub fn with_date_storage(mut self, storage: DateStorage) -> Self {
        self.date_storage = storage;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.max_limit <= 0 {
            return Err(ModelError::Configuration(
                "Maximum limit must be greater than 0".to_string(),
            ));
        }

        if self.default_limit <= 0 {
            return Err(ModelError::Configuration(
                "Default limit must be greater than 0".to_string(),
            ));
        }

        if self.default_limit > self.max_limit {
            return Err(ModelError::Configuration(format!(
                "Default limit {} exceeds maximum limit {}",
                self.default_limit, self.max_limit
            )));
        }

        Ok(())
    }

    /// Load configuration from `MAPPER_*` environment variables
    pub fn from_env() -> ModelResult<Self> {
        let config = Self {
            default_limit: env_or("MAPPER_DEFAULT_LIMIT", MapperDefaults::DEFAULT_LIMIT)?,
            max_limit: env_or("MAPPER_MAX_LIMIT", MapperDefaults::MAX_LIMIT)?,
            max_conflict_retries: env_or(
                "MAPPER_CONFLICT_RETRIES",
                MapperDefaults::MAX_CONFLICT_RETRIES,
            )?,
            date_storage: env_or("MAPPER_DATE_STORAGE", DateStorage::Epoch)?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> ModelResult<T> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            ModelError::Configuration(format!("Invalid value '{}' for {}", raw, key))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MapperConfig::default();
        assert_eq!(config.default_limit, 50);
        assert_eq!(config.max_limit, 200);
        assert_eq!(config.max_conflict_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_limit_above_max_is_rejected() {
        let config = MapperConfig::default().with_default_limit(500);
        assert!(matches!(config.validate(), Err(ModelError::Configuration(_))));
    }

    #[test]
    fn test_from_env_reads_overrides() {
        env::set_var("MAPPER_MAX_LIMIT", "75");
        env::set_var("MAPPER_DATE_STORAGE", "timestamp");
        let config = MapperConfig::from_env().unwrap();
        env::remove_var("MAPPER_MAX_LIMIT");
        env::remove_var("MAPPER_DATE_STORAGE");

        assert_eq!(config.max_limit, 75);
        assert_eq!(config.date_storage, DateStorage::Timestamp);
    }
}
