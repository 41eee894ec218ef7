//! Configuration loading and management

use crate::cache::DEFAULT_CACHE_LIFETIME;
use crate::core::error::ConfigError;
use crate::core::pagination::DEFAULT_PER_PAGE;
use crate::core::schema::{Pivot, RelationKind, Schema, TableSchema};
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

fn default_path() -> String {
    "/".to_string()
}

fn default_lifetime_minutes() -> u64 {
    DEFAULT_CACHE_LIFETIME.as_secs() / 60
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// Cache settings of a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether reads and writes go through the cache
    #[serde(default)]
    pub enabled: bool,

    /// Entry lifetime in minutes
    #[serde(default = "default_lifetime_minutes")]
    pub lifetime_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lifetime_minutes: default_lifetime_minutes(),
        }
    }
}

impl CacheConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_minutes * 60)
    }
}

/// A named criterion with its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaConfig {
    pub name: String,

    #[serde(default)]
    pub args: Value,
}

/// Configuration of one repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Table the repository serves
    pub table: String,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Default page size
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Base path of pagination links
    #[serde(default = "default_path")]
    pub path: String,

    /// Relations loaded with every read
    #[serde(default)]
    pub eager: Vec<String>,

    /// Criteria pushed before every operation
    #[serde(default)]
    pub criteria: Vec<CriteriaConfig>,

    /// Registered transformer applied to read results
    #[serde(default)]
    pub transformer: Option<String>,

    /// Searchable columns with their relevance weight
    #[serde(default)]
    pub searchable: IndexMap<String, f64>,

    /// Minimum search score; defaults to a quarter of the summed weights
    #[serde(default)]
    pub search_threshold: Option<f64>,
}

impl RepositoryConfig {
    /// Configuration with defaults for `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            cache: CacheConfig::default(),
            per_page: default_per_page(),
            path: default_path(),
            eager: Vec::new(),
            criteria: Vec::new(),
            transformer: None,
            searchable: IndexMap::new(),
            search_threshold: None,
        }
    }

    /// Enable caching with the given lifetime
    pub fn cached(mut self, lifetime_minutes: u64) -> Self {
        self.cache = CacheConfig {
            enabled: true,
            lifetime_minutes,
        };
        self
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no repository can run with
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "table".to_string(),
                value: self.table.clone(),
                message: "table name must not be empty".to_string(),
            });
        }
        if self.per_page == 0 {
            return Err(ConfigError::InvalidValue {
                field: "per_page".to_string(),
                value: "0".to_string(),
                message: "page size must be at least 1".to_string(),
            });
        }
        if self.cache.enabled && self.cache.lifetime_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.lifetime_minutes".to_string(),
                value: "0".to_string(),
                message: "cache lifetime must be at least one minute".to_string(),
            });
        }
        Ok(())
    }
}

/// A relation as declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    pub kind: RelationKind,
    pub related: String,
    pub foreign_key: String,
    pub local_key: String,
    #[serde(default)]
    pub pivot: Option<Pivot>,
}

/// A table as declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,

    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

/// Tables and relations known to the data store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub tables: Vec<TableConfig>,
}

impl SchemaConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Build the schema, checking that every relation points at a declared table
    pub fn to_schema(&self) -> std::result::Result<Schema, ConfigError> {
        let mut schema = Schema::new();
        for table in &self.tables {
            let mut table_schema =
                TableSchema::new(table.name.as_str(), table.primary_key.as_str())
                    .columns(table.columns.iter().cloned());

            for relation in &table.relations {
                if !self.tables.iter().any(|t| t.name == relation.related) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("tables.{}.relations.{}", table.name, relation.name),
                        value: relation.related.clone(),
                        message: "relation points at an undeclared table".to_string(),
                    });
                }
                table_schema = match (relation.kind, &relation.pivot) {
                    (RelationKind::HasOne, _) => table_schema.has_one(
                        &relation.name,
                        &relation.related,
                        &relation.foreign_key,
                        &relation.local_key,
                    ),
                    (RelationKind::HasMany, _) => table_schema.has_many(
                        &relation.name,
                        &relation.related,
                        &relation.foreign_key,
                        &relation.local_key,
                    ),
                    (RelationKind::BelongsTo, _) => table_schema.belongs_to(
                        &relation.name,
                        &relation.related,
                        &relation.foreign_key,
                        &relation.local_key,
                    ),
                    (RelationKind::BelongsToMany, Some(pivot)) => table_schema.belongs_to_many(
                        &relation.name,
                        &relation.related,
                        pivot.clone(),
                        &relation.local_key,
                    ),
                    (RelationKind::BelongsToMany, None) => {
                        return Err(ConfigError::InvalidValue {
                            field: format!("tables.{}.relations.{}.pivot", table.name, relation.name),
                            value: String::new(),
                            message: "belongs_to_many relations need a pivot".to_string(),
                        });
                    }
                };
            }
            schema.add_table(table_schema);
        }
        Ok(schema)
    }
}
