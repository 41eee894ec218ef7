//! Typed error handling for the repository layer
//!
//! Every fallible operation returns [`RepositoryError`], a category enum whose
//! variants wrap a more specific error type. Callers can match on the category
//! they care about and ignore the rest.
//!
//! # Error Categories
//!
//! - [`ModelError`]: the configured backing table does not satisfy the record contract
//! - [`CriteriaError`]: an unrecognized criterion was offered to the criteria stack
//! - [`TransformError`]: a configured transformer is not registered or failed
//! - [`QueryError`]: a filter, sort or search could not be composed
//! - [`StorageError`]: the data store failed
//! - [`CacheError`]: the cache store failed
//! - [`ConfigError`]: configuration could not be parsed or is inconsistent
//!
//! "Not found" is never an error: lookups return `Option`.
//!
//! # Example
//!
//! ```rust,ignore
//! match repository.push_criteria_by_name("unknown", &json!({})) {
//!     Err(RepositoryError::Criteria(CriteriaError::InvalidCriteria { name })) => {
//!         eprintln!("no criterion registered as {}", name);
//!     }
//!     other => { /* ... */ }
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// The main error type for the repository layer
#[derive(Debug)]
pub enum RepositoryError {
    /// Backing model errors
    Model(ModelError),

    /// Criteria stack errors
    Criteria(CriteriaError),

    /// Result transformer errors
    Transform(TransformError),

    /// Query composition errors
    Query(QueryError),

    /// Data store errors
    Storage(StorageError),

    /// Cache store errors
    Cache(CacheError),

    /// Configuration errors
    Config(ConfigError),

    /// A dynamically dispatched operation matched nothing
    UnknownOperation { operation: String },

    /// A dynamically dispatched operation got parameters it cannot use
    InvalidParameters { operation: String, message: String },
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::Model(e) => write!(f, "{}", e),
            RepositoryError::Criteria(e) => write!(f, "{}", e),
            RepositoryError::Transform(e) => write!(f, "{}", e),
            RepositoryError::Query(e) => write!(f, "{}", e),
            RepositoryError::Storage(e) => write!(f, "{}", e),
            RepositoryError::Cache(e) => write!(f, "{}", e),
            RepositoryError::Config(e) => write!(f, "{}", e),
            RepositoryError::UnknownOperation { operation } => {
                write!(f, "Call to undefined operation '{}'", operation)
            }
            RepositoryError::InvalidParameters { operation, message } => {
                write!(f, "Invalid parameters for '{}': {}", operation, message)
            }
        }
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepositoryError::Model(e) => Some(e),
            RepositoryError::Criteria(e) => Some(e),
            RepositoryError::Transform(e) => Some(e),
            RepositoryError::Query(e) => Some(e),
            RepositoryError::Storage(e) => Some(e),
            RepositoryError::Cache(e) => Some(e),
            RepositoryError::Config(e) => Some(e),
            RepositoryError::UnknownOperation { .. } => None,
            RepositoryError::InvalidParameters { .. } => None,
        }
    }
}

impl RepositoryError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RepositoryError::Model(_) => "INVALID_MODEL",
            RepositoryError::Criteria(_) => "INVALID_CRITERIA",
            RepositoryError::Transform(e) => e.error_code(),
            RepositoryError::Query(e) => e.error_code(),
            RepositoryError::Storage(e) => e.error_code(),
            RepositoryError::Cache(_) => "CACHE_ERROR",
            RepositoryError::Config(_) => "CONFIG_ERROR",
            RepositoryError::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            RepositoryError::InvalidParameters { .. } => "INVALID_PARAMETERS",
        }
    }

    pub fn unknown_operation(operation: impl Into<String>) -> Self {
        RepositoryError::UnknownOperation {
            operation: operation.into(),
        }
    }

    pub fn invalid_parameters(operation: impl Into<String>, message: impl ToString) -> Self {
        RepositoryError::InvalidParameters {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

// =============================================================================
// Model Errors
// =============================================================================

/// Errors raised while resolving the repository's backing model
#[derive(Debug, Error)]
pub enum ModelError {
    /// The configured table is unknown to the data store, or does not expose
    /// its primary key as a column
    #[error("Repository model '{table}' is invalid: {reason}")]
    InvalidModel { table: String, reason: String },
}

impl From<ModelError> for RepositoryError {
    fn from(err: ModelError) -> Self {
        RepositoryError::Model(err)
    }
}

// =============================================================================
// Criteria Errors
// =============================================================================

/// Errors related to the criteria stack
#[derive(Debug, Error)]
pub enum CriteriaError {
    /// No criterion is registered under this name
    #[error("'{name}' is not a recognized criterion")]
    InvalidCriteria { name: String },

    /// The criterion was recognized but its arguments could not be used
    #[error("Invalid arguments for criterion '{name}': {message}")]
    InvalidArguments { name: String, message: String },
}

impl From<CriteriaError> for RepositoryError {
    fn from(err: CriteriaError) -> Self {
        RepositoryError::Criteria(err)
    }
}

// =============================================================================
// Transform Errors
// =============================================================================

/// Errors related to result transformers
#[derive(Debug, Error)]
pub enum TransformError {
    /// No transformer is registered under this name
    #[error("'{name}' is not a recognized transformer")]
    InvalidTransformer { name: String },

    /// A transformer rejected a record
    #[error("Transformer '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

impl TransformError {
    pub fn error_code(&self) -> &'static str {
        match self {
            TransformError::InvalidTransformer { .. } => "INVALID_TRANSFORMER",
            TransformError::Failed { .. } => "TRANSFORM_FAILED",
        }
    }
}

impl From<TransformError> for RepositoryError {
    fn from(err: TransformError) -> Self {
        RepositoryError::Transform(err)
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors raised while composing a query
#[derive(Debug, Error)]
pub enum QueryError {
    /// Table is not part of the schema
    #[error("Unknown table '{table}'")]
    UnknownTable { table: String },

    /// A relation hop does not resolve on the given table
    #[error("Call to undefined relationship '{relation}' on table '{table}'")]
    UnknownRelation { table: String, relation: String },

    /// Column is not declared on a table that declares its columns
    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Sort direction other than ASC/DESC
    #[error("Invalid sort direction '{direction}'")]
    InvalidDirection { direction: String },

    /// Comparison operator not understood
    #[error("Invalid operator '{operator}'")]
    InvalidOperator { operator: String },

    /// Search columns must belong to the base table
    #[error("Column '{column}' cannot be searched")]
    UnsupportedSearchColumn { column: String },
}

impl QueryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::UnknownTable { .. } => "UNKNOWN_TABLE",
            QueryError::UnknownRelation { .. } => "UNKNOWN_RELATION",
            QueryError::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            QueryError::InvalidDirection { .. } => "INVALID_DIRECTION",
            QueryError::InvalidOperator { .. } => "INVALID_OPERATOR",
            QueryError::UnsupportedSearchColumn { .. } => "UNSUPPORTED_SEARCH_COLUMN",
        }
    }
}

impl From<QueryError> for RepositoryError {
    fn from(err: QueryError) -> Self {
        RepositoryError::Query(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to data store backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// `update`/`delete` addressed a record that does not exist
    #[error("No record with key '{key}' in '{table}'")]
    RecordNotFound { table: String, key: String },

    /// Query execution error
    #[error("{backend} query error: {message}")]
    QueryFailed { backend: String, message: String },

    /// Lock poisoning or similar internal failure
    #[error("Storage backend '{backend}' is unavailable: {message}")]
    Unavailable { backend: String, message: String },
}

impl StorageError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            StorageError::QueryFailed { .. } => "STORAGE_QUERY_FAILED",
            StorageError::Unavailable { .. } => "STORAGE_UNAVAILABLE",
        }
    }
}

impl From<StorageError> for RepositoryError {
    fn from(err: StorageError) -> Self {
        RepositoryError::Storage(err)
    }
}

// =============================================================================
// Cache Errors
// =============================================================================

/// Errors related to the cache store
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached
    #[error("Cache backend '{backend}' is unavailable: {message}")]
    Unavailable { backend: String, message: String },

    /// A cached value could not be (de)serialized
    #[error("Cache serialization error for key '{key}': {message}")]
    Serialization { key: String, message: String },
}

impl From<CacheError> for RepositoryError {
    fn from(err: CacheError) -> Self {
        RepositoryError::Cache(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration
    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    /// Invalid value in configuration
    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },
}

impl From<ConfigError> for RepositoryError {
    fn from(err: ConfigError) -> Self {
        RepositoryError::Config(err)
    }
}
