//! Core module containing the record, schema, field and error types shared by
//! every layer

pub mod error;
pub mod field;
pub mod pagination;
pub mod record;
pub mod schema;

pub use error::{RepositoryError, Result};
pub use field::FieldValue;
pub use pagination::Paginator;
pub use record::{Attributes, Record, attributes};
pub use schema::{Pivot, Relation, RelationKind, Schema, TableSchema};
