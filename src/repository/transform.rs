//! Result transformers applied to every read

use crate::core::error::{Result, TransformError};
use crate::core::pagination::Paginator;
use crate::core::record::Record;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reshapes records on their way out of the repository.
///
/// Transformers run after the cache, so cached entries always hold the
/// untransformed records.
pub trait Transformer: Send + Sync {
    fn transform(&self, record: Record) -> Result<Record>;
}

impl<F> Transformer for F
where
    F: Fn(Record) -> Result<Record> + Send + Sync,
{
    fn transform(&self, record: Record) -> Result<Record> {
        self(record)
    }
}

/// Keeps only the listed columns of every record
#[derive(Debug, Clone)]
pub struct OnlyColumns {
    columns: Vec<String>,
}

impl OnlyColumns {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transformer for OnlyColumns {
    fn transform(&self, record: Record) -> Result<Record> {
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        Ok(record.only(&columns))
    }
}

/// Drops the listed columns from every record
#[derive(Debug, Clone)]
pub struct HideColumns {
    columns: Vec<String>,
}

impl HideColumns {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transformer for HideColumns {
    fn transform(&self, mut record: Record) -> Result<Record> {
        for column in &self.columns {
            record.remove(column);
        }
        Ok(record)
    }
}

/// A transformer together with the name it was registered under
#[derive(Clone)]
pub struct NamedTransformer {
    pub name: String,
    pub transformer: Arc<dyn Transformer>,
}

impl fmt::Debug for NamedTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedTransformer").field("name", &self.name).finish()
    }
}

impl NamedTransformer {
    pub fn apply(&self, record: Record) -> Result<Record> {
        self.transformer.transform(record)
    }

    pub fn apply_all(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }
        tracing::debug!(transformer = %self.name, records = records.len(), "transforming");
        records.into_iter().map(|record| self.apply(record)).collect()
    }

    pub fn apply_page(&self, page: Paginator<Record>) -> Result<Paginator<Record>> {
        if page.items.is_empty() {
            return Ok(page);
        }
        page.try_map(|record| self.apply(record))
    }
}

/// Transformers selectable by name
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn Transformer>>,
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.transformers.keys().collect();
        names.sort();
        f.debug_struct("TransformerRegistry").field("names", &names).finish()
    }
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, transformer: impl Transformer + 'static) {
        self.transformers.insert(name.into(), Arc::new(transformer));
    }

    /// Builder-style [`TransformerRegistry::register`]
    pub fn with(mut self, name: impl Into<String>, transformer: impl Transformer + 'static) -> Self {
        self.register(name, transformer);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transformers.contains_key(name)
    }

    /// Look a transformer up, failing with `InvalidTransformer`
    pub fn resolve(&self, name: &str) -> Result<NamedTransformer> {
        match self.transformers.get(name) {
            Some(transformer) => Ok(NamedTransformer {
                name: name.to_string(),
                transformer: transformer.clone(),
            }),
            None => {
                tracing::warn!(transformer = %name, "rejected unknown transformer");
                Err(TransformError::InvalidTransformer {
                    name: name.to_string(),
                }
                .into())
            }
        }
    }
}
