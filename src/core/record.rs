//! Records: the opaque rows a data store hands back

use crate::core::field::FieldValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Column name -> value, in column order
pub type Attributes = IndexMap<String, FieldValue>;

/// Build an [`Attributes`] map from `(column, value)` pairs
///
/// ```rust,ignore
/// let attrs = attributes([("email", "a@b.c".into()), ("active", true.into())]);
/// ```
pub fn attributes<K, I>(pairs: I) -> Attributes
where
    K: Into<String>,
    I: IntoIterator<Item = (K, FieldValue)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// A row owned by the data store, identified by its primary key.
///
/// Eager-loaded relations are attached under `relations`, keyed by relation
/// name. To-one relations hold zero or one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    table: String,
    key_name: String,
    attributes: Attributes,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    relations: IndexMap<String, Vec<Record>>,
}

impl Record {
    /// Create an empty record for `table` whose primary key column is `key_name`
    pub fn new(table: impl Into<String>, key_name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_name: key_name.into(),
            attributes: Attributes::new(),
            relations: IndexMap::new(),
        }
    }

    /// Create a record from a full set of attributes
    pub fn from_attributes(
        table: impl Into<String>,
        key_name: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            attributes,
            ..Self::new(table, key_name)
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Primary key value (`Null` until the store assigns one)
    pub fn key(&self) -> FieldValue {
        self.get(&self.key_name).cloned().unwrap_or(FieldValue::Null)
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.attributes.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.attributes.insert(column.into(), value.into());
    }

    /// Builder-style [`Record::set`]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn remove(&mut self, column: &str) -> Option<FieldValue> {
        self.attributes.shift_remove(column)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Overwrite the given attributes, returning whether any value changed
    pub fn fill(&mut self, attributes: &Attributes) -> bool {
        let mut dirty = false;
        for (column, value) in attributes {
            if self.attributes.get(column) != Some(value) {
                self.attributes.insert(column.clone(), value.clone());
                dirty = true;
            }
        }
        dirty
    }

    /// Keep only `columns` (`*` keeps everything). Relations are preserved.
    pub fn only(&self, columns: &[&str]) -> Record {
        if is_wildcard(columns) {
            return self.clone();
        }

        let attributes = self
            .attributes
            .iter()
            .filter(|(column, _)| {
                columns
                    .iter()
                    .any(|wanted| unqualified(wanted) == column.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Record {
            table: self.table.clone(),
            key_name: self.key_name.clone(),
            attributes,
            relations: self.relations.clone(),
        }
    }

    pub fn relation(&self, name: &str) -> Option<&[Record]> {
        self.relations.get(name).map(Vec::as_slice)
    }

    pub fn relations(&self) -> &IndexMap<String, Vec<Record>> {
        &self.relations
    }

    pub fn set_relation(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.relations.insert(name.into(), records);
    }
}

/// `true` when the column list selects every column
pub fn is_wildcard(columns: &[&str]) -> bool {
    columns.is_empty() || columns.iter().any(|c| *c == "*" || c.ends_with(".*"))
}

fn unqualified(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Record {
        Record::new("users", "id")
            .with("id", 1)
            .with("email", "a@example.com")
            .with("password", "secret")
    }

    #[test]
    fn test_key() {
        assert_eq!(user().key(), FieldValue::Integer(1));
        assert_eq!(Record::new("users", "id").key(), FieldValue::Null);
    }

    #[test]
    fn test_only_projects_columns() {
        let projected = user().only(&["users.email"]);
        assert_eq!(projected.attributes().len(), 1);
        assert_eq!(projected.get("email"), Some(&FieldValue::from("a@example.com")));

        assert_eq!(user().only(&["*"]), user());
        assert_eq!(user().only(&[]), user());
    }

    #[test]
    fn test_fill_reports_dirty() {
        let mut record = user();
        assert!(!record.fill(&attributes([("password", "secret".into())])));
        assert!(record.fill(&attributes([("password", "terces".into())])));
        assert_eq!(record.get("password"), Some(&FieldValue::from("terces")));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut record = user();
        record.set_relation("passwords", vec![Record::new("password_resets", "id").with("id", 9)]);
        let json = serde_json::to_value(&record).unwrap();
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
