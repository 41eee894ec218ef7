//! Deterministic cache keys
//!
//! A key is the table tag followed by the SHA-256 of a canonical JSON payload
//! `{caller, parameters, eager, criteria}`. Object keys are sorted at every
//! level, so parameter maps built in different orders hash identically.

use serde::Serialize;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

/// Repository state that changes what an operation returns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fingerprint {
    /// Eager-loaded relation names
    pub eager: Vec<String>,
    /// Criteria fingerprints in stack order
    pub criteria: Vec<Value>,
}

impl Fingerprint {
    pub fn new(eager: Vec<String>, criteria: Vec<Value>) -> Self {
        Self { eager, criteria }
    }

    /// Fingerprint with the given eager list and no criteria
    pub fn eager_only(eager: Vec<String>) -> Self {
        Self {
            eager,
            criteria: Vec::new(),
        }
    }
}

/// Build the cache key for an operation on the table tagged `tag`
pub fn cache_key(tag: &str, caller: &str, parameters: &Value, fingerprint: &Fingerprint) -> String {
    let mut payload = json!({
        "caller": caller,
        "parameters": parameters,
        "eager": fingerprint.eager,
    });
    if !fingerprint.criteria.is_empty() {
        payload["criteria"] = Value::Array(fingerprint.criteria.clone());
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical(&payload).to_string().as_bytes());
    format!("{}.{}", tag, hex::encode(hasher.finalize()))
}

/// Copy of `value` with object keys sorted at every level
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let fingerprint = Fingerprint::default();
        let a = cache_key("users", "all", &json!({"columns": ["*"]}), &fingerprint);
        let b = cache_key("users", "all", &json!({"columns": ["*"]}), &fingerprint);
        assert_eq!(a, b);
        assert!(a.starts_with("users."));
        assert_eq!(a.len(), "users.".len() + 64);
    }

    #[test]
    fn test_parameter_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("page".to_string(), json!(1));
        first.insert("per_page".to_string(), json!(15));
        let mut second = Map::new();
        second.insert("per_page".to_string(), json!(15));
        second.insert("page".to_string(), json!(1));

        let fingerprint = Fingerprint::default();
        assert_eq!(
            cache_key("users", "paginate", &Value::Object(first), &fingerprint),
            cache_key("users", "paginate", &Value::Object(second), &fingerprint)
        );
    }

    #[test]
    fn test_every_component_changes_the_key() {
        let base = cache_key("users", "all", &json!({}), &Fingerprint::default());

        assert_ne!(base, cache_key("posts", "all", &json!({}), &Fingerprint::default()));
        assert_ne!(base, cache_key("users", "find", &json!({}), &Fingerprint::default()));
        assert_ne!(base, cache_key("users", "all", &json!({"id": 1}), &Fingerprint::default()));
        assert_ne!(
            base,
            cache_key("users", "all", &json!({}), &Fingerprint::eager_only(vec!["posts".into()]))
        );
        assert_ne!(
            base,
            cache_key(
                "users",
                "all",
                &json!({}),
                &Fingerprint::new(vec![], vec![json!({"name": "where"})])
            )
        );
    }
}
