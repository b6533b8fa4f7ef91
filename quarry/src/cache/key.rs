//! Deterministic cache keys

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Cache key for one source and parameter bag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Full key, `api:<source_id>:<params_hash>`
    pub key: String,
    pub source_id: String,
    pub params_hash: String,
}

impl CacheKey {
    /// Key for `source_id` called with `params`.
    ///
    /// Object keys are sorted recursively before hashing, so bags that differ
    /// only in key order share an entry.
    pub fn new(source_id: &str, params: &Value) -> Self {
        let canonical = canonical_json(params);
        let params_hash = hex_hash(&canonical);
        Self {
            key: format!("api:{}:{}", source_id, params_hash),
            source_id: source_id.to_string(),
            params_hash,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                let mut out = serde_json::Map::new();
                for (k, v) in ordered {
                    out.insert(k.clone(), v);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

fn hex_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
