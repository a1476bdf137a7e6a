use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form key/value bag attached to reservations and ledger entries.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Key under which the downstream document-exchange transaction id is stored.
pub const EXTERNAL_ID_KEY: &str = "external_id";
pub const FAILURE_REASON_KEY: &str = "failure_reason";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Object(Metadata),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

/// Shallow merge: top-level keys in `patch` replace those in `target`.
pub fn merge(target: &mut Metadata, patch: Metadata) {
    target.extend(patch);
}

/// Builds a metadata map from `(key, value)` pairs.
pub fn metadata<K, V, I>(pairs: I) -> Metadata
where
    K: Into<String>,
    V: Into<MetadataValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
