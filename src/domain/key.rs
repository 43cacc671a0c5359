use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// A collector-local attribute name qualified by the collector's namespace.
///
/// Rendered as `<namespace>_<local_name>`. Namespaces are alphanumeric, so the
/// first underscore always separates the two halves and local names may contain
/// further underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeKey {
    namespace: String,
    local_name: String,
}

impl AttributeKey {
    pub fn new(namespace: &str, local_name: &str) -> Result<Self, SchemaError> {
        let namespace = normalize_namespace(namespace)?;
        let local_name = local_name.trim();
        if !is_valid_local_name(local_name) {
            return Err(SchemaError::InvalidLocalName {
                namespace,
                local_name: local_name.to_string(),
            });
        }
        Ok(Self {
            namespace,
            local_name: local_name.to_string(),
        })
    }

    /// Builds a key without validation, for reporting writes that were never valid.
    pub(crate) fn unchecked(namespace: &str, local_name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            local_name: local_name.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.namespace, self.local_name)
    }
}

impl FromStr for AttributeKey {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, local_name) = s
            .split_once('_')
            .ok_or_else(|| SchemaError::InvalidAttributeKey(s.to_string()))?;
        AttributeKey::new(namespace, local_name)
            .map_err(|_| SchemaError::InvalidAttributeKey(s.to_string()))
    }
}

impl TryFrom<String> for AttributeKey {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AttributeKey> for String {
    fn from(key: AttributeKey) -> Self {
        key.to_string()
    }
}

/// Trims and lowercases a namespace, rejecting anything that is not ASCII alphanumeric.
pub fn normalize_namespace(namespace: &str) -> Result<String, SchemaError> {
    let trimmed = namespace.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SchemaError::InvalidNamespace(namespace.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

fn is_valid_local_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
