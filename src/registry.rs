//! Global attribute registry: the namespaced schema every collector writes into.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use crate::domain::{normalize_namespace, AttributeCategory, AttributeKey};
use crate::error::SchemaError;

/// One attribute a collector says it can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDeclaration {
    pub local_name: String,
    pub category: AttributeCategory,
}

impl AttributeDeclaration {
    pub fn new(local_name: impl Into<String>, category: AttributeCategory) -> Self {
        Self {
            local_name: local_name.into(),
            category,
        }
    }
}

/// Mapping from namespaced key to category.
///
/// Filled during configuration, then sealed. Once sealed it is only ever read,
/// and is shared behind an `Arc` with the store and every collector.
#[derive(Debug, Default)]
pub struct GlobalAttributeRegistry {
    entries: HashMap<AttributeKey, AttributeCategory>,
    namespaces: HashSet<String>,
    sealed: bool,
}

impl GlobalAttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every declaration of one collector under its namespace.
    ///
    /// All-or-nothing: on error nothing from this call is added.
    pub fn register(
        &mut self,
        namespace: &str,
        declarations: &[AttributeDeclaration],
    ) -> Result<(), SchemaError> {
        if self.sealed {
            return Err(SchemaError::RegistryClosed);
        }
        let namespace = normalize_namespace(namespace)?;
        if self.namespaces.contains(&namespace) {
            return Err(SchemaError::DuplicateNamespace(namespace));
        }

        let mut staged = Vec::with_capacity(declarations.len());
        let mut seen = HashSet::new();
        for decl in declarations {
            let key = AttributeKey::new(&namespace, &decl.local_name)?;
            if !seen.insert(key.clone()) {
                return Err(SchemaError::DuplicateLocalName {
                    namespace,
                    local_name: decl.local_name.clone(),
                });
            }
            staged.push((key, decl.category));
        }

        debug!(namespace = %namespace, attributes = staged.len(), "registered collector schema");
        self.entries.extend(staged);
        self.namespaces.insert(namespace);
        Ok(())
    }

    /// Closes the registry to further declarations.
    pub fn seal(&mut self) {
        if !self.sealed {
            self.sealed = true;
            info!(
                namespaces = self.namespaces.len(),
                attributes = self.entries.len(),
                "attribute registry sealed"
            );
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn resolve(&self, key: &AttributeKey) -> Option<AttributeCategory> {
        self.entries.get(key).copied()
    }

    pub fn contains_namespace(&self, namespace: &str) -> bool {
        normalize_namespace(namespace)
            .map(|ns| self.namespaces.contains(&ns))
            .unwrap_or(false)
    }

    /// Sorted list of registered namespaces.
    pub fn namespaces(&self) -> Vec<String> {
        let mut out: Vec<String> = self.namespaces.iter().cloned().collect();
        out.sort();
        out
    }

    /// All keys that resolve to `category`, sorted.
    pub fn keys_for(&self, category: AttributeCategory) -> Vec<AttributeKey> {
        let mut keys: Vec<AttributeKey> = self
            .entries
            .iter()
            .filter(|(_, c)| **c == category)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// The full schema, ordered by key.
    pub fn declarations(&self) -> BTreeMap<AttributeKey, AttributeCategory> {
        self.entries.iter().map(|(k, c)| (k.clone(), *c)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
