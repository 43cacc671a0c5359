//! Per-individual attribute storage.
//!
//! The set of individuals is fixed once the primary collector has run; only
//! attribute content changes afterwards. Each individual carries its own lock,
//! so collectors writing to different people never contend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::domain::reliability::is_in_range;
use crate::domain::{
    AttributeCategory, AttributeKey, AttributeObservation, AttributeValue, Individual,
    IndividualId, ReliabilityValue,
};
use crate::error::StoreError;
use crate::registry::GlobalAttributeRegistry;

type AttributeMap = BTreeMap<AttributeKey, AttributeObservation>;

struct Entry {
    /// Identity fields only; `attributes` is always empty here.
    identity: Individual,
    attributes: Mutex<AttributeMap>,
}

impl Entry {
    fn lock(&self) -> MutexGuard<'_, AttributeMap> {
        // Writers hold the lock for a single map operation, so a poisoned map is still consistent.
        self.attributes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct AttributeStore {
    registry: Arc<GlobalAttributeRegistry>,
    order: Vec<IndividualId>,
    entries: HashMap<IndividualId, Entry>,
}

impl AttributeStore {
    pub fn new(registry: Arc<GlobalAttributeRegistry>) -> Self {
        Self {
            registry,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Adds an individual with an empty attribute set.
    ///
    /// Only possible while the store is exclusively owned, i.e. before it is
    /// shared with secondary collectors. Attributes carried on `individual` are
    /// not copied; write them through [`AttributeStore::put`] so they are validated.
    /// An individual without an id is given a fresh one.
    pub fn insert_individual(&mut self, mut individual: Individual) -> Result<IndividualId, StoreError> {
        let id = *individual.id.get_or_insert_with(IndividualId::new);
        if self.entries.contains_key(&id) {
            return Err(StoreError::DuplicateIndividual(id));
        }
        individual.attributes.clear();
        self.entries.insert(
            id,
            Entry {
                identity: individual,
                attributes: Mutex::new(AttributeMap::new()),
            },
        );
        self.order.push(id);
        Ok(id)
    }

    /// Validates and stores one observation, replacing any previous value under `key`.
    pub fn put(
        &self,
        id: &IndividualId,
        key: &AttributeKey,
        value: AttributeValue,
        reliability: ReliabilityValue,
    ) -> Result<(), StoreError> {
        let category = self
            .registry
            .resolve(key)
            .ok_or_else(|| StoreError::UnknownAttribute(key.clone()))?;
        if !category.accepts(&value) {
            return Err(StoreError::TypeMismatch {
                key: key.clone(),
                category,
                found: value.kind(),
            });
        }
        if !is_in_range(reliability.get()) {
            return Err(StoreError::ReliabilityOutOfRange(reliability.get()));
        }
        let entry = self
            .entries
            .get(id)
            .ok_or(StoreError::UnknownIndividual(*id))?;

        let replaced = entry
            .lock()
            .insert(key.clone(), AttributeObservation::new(value, reliability));
        if replaced.is_some() {
            debug!(individual = %id, key = %key, "replaced observation");
        }
        Ok(())
    }

    pub fn get(&self, id: &IndividualId, key: &AttributeKey) -> Option<AttributeObservation> {
        self.entries.get(id)?.lock().get(key).cloned()
    }

    /// Every observation for `id` whose key resolves to `category`, in key order.
    pub fn category_values(&self, id: &IndividualId, category: AttributeCategory) -> Vec<AttributeObservation> {
        let Some(entry) = self.entries.get(id) else {
            return Vec::new();
        };
        entry
            .lock()
            .iter()
            .filter(|(key, _)| self.registry.resolve(key) == Some(category))
            .map(|(_, obs)| obs.clone())
            .collect()
    }

    /// A point-in-time copy of one individual, identity and attributes.
    pub fn snapshot(&self, id: &IndividualId) -> Option<Individual> {
        let entry = self.entries.get(id)?;
        let mut individual = entry.identity.clone();
        individual.attributes = entry.lock().clone();
        Some(individual)
    }

    /// Snapshots of every individual, in the order they were added.
    pub fn individuals(&self) -> Vec<Individual> {
        self.order.iter().filter_map(|id| self.snapshot(id)).collect()
    }

    pub fn ids(&self) -> &[IndividualId] {
        &self.order
    }

    pub fn attribute_count(&self, id: &IndividualId) -> usize {
        self.entries.get(id).map(|e| e.lock().len()).unwrap_or(0)
    }

    pub fn registry(&self) -> &Arc<GlobalAttributeRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Write handle given to one collector.
///
/// Keys are built from the collector's own namespace, so a collector cannot
/// write into another collector's attributes. Accepted and rejected writes are
/// tallied for the session report. Once the collector's outcome is settled the
/// context is closed and refuses every further write.
pub struct CollectorContext {
    namespace: String,
    store: Arc<AttributeStore>,
    written: AtomicUsize,
    rejected: Mutex<Vec<StoreError>>,
    closed: AtomicBool,
}

impl CollectorContext {
    pub fn new(namespace: impl Into<String>, store: Arc<AttributeStore>) -> Self {
        Self {
            namespace: namespace.into().to_ascii_lowercase(),
            store,
            written: AtomicUsize::new(0),
            rejected: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Read access to the whole store.
    pub fn store(&self) -> &AttributeStore {
        &self.store
    }

    /// Writes `local_name` under this collector's namespace.
    pub fn put(
        &self,
        id: &IndividualId,
        local_name: &str,
        value: AttributeValue,
        reliability: f64,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let key = match AttributeKey::new(&self.namespace, local_name) {
            Ok(key) => key,
            Err(_) => {
                // Not a well-formed key, so it cannot be registered either.
                let err = StoreError::UnknownAttribute(AttributeKey::unchecked(&self.namespace, local_name));
                return self.reject(err);
            }
        };
        let reliability = match ReliabilityValue::new(reliability) {
            Ok(r) => r,
            Err(err) => return self.reject(err),
        };
        self.record(self.store.put(id, &key, value, reliability))
    }

    /// Writes a fully qualified observation; the key must belong to this namespace.
    pub fn put_observation(
        &self,
        id: &IndividualId,
        key: &AttributeKey,
        observation: AttributeObservation,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        if key.namespace() != self.namespace {
            return self.reject(StoreError::NamespaceViolation {
                namespace: self.namespace.clone(),
                key: key.clone(),
            });
        }
        self.record(self.store.put(id, key, observation.value, observation.reliability))
    }

    /// Refuses all later writes, e.g. from a collector that outlived its budget.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> Vec<StoreError> {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // Late writes are dropped without touching the tallies; the outcome is already reported.
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            debug!(namespace = %self.namespace, "write after close refused");
            return Err(StoreError::WriterClosed(self.namespace.clone()));
        }
        Ok(())
    }

    fn record(&self, result: Result<(), StoreError>) -> Result<(), StoreError> {
        match result {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => self.reject(err),
        }
    }

    fn reject(&self, err: StoreError) -> Result<(), StoreError> {
        warn!(namespace = %self.namespace, error = %err, "rejected attribute write");
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err.clone());
        Err(err)
    }
}
