use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::domain::{Individual, IndividualId};
use crate::error::PersistenceError;

/// Selects which stored individuals to load.
#[derive(Debug, Clone, Default)]
pub struct IndividualFilter {
    pub show: Option<String>,
    pub email: Option<String>,
}

impl IndividualFilter {
    pub fn matches(&self, individual: &Individual) -> bool {
        let show_ok = self
            .show
            .as_deref()
            .map_or(true, |show| individual.show.as_deref() == Some(show));
        let email_ok = self.email.as_deref().map_or(true, |email| {
            individual
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email))
        });
        show_ok && email_ok
    }
}

/// Storage owned outside the core. Ids are stable and unique once assigned.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn load_individuals(&self, filter: &IndividualFilter) -> Result<Vec<Individual>, PersistenceError>;

    /// Stores `individual`, assigning an id on first persistence.
    async fn persist(&self, individual: &mut Individual) -> Result<IndividualId, PersistenceError>;
}

/// In-memory gateway for development/testing
#[derive(Default)]
pub struct InMemoryGateway {
    individuals: Arc<Mutex<HashMap<IndividualId, Individual>>>,
    order: Arc<Mutex<Vec<IndividualId>>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn load_individuals(&self, filter: &IndividualFilter) -> Result<Vec<Individual>, PersistenceError> {
        let order = self.order.lock().map_err(|e| PersistenceError::Backend(e.to_string()))?;
        let individuals = self
            .individuals
            .lock()
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(order
            .iter()
            .filter_map(|id| individuals.get(id))
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    async fn persist(&self, individual: &mut Individual) -> Result<IndividualId, PersistenceError> {
        let id = *individual.id.get_or_insert_with(IndividualId::new);

        let mut individuals = self
            .individuals
            .lock()
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        if individuals.insert(id, individual.clone()).is_none() {
            self.order
                .lock()
                .map_err(|e| PersistenceError::Backend(e.to_string()))?
                .push(id);
            debug!("Created individual: {} with id {}", individual.display_name(), id);
        } else {
            debug!("Updated individual: {} with id {}", individual.display_name(), id);
        }
        Ok(id)
    }
}
