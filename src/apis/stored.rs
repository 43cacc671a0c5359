use std::sync::Arc;
use tracing::info;

use crate::collector::{Collector, PrimaryCollector};
use crate::constants::STORED_NAMESPACE;
use crate::domain::Individual;
use crate::persistence::{IndividualFilter, PersistenceGateway};
use crate::registry::AttributeDeclaration;

/// Primary collector that reloads previously persisted individuals.
///
/// Only identity is carried over; attributes are collected afresh each session.
pub struct StoredIndividualsCollector {
    gateway: Arc<dyn PersistenceGateway>,
    filter: IndividualFilter,
}

impl StoredIndividualsCollector {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, filter: IndividualFilter) -> Self {
        Self { gateway, filter }
    }
}

impl Collector for StoredIndividualsCollector {
    fn namespace(&self) -> &str {
        STORED_NAMESPACE
    }

    fn declarations(&self) -> Vec<AttributeDeclaration> {
        Vec::new()
    }
}

#[async_trait::async_trait]
impl PrimaryCollector for StoredIndividualsCollector {
    async fn collect(&mut self) -> anyhow::Result<Vec<Individual>> {
        let mut individuals = self.gateway.load_individuals(&self.filter).await?;
        for individual in &mut individuals {
            individual.attributes.clear();
        }
        info!("Loaded {} stored individuals", individuals.len());
        Ok(individuals)
    }
}
