use std::sync::Arc;
use tracing::info;

use crate::apis::file_source::FileSourceCollector;
use crate::apis::roster::RosterCollector;
use crate::apis::stored::StoredIndividualsCollector;
use crate::config::Config;
use crate::error::{ProfilerError, Result};
use crate::orchestrator::Orchestrator;
use crate::persistence::PersistenceGateway;

/// Builds an orchestrator with every collector named in `config` registered.
///
/// Schema errors (duplicate namespaces, bad names) surface here, before anything runs.
/// A `[stored]` primary needs a gateway; use [`create_orchestrator_with_gateway`].
pub fn create_orchestrator(config: &Config) -> Result<Orchestrator> {
    build(config, None)
}

/// Like [`create_orchestrator`], with `gateway` assigning ids to new individuals
/// and backing a `[stored]` primary.
pub fn create_orchestrator_with_gateway(
    config: &Config,
    gateway: Arc<dyn PersistenceGateway>,
) -> Result<Orchestrator> {
    build(config, Some(gateway))
}

fn build(config: &Config, gateway: Option<Arc<dyn PersistenceGateway>>) -> Result<Orchestrator> {
    let mut orchestrator = Orchestrator::new(config.session_config());
    if let Some(gateway) = &gateway {
        orchestrator = orchestrator.with_gateway(gateway.clone());
    }

    if let Some(roster) = &config.roster {
        let mut collector = RosterCollector::new(&roster.path);
        if let Some(show) = &roster.show {
            collector = collector.for_show(show);
        }
        orchestrator.register_primary(Box::new(collector))?;
    }

    if let Some(stored) = &config.stored {
        let gateway = gateway.ok_or_else(|| {
            ProfilerError::Config("[stored] requires a persistence gateway".into())
        })?;
        orchestrator.register_primary(Box::new(StoredIndividualsCollector::new(gateway, stored.filter())))?;
    }

    for source in &config.sources {
        let collector = FileSourceCollector::new(&source.namespace, &source.path, source.declarations()?)
            .with_timeout(source.timeout());
        orchestrator.register_secondary(Box::new(collector))?;
    }

    info!(
        "Configured session with {} secondary source(s), {} attribute(s) declared",
        config.sources.len(),
        orchestrator.registry().len()
    );
    Ok(orchestrator)
}
