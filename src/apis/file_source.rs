use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::collector::{Collector, SecondaryCollector};
use crate::domain::{AttributeValue, Individual, IndividualId};
use crate::registry::AttributeDeclaration;
use crate::store::CollectorContext;

/// One line of a source file: a fact about an attendee, found by id or email.
#[derive(Debug, Clone, Deserialize)]
pub struct FileObservation {
    #[serde(default)]
    pub id: Option<IndividualId>,
    #[serde(default)]
    pub email: Option<String>,
    pub attribute: String,
    pub value: AttributeValue,
    pub reliability: f64,
}

/// Secondary collector fed from a JSON array of [`FileObservation`]s.
///
/// Stands in for any external source that can be exported to a file.
pub struct FileSourceCollector {
    namespace: String,
    path: PathBuf,
    declarations: Vec<AttributeDeclaration>,
    timeout: Option<Duration>,
    by_email: HashMap<String, IndividualId>,
    observations: Vec<FileObservation>,
}

impl FileSourceCollector {
    pub fn new(
        namespace: impl Into<String>,
        path: impl Into<PathBuf>,
        declarations: Vec<AttributeDeclaration>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            path: path.into(),
            declarations,
            timeout: None,
            by_email: HashMap::new(),
            observations: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn resolve(&self, obs: &FileObservation) -> Option<IndividualId> {
        obs.id.or_else(|| {
            obs.email
                .as_deref()
                .and_then(|e| self.by_email.get(&e.trim().to_ascii_lowercase()).copied())
        })
    }
}

impl Collector for FileSourceCollector {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn declarations(&self) -> Vec<AttributeDeclaration> {
        self.declarations.clone()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait::async_trait]
impl SecondaryCollector for FileSourceCollector {
    async fn setup(&mut self, individuals: &[Individual]) -> anyhow::Result<()> {
        self.by_email = individuals
            .iter()
            .filter_map(|i| {
                let id = i.id?;
                let email = i.email.as_deref()?;
                Some((email.trim().to_ascii_lowercase(), id))
            })
            .collect();

        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading source file {}", self.path.display()))?;
        self.observations = serde_json::from_str(&raw)
            .with_context(|| format!("parsing source file {}", self.path.display()))?;
        debug!(
            "Prepared {} observations for {} individuals",
            self.observations.len(),
            self.by_email.len()
        );
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(namespace = %self.namespace))]
    async fn run(&mut self, ctx: &CollectorContext) -> anyhow::Result<()> {
        let mut unmatched = 0usize;
        let mut rejected = 0usize;
        for obs in &self.observations {
            let Some(id) = self.resolve(obs) else {
                unmatched += 1;
                continue;
            };
            // Rejections are recorded on the context; keep going with the rest.
            if ctx.put(&id, &obs.attribute, obs.value.clone(), obs.reliability).is_err() {
                rejected += 1;
            }
        }
        if unmatched > 0 {
            warn!("{} observations matched no individual", unmatched);
        }
        info!(
            "Applied {} observations ({} rejected, {} unmatched)",
            self.observations.len() - unmatched - rejected,
            rejected,
            unmatched
        );
        Ok(())
    }
}
