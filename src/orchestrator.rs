//! Collection session orchestration.
//!
//! `Configuring -> RegistrySealed -> PrimaryRunning -> SecondariesRunning -> Completed`
//!
//! The primary collector always finishes before any secondary is scheduled.
//! Every collector runs on its own OS thread, so one that blocks cannot starve
//! the others or escape its time budget. Secondaries are admitted through a
//! semaphore; each is isolated from the others' failures and panics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinError;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::collector::{PrimaryCollector, SecondaryCollector};
use crate::domain::{
    normalize_namespace, AttributeKey, AttributeObservation, Individual, IndividualId,
    IndividualRequirements,
};
use crate::error::{CollectorExecutionError, OrchestratorError, SchemaError, StoreError, UnsatisfiableRequest};
use crate::evaluator;
use crate::metrics::CollectionMetrics;
use crate::persistence::PersistenceGateway;
use crate::registry::{AttributeDeclaration, GlobalAttributeRegistry};
use crate::store::{AttributeStore, CollectorContext};

pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Budget for each collector unless it declares its own.
    pub collector_timeout: Duration,
    /// Upper bound on concurrently running secondaries; defaults to their number.
    pub max_concurrency: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
            max_concurrency: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Configuring,
    RegistrySealed,
    PrimaryRunning,
    SecondariesRunning,
    Completed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Configuring => "configuring",
            SessionState::RegistrySealed => "registry_sealed",
            SessionState::PrimaryRunning => "primary_running",
            SessionState::SecondariesRunning => "secondaries_running",
            SessionState::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CollectorStatus {
    Success,
    Failed(CollectorExecutionError),
    /// Not run because the primary collector produced no individuals.
    Skipped,
}

impl CollectorStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CollectorStatus::Success)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorOutcome {
    pub namespace: String,
    #[serde(flatten)]
    pub status: CollectorStatus,
    pub written: usize,
    pub rejected: Vec<StoreError>,
    pub duration_ms: u64,
}

/// Result of a completed session: outcomes per collector plus the enriched individuals.
pub struct SessionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub primary: Option<CollectorOutcome>,
    pub secondaries: Vec<CollectorOutcome>,
    store: Arc<AttributeStore>,
}

impl SessionReport {
    pub fn state(&self) -> SessionState {
        SessionState::Completed
    }

    pub fn store(&self) -> &AttributeStore {
        &self.store
    }

    pub fn registry(&self) -> &GlobalAttributeRegistry {
        self.store.registry()
    }

    /// Enriched individuals, in the order the primary collector produced them.
    pub fn individuals(&self) -> Vec<Individual> {
        self.store.individuals()
    }

    /// Outcome for `namespace`, primary included.
    pub fn outcome(&self, namespace: &str) -> Option<&CollectorOutcome> {
        let namespace = namespace.to_ascii_lowercase();
        self.primary
            .iter()
            .chain(self.secondaries.iter())
            .find(|o| o.namespace == namespace)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CollectorOutcome> {
        self.primary
            .iter()
            .chain(self.secondaries.iter())
            .filter(|o| matches!(o.status, CollectorStatus::Failed(_)))
    }

    pub fn find_suitable(
        &self,
        requirements: &IndividualRequirements,
    ) -> Result<Vec<Individual>, UnsatisfiableRequest> {
        evaluator::find_suitable(self.registry(), &self.individuals(), requirements)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            state: self.state(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            individuals: self.store.len(),
            primary: self.primary.clone(),
            secondaries: self.secondaries.clone(),
        }
    }
}

/// Serializable view of a [`SessionReport`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub individuals: usize,
    pub primary: Option<CollectorOutcome>,
    pub secondaries: Vec<CollectorOutcome>,
}

pub struct Orchestrator {
    config: SessionConfig,
    state: SessionState,
    registry: Arc<GlobalAttributeRegistry>,
    primary: Option<Box<dyn PrimaryCollector>>,
    secondaries: Vec<Box<dyn SecondaryCollector>>,
    gateway: Option<Arc<dyn PersistenceGateway>>,
}

impl Orchestrator {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Configuring,
            registry: Arc::new(GlobalAttributeRegistry::new()),
            primary: None,
            secondaries: Vec::new(),
            gateway: None,
        }
    }

    /// Individuals the primary returns without an id get one from `gateway`.
    pub fn with_gateway(mut self, gateway: Arc<dyn PersistenceGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registry(&self) -> &Arc<GlobalAttributeRegistry> {
        &self.registry
    }

    pub fn register_primary(&mut self, collector: Box<dyn PrimaryCollector>) -> Result<(), SchemaError> {
        if self.state != SessionState::Configuring {
            return Err(SchemaError::RegistryClosed);
        }
        if let Some(existing) = &self.primary {
            return Err(SchemaError::PrimaryAlreadyRegistered {
                existing: existing.namespace().to_string(),
                rejected: collector.namespace().to_string(),
            });
        }
        self.declare(collector.namespace(), &collector.declarations())?;
        info!(namespace = %collector.namespace(), "registered primary collector");
        self.primary = Some(collector);
        Ok(())
    }

    pub fn register_secondary(&mut self, collector: Box<dyn SecondaryCollector>) -> Result<(), SchemaError> {
        self.declare(collector.namespace(), &collector.declarations())?;
        info!(namespace = %collector.namespace(), "registered secondary collector");
        self.secondaries.push(collector);
        Ok(())
    }

    fn declare(
        &mut self,
        namespace: &str,
        declarations: &[AttributeDeclaration],
    ) -> Result<(), SchemaError> {
        if self.state != SessionState::Configuring {
            return Err(SchemaError::RegistryClosed);
        }
        let registry = Arc::get_mut(&mut self.registry).ok_or(SchemaError::RegistryClosed)?;
        registry.register(namespace, declarations)
    }

    /// Closes registration. Implied by [`run`](Self::run).
    pub fn seal(&mut self) -> Result<(), OrchestratorError> {
        match self.state {
            SessionState::Configuring => {
                if let Some(registry) = Arc::get_mut(&mut self.registry) {
                    registry.seal();
                }
                self.transition(SessionState::RegistrySealed);
                Ok(())
            }
            SessionState::RegistrySealed => Ok(()),
            other => Err(OrchestratorError::InvalidState {
                expected: SessionState::Configuring.as_str(),
                actual: other.as_str(),
            }),
        }
    }

    /// Runs the session to completion. Collector failures are reported, not returned.
    pub async fn run(&mut self) -> Result<SessionReport, OrchestratorError> {
        self.seal()?;
        let started_at = Utc::now();

        self.transition(SessionState::PrimaryRunning);
        let (primary, store) = match self.primary.take() {
            Some(collector) => {
                let (outcome, store) = self.run_primary(collector).await;
                (Some(outcome), store)
            }
            None => {
                warn!("no primary collector registered; session has no individuals");
                (None, Arc::new(AttributeStore::new(self.registry.clone())))
            }
        };
        CollectionMetrics::record_individuals_loaded(store.len());

        let secondaries = std::mem::take(&mut self.secondaries);
        let secondaries = if store.is_empty() {
            info!(skipped = secondaries.len(), "no individuals collected, skipping secondary collectors");
            secondaries
                .iter()
                .map(|c| CollectorOutcome {
                    namespace: c.namespace().to_ascii_lowercase(),
                    status: CollectorStatus::Skipped,
                    written: 0,
                    rejected: Vec::new(),
                    duration_ms: 0,
                })
                .collect()
        } else {
            self.transition(SessionState::SecondariesRunning);
            self.run_secondaries(secondaries, &store).await
        };

        self.transition(SessionState::Completed);
        Ok(SessionReport {
            started_at,
            finished_at: Utc::now(),
            primary,
            secondaries,
            store,
        })
    }

    async fn run_primary(
        &self,
        mut collector: Box<dyn PrimaryCollector>,
    ) -> (CollectorOutcome, Arc<AttributeStore>) {
        let namespace = namespace_of(collector.namespace());
        let budget = collector.timeout().unwrap_or(self.config.collector_timeout);
        let started = Instant::now();
        let mut store = AttributeStore::new(self.registry.clone());

        let span = info_span!("collector", namespace = %namespace, role = "primary");
        let work = async move {
            info!("collecting individuals");
            collector
                .collect()
                .await
                .map_err(|e| CollectorExecutionError::Failed(format!("{:#}", e)))
        };
        let collected = run_isolated(&namespace, budget, work).instrument(span).await;
        let mut individuals = match collected {
            Ok(individuals) => individuals,
            Err(err) => {
                let outcome = finish(namespace, CollectorStatus::Failed(err), None, Vec::new(), started.elapsed());
                return (outcome, Arc::new(store));
            }
        };

        if let Some(gateway) = &self.gateway {
            for individual in individuals.iter_mut().filter(|i| i.id.is_none()) {
                if let Err(e) = gateway.persist(individual).await {
                    let err = CollectorExecutionError::Persistence(e.to_string());
                    let outcome = finish(namespace, CollectorStatus::Failed(err), None, Vec::new(), started.elapsed());
                    return (outcome, Arc::new(store));
                }
            }
        }

        let mut pending: Vec<(IndividualId, BTreeMap<AttributeKey, AttributeObservation>)> =
            Vec::with_capacity(individuals.len());
        let mut duplicates = Vec::new();
        for mut individual in individuals {
            let attributes = std::mem::take(&mut individual.attributes);
            match store.insert_individual(individual) {
                Ok(id) => pending.push((id, attributes)),
                Err(err) => {
                    warn!(namespace = %namespace, error = %err, "dropping individual");
                    duplicates.push(err);
                }
            }
        }

        // Primary attributes go through the same validation as everyone else's.
        let store = Arc::new(store);
        let ctx = CollectorContext::new(namespace.clone(), store.clone());
        for (id, attributes) in pending {
            for (key, observation) in attributes {
                let _ = ctx.put_observation(&id, &key, observation);
            }
        }
        ctx.close();
        let outcome = finish(namespace, CollectorStatus::Success, Some(&ctx), duplicates, started.elapsed());
        info!(individuals = store.len(), "primary collection finished");
        (outcome, store)
    }

    async fn run_secondaries(
        &self,
        collectors: Vec<Box<dyn SecondaryCollector>>,
        store: &Arc<AttributeStore>,
    ) -> Vec<CollectorOutcome> {
        let cap = self
            .config
            .max_concurrency
            .unwrap_or(collectors.len())
            .max(1);
        let permits = Arc::new(Semaphore::new(cap));
        let individuals = Arc::new(store.individuals());
        info!(collectors = collectors.len(), concurrency = cap, "starting secondary collectors");

        let mut running = Vec::with_capacity(collectors.len());
        for mut collector in collectors {
            let namespace = namespace_of(collector.namespace());
            let budget = collector.timeout().unwrap_or(self.config.collector_timeout);
            let ctx = Arc::new(CollectorContext::new(namespace.clone(), store.clone()));
            let task_ctx = ctx.clone();
            let task_namespace = namespace.clone();
            let permits = permits.clone();
            let individuals = individuals.clone();

            let span = info_span!("collector", namespace = %namespace, role = "secondary");
            let handle = tokio::spawn(
                async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return (Err(CollectorExecutionError::Cancelled), Duration::ZERO),
                    };
                    // Queue time behind the semaphore does not count against the budget.
                    let started = Instant::now();
                    let writer = task_ctx.clone();
                    let work = async move {
                        collector
                            .setup(individuals.as_slice())
                            .await
                            .map_err(|e| CollectorExecutionError::SetupFailed(format!("{:#}", e)))?;
                        collector
                            .run(&writer)
                            .await
                            .map_err(|e| CollectorExecutionError::Failed(format!("{:#}", e)))
                    };
                    let result = run_isolated(&task_namespace, budget, work).await;
                    task_ctx.close();
                    (result, started.elapsed())
                }
                .instrument(span),
            );
            running.push((namespace, ctx, handle));
        }

        let mut outcomes = Vec::with_capacity(running.len());
        for (namespace, ctx, handle) in running {
            let (status, elapsed) = match handle.await {
                Ok((Ok(()), elapsed)) => (CollectorStatus::Success, elapsed),
                Ok((Err(err), elapsed)) => (CollectorStatus::Failed(err), elapsed),
                Err(join) => {
                    ctx.close();
                    (CollectorStatus::Failed(join_failure(join)), Duration::ZERO)
                }
            };
            outcomes.push(finish(namespace, status, Some(&ctx), Vec::new(), elapsed));
        }
        outcomes
    }

    fn transition(&mut self, next: SessionState) {
        info!(from = %self.state, to = %next, "session state change");
        self.state = next;
    }
}

fn namespace_of(raw: &str) -> String {
    normalize_namespace(raw).unwrap_or_else(|_| raw.to_ascii_lowercase())
}

/// Runs `work` on its own OS thread and waits at most `budget` for it.
///
/// The thread drives the future through the session runtime's handle, so a
/// collector that blocks only stalls its own thread. On expiry the future is
/// dropped at its next `.await`; a thread stuck in a blocking call is left to
/// finish on its own and the caller closes its write context.
async fn run_isolated<T, F>(namespace: &str, budget: Duration, work: F) -> Result<T, CollectorExecutionError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, CollectorExecutionError>> + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let runtime = Handle::current();
    let span = Span::current();

    let spawned = thread::Builder::new()
        .name(format!("collector-{}", namespace))
        .spawn(move || {
            let guarded = async move {
                tokio::select! {
                    result = work => result,
                    Ok(()) = cancel_rx => Err(CollectorExecutionError::Cancelled),
                }
            };
            let result = panic::catch_unwind(AssertUnwindSafe(move || runtime.block_on(guarded.instrument(span))))
                .unwrap_or_else(|payload| Err(CollectorExecutionError::Panic(panic_message(payload))));
            let _ = done_tx.send(result);
        });
    if let Err(e) = spawned {
        return Err(CollectorExecutionError::Failed(format!("could not start collector thread: {}", e)));
    }

    match tokio::time::timeout(budget, done_rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(CollectorExecutionError::Cancelled),
        Err(_) => {
            let _ = cancel_tx.send(());
            Err(CollectorExecutionError::Timeout(budget))
        }
    }
}

fn finish(
    namespace: String,
    status: CollectorStatus,
    ctx: Option<&CollectorContext>,
    mut rejected: Vec<StoreError>,
    elapsed: Duration,
) -> CollectorOutcome {
    let written = ctx.map(|c| c.written()).unwrap_or(0);
    if let Some(ctx) = ctx {
        rejected.extend(ctx.rejected());
    }
    CollectionMetrics::record_writes(&namespace, written, rejected.len());

    match &status {
        CollectorStatus::Failed(err) => {
            error!(namespace = %namespace, error = %err, "collector failed");
            CollectionMetrics::record_collector_failure(&namespace, reason_tag(err), elapsed.as_secs_f64());
        }
        _ => {
            info!(namespace = %namespace, written, rejected = rejected.len(), "collector finished");
            CollectionMetrics::record_collector_success(&namespace, elapsed.as_secs_f64());
        }
    }

    CollectorOutcome {
        namespace,
        status,
        written,
        rejected,
        duration_ms: elapsed.as_millis() as u64,
    }
}

fn reason_tag(err: &CollectorExecutionError) -> &'static str {
    match err {
        CollectorExecutionError::Timeout(_) => "timeout",
        CollectorExecutionError::Panic(_) => "panic",
        CollectorExecutionError::SetupFailed(_) => "setup_failed",
        CollectorExecutionError::Failed(_) => "failed",
        CollectorExecutionError::Cancelled => "cancelled",
        CollectorExecutionError::Persistence(_) => "persistence",
    }
}

fn join_failure(err: JoinError) -> CollectorExecutionError {
    if !err.is_panic() {
        return CollectorExecutionError::Cancelled;
    }
    CollectorExecutionError::Panic(panic_message(err.into_panic()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
