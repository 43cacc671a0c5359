use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use attendee_profiler::domain::{
    AttributeCategory, AttributeKey, AttributeValue, Individual, IndividualId,
    IndividualRequirements,
};
use attendee_profiler::error::{CollectorExecutionError, OrchestratorError, SchemaError};
use attendee_profiler::persistence::{InMemoryGateway, PersistenceGateway};
use attendee_profiler::registry::AttributeDeclaration;
use attendee_profiler::store::CollectorContext;
use attendee_profiler::{
    Collector, CollectorStatus, Orchestrator, PrimaryCollector, SecondaryCollector, SessionConfig,
    SessionState,
};

struct FixedPrimary {
    individuals: Vec<Individual>,
}

impl Collector for FixedPrimary {
    fn namespace(&self) -> &str {
        "roster"
    }

    fn declarations(&self) -> Vec<AttributeDeclaration> {
        vec![AttributeDeclaration::new("email", AttributeCategory::Email)]
    }
}

#[async_trait]
impl PrimaryCollector for FixedPrimary {
    async fn collect(&mut self) -> Result<Vec<Individual>> {
        Ok(std::mem::take(&mut self.individuals))
    }
}

struct FailingPrimary;

impl Collector for FailingPrimary {
    fn namespace(&self) -> &str {
        "roster"
    }

    fn declarations(&self) -> Vec<AttributeDeclaration> {
        Vec::new()
    }
}

#[async_trait]
impl PrimaryCollector for FailingPrimary {
    async fn collect(&mut self) -> Result<Vec<Individual>> {
        anyhow::bail!("roster unavailable")
    }
}

#[derive(Clone, Copy)]
enum Behaviour {
    Write,
    Sleep(Duration),
    Panic,
    FailSetup,
    FailRun,
}

/// Writes a photo reference for every individual, or misbehaves as told.
struct PhotoSource {
    namespace: &'static str,
    behaviour: Behaviour,
    reliability: f64,
    seen: Vec<IndividualId>,
    runs: Arc<AtomicUsize>,
}

impl PhotoSource {
    fn new(namespace: &'static str, behaviour: Behaviour) -> Self {
        Self {
            namespace,
            behaviour,
            reliability: 0.8,
            seen: Vec::new(),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Collector for PhotoSource {
    fn namespace(&self) -> &str {
        self.namespace
    }

    fn declarations(&self) -> Vec<AttributeDeclaration> {
        vec![AttributeDeclaration::new("photo", AttributeCategory::PhotoReference)]
    }
}

#[async_trait]
impl SecondaryCollector for PhotoSource {
    async fn setup(&mut self, individuals: &[Individual]) -> Result<()> {
        if let Behaviour::FailSetup = self.behaviour {
            anyhow::bail!("credentials missing");
        }
        self.seen = individuals.iter().filter_map(|i| i.id).collect();
        Ok(())
    }

    async fn run(&mut self, ctx: &CollectorContext) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Sleep(d) => tokio::time::sleep(d).await,
            Behaviour::Panic => panic!("source blew up"),
            Behaviour::FailRun => anyhow::bail!("rate limited"),
            _ => {}
        }
        for id in &self.seen {
            ctx.put(
                id,
                "photo",
                photo_of(self.namespace, id),
                self.reliability,
            )?;
        }
        Ok(())
    }
}

fn photo_of(namespace: &str, id: &IndividualId) -> AttributeValue {
    AttributeValue::Uuid(Uuid::new_v5(id.as_uuid(), namespace.as_bytes()))
}

fn attendees() -> Vec<Individual> {
    vec![
        Individual::new("Ann", "Lee").with_email("ann@example.org"),
        Individual::new("Bo", "Park"),
    ]
}

fn orchestrator_with(individuals: Vec<Individual>) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(SessionConfig {
        collector_timeout: Duration::from_millis(200),
        max_concurrency: None,
    });
    orchestrator
        .register_primary(Box::new(FixedPrimary { individuals }))
        .unwrap();
    orchestrator
}

fn key(raw: &str) -> AttributeKey {
    raw.parse().unwrap()
}

#[tokio::test]
async fn test_timed_out_collector_does_not_affect_others() -> Result<()> {
    let mut orchestrator = orchestrator_with(attendees());
    orchestrator.register_secondary(Box::new(PhotoSource::new("c1", Behaviour::Write)))?;
    orchestrator.register_secondary(Box::new(PhotoSource::new(
        "c2",
        Behaviour::Sleep(Duration::from_secs(5)),
    )))?;
    orchestrator.register_secondary(Box::new(PhotoSource::new("c3", Behaviour::Write)))?;

    let report = orchestrator.run().await?;

    assert_eq!(orchestrator.state(), SessionState::Completed);
    assert_eq!(report.outcome("c1").unwrap().status, CollectorStatus::Success);
    assert_eq!(report.outcome("c3").unwrap().status, CollectorStatus::Success);
    assert!(matches!(
        report.outcome("c2").unwrap().status,
        CollectorStatus::Failed(CollectorExecutionError::Timeout(_))
    ));
    assert_eq!(report.failed().count(), 1);

    for individual in report.individuals() {
        assert!(individual.attributes.contains_key(&key("c1_photo")));
        assert!(individual.attributes.contains_key(&key("c3_photo")));
        assert!(!individual.attributes.contains_key(&key("c2_photo")));
    }
    Ok(())
}

#[tokio::test]
async fn test_panicking_collector_is_reported_as_failed() -> Result<()> {
    let mut orchestrator = orchestrator_with(attendees());
    orchestrator.register_secondary(Box::new(PhotoSource::new("boom", Behaviour::Panic)))?;
    orchestrator.register_secondary(Box::new(PhotoSource::new("fine", Behaviour::Write)))?;

    let report = orchestrator.run().await?;

    match &report.outcome("boom").unwrap().status {
        CollectorStatus::Failed(CollectorExecutionError::Panic(message)) => {
            assert!(message.contains("source blew up"))
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(report.outcome("fine").unwrap().status.is_success());
    assert_eq!(report.outcome("fine").unwrap().written, 2);
    Ok(())
}

#[tokio::test]
async fn test_setup_and_run_failures_are_distinguished() -> Result<()> {
    let mut orchestrator = orchestrator_with(attendees());
    let setup = PhotoSource::new("nosetup", Behaviour::FailSetup);
    let runs = setup.runs.clone();
    orchestrator.register_secondary(Box::new(setup))?;
    orchestrator.register_secondary(Box::new(PhotoSource::new("norun", Behaviour::FailRun)))?;

    let report = orchestrator.run().await?;

    assert!(matches!(
        report.outcome("nosetup").unwrap().status,
        CollectorStatus::Failed(CollectorExecutionError::SetupFailed(_))
    ));
    assert!(matches!(
        report.outcome("norun").unwrap().status,
        CollectorStatus::Failed(CollectorExecutionError::Failed(_))
    ));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_primary_skips_secondaries() -> Result<()> {
    let mut orchestrator = orchestrator_with(Vec::new());
    let source = PhotoSource::new("fb", Behaviour::Write);
    let runs = source.runs.clone();
    orchestrator.register_secondary(Box::new(source))?;

    let report = orchestrator.run().await?;

    assert!(report.individuals().is_empty());
    assert_eq!(report.outcome("fb").unwrap().status, CollectorStatus::Skipped);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_primary_yields_empty_session() -> Result<()> {
    let mut orchestrator = Orchestrator::new(SessionConfig::default());
    orchestrator.register_primary(Box::new(FailingPrimary))?;
    orchestrator.register_secondary(Box::new(PhotoSource::new("fb", Behaviour::Write)))?;

    let report = orchestrator.run().await?;

    assert!(matches!(
        report.outcome("roster").unwrap().status,
        CollectorStatus::Failed(CollectorExecutionError::Failed(_))
    ));
    assert_eq!(report.outcome("fb").unwrap().status, CollectorStatus::Skipped);
    assert_eq!(report.store().len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_registration_closes_once_sealed() -> Result<()> {
    let mut orchestrator = orchestrator_with(attendees());
    orchestrator.seal()?;

    let err = orchestrator
        .register_secondary(Box::new(PhotoSource::new("late", Behaviour::Write)))
        .unwrap_err();
    assert_eq!(err, SchemaError::RegistryClosed);
    assert!(!orchestrator.registry().contains_namespace("late"));

    orchestrator.run().await?;
    let err = orchestrator
        .register_secondary(Box::new(PhotoSource::new("later", Behaviour::Write)))
        .unwrap_err();
    assert_eq!(err, SchemaError::RegistryClosed);
    Ok(())
}

#[tokio::test]
async fn test_session_runs_once() -> Result<()> {
    let mut orchestrator = orchestrator_with(attendees());
    orchestrator.run().await?;

    let err = orchestrator.run().await.err().unwrap();
    assert!(matches!(err, OrchestratorError::InvalidState { .. }));
    Ok(())
}

#[tokio::test]
async fn test_second_primary_is_rejected() {
    let mut orchestrator = orchestrator_with(attendees());
    let err = orchestrator
        .register_primary(Box::new(FixedPrimary { individuals: Vec::new() }))
        .unwrap_err();
    assert!(matches!(err, SchemaError::PrimaryAlreadyRegistered { .. }));
}

#[tokio::test]
async fn test_duplicate_namespace_is_rejected() {
    let mut orchestrator = orchestrator_with(attendees());
    orchestrator
        .register_secondary(Box::new(PhotoSource::new("fb", Behaviour::Write)))
        .unwrap();
    let err = orchestrator
        .register_secondary(Box::new(PhotoSource::new("FB", Behaviour::Write)))
        .unwrap_err();
    assert_eq!(err, SchemaError::DuplicateNamespace("fb".to_string()));
}

#[tokio::test]
async fn test_same_local_name_in_many_namespaces_never_collides() -> Result<()> {
    let namespaces = ["fb", "tw", "ig", "li", "gh"];
    let mut orchestrator = orchestrator_with(attendees());
    for ns in namespaces {
        orchestrator.register_secondary(Box::new(PhotoSource::new(ns, Behaviour::Write)))?;
    }

    let report = orchestrator.run().await?;

    let photos = report.registry().keys_for(AttributeCategory::PhotoReference);
    assert_eq!(photos.len(), namespaces.len());
    for individual in report.individuals() {
        let id = individual.id.unwrap();
        for ns in namespaces {
            let obs = report.store().get(&id, &key(&format!("{}_photo", ns))).unwrap();
            assert_eq!(obs.value, photo_of(ns, &id));
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_concurrency_cap_still_runs_everyone() -> Result<()> {
    let mut orchestrator = Orchestrator::new(SessionConfig {
        collector_timeout: Duration::from_secs(5),
        max_concurrency: Some(1),
    });
    orchestrator.register_primary(Box::new(FixedPrimary { individuals: attendees() }))?;
    for ns in ["a", "b", "c"] {
        orchestrator.register_secondary(Box::new(PhotoSource::new(ns, Behaviour::Write)))?;
    }

    let report = orchestrator.run().await?;

    assert!(report.secondaries.iter().all(|o| o.status.is_success()));
    assert!(report.secondaries.iter().all(|o| o.written == 2));
    Ok(())
}

#[tokio::test]
async fn test_gateway_assigns_ids_to_new_individuals() -> Result<()> {
    let gateway = Arc::new(InMemoryGateway::new());
    let known = IndividualId::new();
    let mut returning = Individual::new("Cy", "Moss");
    returning.id = Some(known);

    let mut orchestrator = Orchestrator::new(SessionConfig::default()).with_gateway(gateway.clone());
    orchestrator.register_primary(Box::new(FixedPrimary {
        individuals: vec![Individual::new("Ann", "Lee"), returning],
    }))?;

    let report = orchestrator.run().await?;

    assert_eq!(gateway.len(), 1);
    let ids: Vec<_> = report.individuals().iter().filter_map(|i| i.id).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[1], known);
    let stored = gateway.load_individuals(&Default::default()).await?;
    assert_eq!(stored[0].id, Some(ids[0]));
    Ok(())
}

#[tokio::test]
async fn test_rejected_writes_are_reported() -> Result<()> {
    let mut orchestrator = orchestrator_with(attendees());
    let mut source = PhotoSource::new("fb", Behaviour::Write);
    source.reliability = 1.5;
    orchestrator.register_secondary(Box::new(source))?;

    let report = orchestrator.run().await?;

    let outcome = report.outcome("fb").unwrap();
    // The collector propagates the first rejection.
    assert!(matches!(outcome.status, CollectorStatus::Failed(CollectorExecutionError::Failed(_))));
    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.rejected.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_report_answers_requirement_queries() -> Result<()> {
    let mut orchestrator = orchestrator_with(attendees());
    let mut weak = PhotoSource::new("tw", Behaviour::Write);
    weak.reliability = 0.3;
    orchestrator.register_secondary(Box::new(weak))?;

    let report = orchestrator.run().await?;

    let mut requirements = IndividualRequirements::new();
    requirements.require(AttributeCategory::PhotoReference, 0.2)?;
    assert_eq!(report.find_suitable(&requirements)?.len(), 2);

    let mut strict = IndividualRequirements::new();
    strict.require(AttributeCategory::PhotoReference, 0.9)?;
    let err = report.find_suitable(&strict).unwrap_err();
    assert_eq!(err.candidates, 2);
    Ok(())
}

/// Blocks its thread for `hold` before writing, like a collector doing synchronous I/O.
struct BlockingSource {
    hold: Duration,
    seen: Vec<IndividualId>,
}

impl Collector for BlockingSource {
    fn namespace(&self) -> &str {
        "slow"
    }

    fn declarations(&self) -> Vec<AttributeDeclaration> {
        vec![AttributeDeclaration::new("photo", AttributeCategory::PhotoReference)]
    }
}

#[async_trait]
impl SecondaryCollector for BlockingSource {
    async fn setup(&mut self, individuals: &[Individual]) -> Result<()> {
        self.seen = individuals.iter().filter_map(|i| i.id).collect();
        Ok(())
    }

    async fn run(&mut self, ctx: &CollectorContext) -> Result<()> {
        std::thread::sleep(self.hold);
        for id in &self.seen {
            ctx.put(id, "photo", photo_of("slow", id), 0.9)?;
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_collector_over_budget_times_out() -> Result<()> {
    let mut orchestrator = Orchestrator::new(SessionConfig {
        collector_timeout: Duration::from_millis(100),
        max_concurrency: None,
    });
    orchestrator.register_primary(Box::new(FixedPrimary { individuals: attendees() }))?;
    orchestrator.register_secondary(Box::new(BlockingSource {
        hold: Duration::from_millis(800),
        seen: Vec::new(),
    }))?;
    orchestrator.register_secondary(Box::new(PhotoSource::new("quick", Behaviour::Write)))?;

    let started = std::time::Instant::now();
    let report = orchestrator.run().await?;
    let elapsed = started.elapsed();

    let slow = report.outcome("slow").unwrap();
    assert!(matches!(
        slow.status,
        CollectorStatus::Failed(CollectorExecutionError::Timeout(_))
    ));
    assert!(elapsed < Duration::from_millis(600), "session waited {:?}", elapsed);
    assert!(report.outcome("quick").unwrap().status.is_success());

    // Once the blocked thread wakes up, its writes are refused.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    for id in report.store().ids() {
        assert!(report.store().get(id, &key("slow_photo")).is_none());
        assert!(report.store().get(id, &key("quick_photo")).is_some());
    }
    assert_eq!(slow.written, 0);
    Ok(())
}

/// Writes three attributes for every individual, yielding between individuals.
struct BulkSource {
    namespace: String,
    seen: Vec<IndividualId>,
}

impl Collector for BulkSource {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn declarations(&self) -> Vec<AttributeDeclaration> {
        vec![
            AttributeDeclaration::new("photo", AttributeCategory::PhotoReference),
            AttributeDeclaration::new("town", AttributeCategory::Hometown),
            AttributeDeclaration::new("age", AttributeCategory::Age),
        ]
    }
}

#[async_trait]
impl SecondaryCollector for BulkSource {
    async fn setup(&mut self, individuals: &[Individual]) -> Result<()> {
        self.seen = individuals.iter().filter_map(|i| i.id).collect();
        Ok(())
    }

    async fn run(&mut self, ctx: &CollectorContext) -> Result<()> {
        for (n, id) in self.seen.iter().enumerate() {
            ctx.put(id, "photo", photo_of(&self.namespace, id), 0.7)?;
            ctx.put(id, "town", AttributeValue::Text(format!("{}-town", self.namespace)), 0.5)?;
            ctx.put(id, "age", AttributeValue::Integer((n % 90) as i64), 0.6)?;
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_lose_nothing() -> Result<()> {
    const PEOPLE: usize = 300;
    const SOURCES: usize = 12;

    let individuals = (0..PEOPLE)
        .map(|n| Individual::new(format!("Guest{}", n), "Visitor"))
        .collect();
    let mut orchestrator = Orchestrator::new(SessionConfig {
        collector_timeout: Duration::from_secs(30),
        max_concurrency: None,
    });
    orchestrator.register_primary(Box::new(FixedPrimary { individuals }))?;
    let namespaces: Vec<String> = (0..SOURCES).map(|n| format!("src{}", n)).collect();
    for ns in &namespaces {
        orchestrator.register_secondary(Box::new(BulkSource {
            namespace: ns.clone(),
            seen: Vec::new(),
        }))?;
    }

    let report = orchestrator.run().await?;

    for outcome in &report.secondaries {
        assert!(outcome.status.is_success(), "{} failed", outcome.namespace);
        assert_eq!(outcome.written, PEOPLE * 3);
        assert!(outcome.rejected.is_empty());
    }
    let individuals = report.individuals();
    assert_eq!(individuals.len(), PEOPLE);
    for (n, individual) in individuals.iter().enumerate() {
        let id = individual.id.unwrap();
        assert_eq!(individual.attributes.len(), SOURCES * 3);
        for ns in &namespaces {
            assert_eq!(
                individual.attributes[&key(&format!("{}_photo", ns))].value,
                photo_of(ns, &id)
            );
            assert_eq!(
                individual.attributes[&key(&format!("{}_town", ns))].value,
                AttributeValue::Text(format!("{}-town", ns))
            );
            assert_eq!(
                individual.attributes[&key(&format!("{}_age", ns))].value,
                AttributeValue::Integer((n % 90) as i64)
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_queue_time_is_not_counted_as_run_time() -> Result<()> {
    let mut orchestrator = Orchestrator::new(SessionConfig {
        collector_timeout: Duration::from_millis(350),
        max_concurrency: Some(1),
    });
    orchestrator.register_primary(Box::new(FixedPrimary { individuals: attendees() }))?;
    for ns in ["first", "second", "third"] {
        orchestrator.register_secondary(Box::new(PhotoSource::new(
            ns,
            Behaviour::Sleep(Duration::from_millis(200)),
        )))?;
    }

    let report = orchestrator.run().await?;

    // Run back to back, the last one waits ~400ms for a permit; its own budget is untouched.
    for outcome in &report.secondaries {
        assert!(outcome.status.is_success(), "{} failed", outcome.namespace);
        assert!(outcome.duration_ms >= 200);
        assert!(outcome.duration_ms < 350, "{} took {}ms", outcome.namespace, outcome.duration_ms);
    }
    Ok(())
}
