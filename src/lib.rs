pub mod apis;
pub mod collector;
pub mod config;
pub mod constants;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod persistence;
pub mod registry;
pub mod store;

// Domain data shapes shared across layers
pub mod domain;

pub use collector::{Collector, PrimaryCollector, SecondaryCollector};
pub use domain::{
    AttributeCategory, AttributeKey, AttributeObservation, AttributeValue, Individual,
    IndividualId, IndividualRequirements, ReliabilityValue, ValueKind,
};
pub use error::{
    CollectorExecutionError, OrchestratorError, ProfilerError, SchemaError, StoreError,
    UnsatisfiableRequest,
};
pub use evaluator::find_suitable;
pub use orchestrator::{
    CollectorOutcome, CollectorStatus, Orchestrator, SessionConfig, SessionReport, SessionState,
};
pub use registry::{AttributeDeclaration, GlobalAttributeRegistry};
pub use store::{AttributeStore, CollectorContext};
