use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{AttributeCategory, AttributeKey, IndividualId, ValueKind};

/// Configuration-time errors. Fatal to session setup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Namespace already registered: {0}")]
    DuplicateNamespace(String),

    #[error("Attribute '{local_name}' declared twice by collector '{namespace}'")]
    DuplicateLocalName { namespace: String, local_name: String },

    #[error("Attribute registry is sealed; no further declarations accepted")]
    RegistryClosed,

    #[error("Invalid namespace '{0}': only ASCII letters and digits are allowed")]
    InvalidNamespace(String),

    #[error("Invalid attribute name '{local_name}' in namespace '{namespace}'")]
    InvalidLocalName { namespace: String, local_name: String },

    #[error("Malformed attribute key: {0}")]
    InvalidAttributeKey(String),

    #[error("Unknown attribute category: {0}")]
    UnknownCategory(String),

    #[error("Primary collector '{existing}' already registered; rejected '{rejected}'")]
    PrimaryAlreadyRegistered { existing: String, rejected: String },
}

/// Errors local to a single attribute write. The store is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StoreError {
    #[error("Attribute {0} is not declared in the registry")]
    UnknownAttribute(AttributeKey),

    #[error("Value of kind {found} is not a valid {category} for {key}")]
    TypeMismatch {
        key: AttributeKey,
        category: AttributeCategory,
        found: ValueKind,
    },

    #[error("Reliability {0} is outside [0, 1]")]
    ReliabilityOutOfRange(f64),

    #[error("Individual {0} is not part of this session")]
    UnknownIndividual(IndividualId),

    #[error("Individual {0} was already added")]
    DuplicateIndividual(IndividualId),

    #[error("Collector '{namespace}' may not write {key}")]
    NamespaceViolation { namespace: String, key: AttributeKey },

    #[error("Collector '{0}' has finished and may no longer write")]
    WriterClosed(String),
}

/// Why a collector did not complete. Isolated to that collector.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CollectorExecutionError {
    #[error("Collector timed out after {0:?}")]
    Timeout(Duration),

    #[error("Collector panicked: {0}")]
    Panic(String),

    #[error("Collector setup failed: {0}")]
    SetupFailed(String),

    #[error("Collector failed: {0}")]
    Failed(String),

    #[error("Collector task was cancelled")]
    Cancelled,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Raised when a non-empty requirement set matches nobody.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("No individual out of {candidates} satisfies {requirements} requirement(s)")]
pub struct UnsatisfiableRequest {
    pub requirements: usize,
    pub candidates: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequirementError {
    #[error("Threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),

    #[error("{category} already required at {existing}, refusing {requested}")]
    ConflictingThreshold {
        category: AttributeCategory,
        existing: f64,
        requested: f64,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Individual not found: {0}")]
    NotFound(IndividualId),

    #[error("Persistence backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Top-level error for configuration loading and the command line surface.
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Requirement(#[from] RequirementError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Unsatisfiable(#[from] UnsatisfiableRequest),
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
