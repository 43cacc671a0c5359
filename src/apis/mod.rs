// Built-in collectors. Third-party sources implement the traits in `crate::collector`.
pub mod factory;
pub mod file_source;
pub mod roster;
pub mod stored;

pub use factory::{create_orchestrator, create_orchestrator_with_gateway};
pub use file_source::{FileObservation, FileSourceCollector};
pub use roster::{RosterCollector, RosterEntry};
pub use stored::StoredIndividualsCollector;
