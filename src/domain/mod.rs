//! Domain data shapes shared across layers

pub mod category;
pub mod individual;
pub mod key;
pub mod reliability;
pub mod requirements;

pub use category::{AttributeCategory, AttributeValue, ValueKind};
pub use individual::{AttributeObservation, Individual, IndividualId};
pub use key::{normalize_namespace, AttributeKey};
pub use reliability::ReliabilityValue;
pub use requirements::IndividualRequirements;
