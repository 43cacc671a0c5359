use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::{AttributeCategory, AttributeKey, AttributeValue, ReliabilityValue};
use crate::registry::GlobalAttributeRegistry;

/// Opaque identity of an individual. Assigned once, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndividualId(Uuid);

impl IndividualId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for IndividualId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for IndividualId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for IndividualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One value plus how much we trust it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeObservation {
    pub value: AttributeValue,
    pub reliability: ReliabilityValue,
}

impl AttributeObservation {
    pub fn new(value: AttributeValue, reliability: ReliabilityValue) -> Self {
        Self { value, reliability }
    }
}

/// An event attendee: identity fields plus the attributes collected about them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Individual {
    #[serde(default)]
    pub id: Option<IndividualId>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub show: Option<String>,
    #[serde(default)]
    pub seat: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<AttributeKey, AttributeObservation>,
}

impl Individual {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_show(mut self, show: impl Into<String>) -> Self {
        self.show = Some(show.into());
        self
    }

    pub fn with_seat(mut self, seat: impl Into<String>) -> Self {
        self.seat = Some(seat.into());
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Every observation whose key resolves to `category`, across all namespaces.
    pub fn category_values<'a>(
        &'a self,
        registry: &GlobalAttributeRegistry,
        category: AttributeCategory,
    ) -> Vec<&'a AttributeObservation> {
        self.attributes
            .iter()
            .filter(|(key, _)| registry.resolve(key) == Some(category))
            .map(|(_, obs)| obs)
            .collect()
    }
}
