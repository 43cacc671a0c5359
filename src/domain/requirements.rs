use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::reliability::is_in_range;
use super::{AttributeCategory, ReliabilityValue};
use crate::error::RequirementError;

/// What a downstream consumer needs to know about individuals, and how surely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndividualRequirements {
    pub show: Option<String>,
    thresholds: BTreeMap<AttributeCategory, ReliabilityValue>,
}

impl IndividualRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_show(show: impl Into<String>) -> Self {
        Self {
            show: Some(show.into()),
            thresholds: BTreeMap::new(),
        }
    }

    /// Adds a minimum reliability for `category`.
    ///
    /// Requiring the same category again with the same threshold is a no-op;
    /// a different threshold is rejected.
    pub fn require(
        &mut self,
        category: AttributeCategory,
        min_reliability: f64,
    ) -> Result<&mut Self, RequirementError> {
        if !is_in_range(min_reliability) {
            return Err(RequirementError::ThresholdOutOfRange(min_reliability));
        }
        if let Some(existing) = self.thresholds.get(&category) {
            if existing.get() != min_reliability {
                return Err(RequirementError::ConflictingThreshold {
                    category,
                    existing: existing.get(),
                    requested: min_reliability,
                });
            }
            return Ok(self);
        }
        let threshold = ReliabilityValue::new(min_reliability)
            .map_err(|_| RequirementError::ThresholdOutOfRange(min_reliability))?;
        self.thresholds.insert(category, threshold);
        Ok(self)
    }

    pub fn thresholds(&self) -> impl Iterator<Item = (AttributeCategory, ReliabilityValue)> + '_ {
        self.thresholds.iter().map(|(c, r)| (*c, *r))
    }

    pub fn threshold(&self, category: AttributeCategory) -> Option<ReliabilityValue> {
        self.thresholds.get(&category).copied()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}
