use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;

/// Confidence in an observed value, always within `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ReliabilityValue(f64);

impl ReliabilityValue {
    pub const CERTAIN: ReliabilityValue = ReliabilityValue(1.0);

    pub fn new(value: f64) -> Result<Self, StoreError> {
        if is_in_range(value) {
            Ok(Self(value))
        } else {
            Err(StoreError::ReliabilityOutOfRange(value))
        }
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for ReliabilityValue {
    type Error = StoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        ReliabilityValue::new(value)
    }
}

impl From<ReliabilityValue> for f64 {
    fn from(value: ReliabilityValue) -> Self {
        value.0
    }
}

impl fmt::Display for ReliabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// NaN fails both comparisons and is rejected.
pub(crate) fn is_in_range(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}
