use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

use crate::collector::{Collector, PrimaryCollector};
use crate::constants::{
    ROSTER_EMAIL, ROSTER_FIRST_NAME, ROSTER_LAST_NAME, ROSTER_NAMESPACE, ROSTER_RELIABILITY,
};
use crate::domain::{
    AttributeCategory, AttributeKey, AttributeObservation, AttributeValue, Individual,
    IndividualId, ReliabilityValue,
};
use crate::registry::AttributeDeclaration;

/// One attendee as listed in the roster file.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
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
}

/// Primary collector reading a JSON array of attendees.
pub struct RosterCollector {
    path: PathBuf,
    show: Option<String>,
}

impl RosterCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            show: None,
        }
    }

    /// Keep only attendees of `show`.
    pub fn for_show(mut self, show: impl Into<String>) -> Self {
        self.show = Some(show.into());
        self
    }

    fn to_individual(entry: RosterEntry) -> anyhow::Result<Individual> {
        let mut individual = Individual {
            id: entry.id,
            first_name: entry.first_name.trim().to_string(),
            last_name: entry.last_name.trim().to_string(),
            email: entry.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
            show: entry.show,
            seat: entry.seat,
            ..Default::default()
        };

        let certain = ReliabilityValue::new(ROSTER_RELIABILITY)?;
        let mut facts = vec![
            (ROSTER_FIRST_NAME, individual.first_name.clone()),
            (ROSTER_LAST_NAME, individual.last_name.clone()),
        ];
        if let Some(email) = &individual.email {
            facts.push((ROSTER_EMAIL, email.clone()));
        }
        for (local, value) in facts.into_iter().filter(|(_, v)| !v.is_empty()) {
            individual.attributes.insert(
                AttributeKey::new(ROSTER_NAMESPACE, local)?,
                AttributeObservation::new(AttributeValue::Text(value), certain),
            );
        }
        Ok(individual)
    }
}

impl Collector for RosterCollector {
    fn namespace(&self) -> &str {
        ROSTER_NAMESPACE
    }

    fn declarations(&self) -> Vec<AttributeDeclaration> {
        vec![
            AttributeDeclaration::new(ROSTER_FIRST_NAME, AttributeCategory::FirstName),
            AttributeDeclaration::new(ROSTER_LAST_NAME, AttributeCategory::LastName),
            AttributeDeclaration::new(ROSTER_EMAIL, AttributeCategory::Email),
        ]
    }
}

#[async_trait::async_trait]
impl PrimaryCollector for RosterCollector {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn collect(&mut self) -> anyhow::Result<Vec<Individual>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading roster {}", self.path.display()))?;
        let entries: Vec<RosterEntry> =
            serde_json::from_str(&raw).with_context(|| format!("parsing roster {}", self.path.display()))?;
        let total = entries.len();

        let individuals = entries
            .into_iter()
            .filter(|e| match self.show.as_deref() {
                Some(show) => e.show.as_deref() == Some(show),
                None => true,
            })
            .map(Self::to_individual)
            .collect::<anyhow::Result<Vec<_>>>()?;

        debug!("Filtered roster from {} to {} entries", total, individuals.len());
        info!("Loaded {} attendees from roster", individuals.len());
        Ok(individuals)
    }
}
