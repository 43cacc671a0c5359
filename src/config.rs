use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{AttributeCategory, IndividualRequirements};
use crate::error::{ProfilerError, Result};
use crate::orchestrator::{SessionConfig, DEFAULT_COLLECTOR_TIMEOUT};
use crate::persistence::IndividualFilter;
use crate::registry::AttributeDeclaration;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PROFILER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "profiler.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSection,
    pub roster: Option<RosterConfig>,
    pub stored: Option<StoredConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    pub requirements: Option<RequirementsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_timeout_secs")]
    pub collector_timeout_secs: u64,
    pub max_concurrency: Option<usize>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            collector_timeout_secs: default_timeout_secs(),
            max_concurrency: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COLLECTOR_TIMEOUT.as_secs()
}

/// The primary attendee roster.
#[derive(Debug, Deserialize)]
pub struct RosterConfig {
    pub path: PathBuf,
    /// Only keep attendees of this show.
    pub show: Option<String>,
}

/// Reload previously persisted individuals instead of reading a roster.
///
/// Needs a persistence gateway supplied by the embedding application.
#[derive(Debug, Default, Deserialize)]
pub struct StoredConfig {
    pub show: Option<String>,
    pub email: Option<String>,
}

impl StoredConfig {
    pub fn filter(&self) -> IndividualFilter {
        IndividualFilter {
            show: self.show.clone(),
            email: self.email.clone(),
        }
    }
}

/// A file-backed secondary source.
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub namespace: String,
    pub path: PathBuf,
    /// `local_name = "category"`
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
}

impl SourceConfig {
    pub fn declarations(&self) -> Result<Vec<AttributeDeclaration>> {
        self.attributes
            .iter()
            .map(|(local, category)| {
                let category: AttributeCategory = category.parse()?;
                Ok(AttributeDeclaration::new(local.clone(), category))
            })
            .collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RequirementsConfig {
    pub show: Option<String>,
    /// `category = minimum reliability`
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

impl RequirementsConfig {
    pub fn to_requirements(&self) -> Result<IndividualRequirements> {
        let mut requirements = IndividualRequirements::new();
        requirements.show = self.show.clone();
        for (category, min) in &self.thresholds {
            let category: AttributeCategory = category.parse()?;
            requirements.require(category, *min)?;
        }
        Ok(requirements)
    }
}

impl Config {
    /// Loads from `$PROFILER_CONFIG`, or `profiler.toml` in the working directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Loads a file; relative data paths are resolved against the file's directory.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ProfilerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            collector_timeout: Duration::from_secs(self.session.collector_timeout_secs),
            max_concurrency: self.session.max_concurrency,
        }
    }

    /// The configured requirements, or an empty set.
    pub fn requirements(&self) -> Result<IndividualRequirements> {
        match &self.requirements {
            Some(r) => r.to_requirements(),
            None => Ok(IndividualRequirements::new()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.session.collector_timeout_secs == 0 {
            return Err(ProfilerError::Config(
                "session.collector_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.roster.is_some() && self.stored.is_some() {
            return Err(ProfilerError::Config(
                "[roster] and [stored] both name a primary collector; keep one".into(),
            ));
        }
        if self.session.max_concurrency == Some(0) {
            return Err(ProfilerError::Config(
                "session.max_concurrency must be greater than zero".into(),
            ));
        }
        for source in &self.sources {
            if source.attributes.is_empty() {
                return Err(ProfilerError::Config(format!(
                    "source '{}' declares no attributes",
                    source.namespace
                )));
            }
            source.declarations()?;
        }
        self.requirements()?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(roster) = self.roster.as_mut() {
            resolve(&mut roster.path);
        }
        for source in &mut self.sources {
            resolve(&mut source.path);
        }
    }
}
