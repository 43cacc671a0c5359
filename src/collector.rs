//! The contract every data source implements.
//!
//! A session has exactly one primary collector, which produces the set of
//! individuals, and any number of secondary collectors, which enrich it.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::Individual;
use crate::registry::AttributeDeclaration;
use crate::store::CollectorContext;

/// Identity and schema shared by primary and secondary collectors.
pub trait Collector: Send {
    /// Unique id of this source; ASCII letters and digits only.
    fn namespace(&self) -> &str;

    /// Local attribute names this collector may write, with their categories.
    fn declarations(&self) -> Vec<AttributeDeclaration>;

    /// Overrides the session-wide timeout for this collector.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// The single authoritative source that establishes the individual set.
#[async_trait]
pub trait PrimaryCollector: Collector {
    /// Returns the individuals for this session.
    ///
    /// Attributes set on the returned individuals must be keyed in this
    /// collector's namespace; they are validated like any other write.
    async fn collect(&mut self) -> anyhow::Result<Vec<Individual>>;
}

/// A pluggable source that enriches individuals already collected.
///
/// Runs on its own thread under a time budget. When the budget runs out the
/// collector is reported as timed out, dropped at its next `.await`, and any
/// later write through its context is refused.
#[async_trait]
pub trait SecondaryCollector: Collector {
    /// Called once with the individuals of the session before [`run`](Self::run).
    async fn setup(&mut self, _individuals: &[Individual]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Performs the collection, writing results through `ctx`.
    async fn run(&mut self, ctx: &CollectorContext) -> anyhow::Result<()>;
}
