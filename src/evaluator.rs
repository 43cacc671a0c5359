//! Requirement matching over enriched individuals.

use tracing::{debug, info};

use crate::domain::{Individual, IndividualRequirements};
use crate::error::UnsatisfiableRequest;
use crate::metrics::EvaluationMetrics;
use crate::registry::GlobalAttributeRegistry;

/// Returns the individuals that satisfy every requirement.
///
/// Within a category any namespace may satisfy the threshold; across
/// categories all must be satisfied. When `requirements.show` is set only
/// individuals of that show are considered. A non-empty requirement set that
/// nobody meets yields [`UnsatisfiableRequest`]; an empty one returns every
/// candidate unchanged.
pub fn find_suitable(
    registry: &GlobalAttributeRegistry,
    individuals: &[Individual],
    requirements: &IndividualRequirements,
) -> Result<Vec<Individual>, UnsatisfiableRequest> {
    let candidates: Vec<&Individual> = individuals
        .iter()
        .filter(|i| match requirements.show.as_deref() {
            Some(show) => i.show.as_deref() == Some(show),
            None => true,
        })
        .collect();

    let suitable: Vec<Individual> = candidates
        .iter()
        .filter(|i| satisfies(registry, i, requirements))
        .map(|i| (*i).clone())
        .collect();

    let unsatisfiable = !requirements.is_empty() && suitable.is_empty();
    EvaluationMetrics::record_query(candidates.len(), suitable.len(), unsatisfiable);

    if unsatisfiable {
        info!(
            requirements = requirements.len(),
            candidates = candidates.len(),
            "no individual satisfies the requirements"
        );
        return Err(UnsatisfiableRequest {
            requirements: requirements.len(),
            candidates: candidates.len(),
        });
    }
    debug!(matched = suitable.len(), candidates = candidates.len(), "requirements evaluated");
    Ok(suitable)
}

/// True when every required category has at least one observation at or above its threshold.
pub fn satisfies(
    registry: &GlobalAttributeRegistry,
    individual: &Individual,
    requirements: &IndividualRequirements,
) -> bool {
    requirements.thresholds().all(|(category, min)| {
        individual
            .category_values(registry, category)
            .iter()
            .any(|obs| obs.reliability >= min)
    })
}
