//! Cross-batch result consolidation.
//!
//! Parallel evaluation tasks never write shared state; every task returns
//! its result together with the cache entries it created (capacity-vector
//! memory, stand-alone fronts, tracker details). The coordinator folds all
//! deltas into the shared caches strictly between batches, so no locking is
//! needed and merge order cannot change a generation's outcome.

use crate::engine::capacity::CapacityVectorMemory;
use crate::engine::connectivity::ConnectivityVector;
use crate::engine::context::DomainContext;
use crate::engine::district::{
    CandidateEvaluation, DistrictEnergySystem, SharedCaches, SystemCombination, evaluate_candidate,
};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::supply::SupplySystem;
use crate::engine::tracker::OptimizationTracker;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// The coordinator-side caches of one optimization run.
#[derive(Debug)]
pub struct SharedState {
    /// Memoized best combinations per canonical connectivity string.
    pub evaluated: BTreeMap<String, Vec<SystemCombination>>,
    /// The full district realizations behind the memoized results.
    pub districts: BTreeMap<String, DistrictEnergySystem>,
    pub civ_memory: CapacityVectorMemory,
    pub stand_alone_systems: BTreeMap<String, Vec<SupplySystem>>,
    /// Highest viable fitness value seen per objective, the penalty scale.
    pub worst_observed: Vec<f64>,
}

impl SharedState {
    pub fn new(objective_count: usize) -> Self {
        Self {
            evaluated: BTreeMap::new(),
            districts: BTreeMap::new(),
            civ_memory: CapacityVectorMemory::new(None),
            stand_alone_systems: BTreeMap::new(),
            worst_observed: vec![0.0; objective_count],
        }
    }

    pub fn is_memoized(&self, key: &str) -> bool {
        self.evaluated.contains_key(key)
    }

    fn caches(&self) -> SharedCaches<'_> {
        SharedCaches {
            civ_memory: &self.civ_memory,
            stand_alone_systems: &self.stand_alone_systems,
            worst_observed: &self.worst_observed,
        }
    }
}

/// Evaluates a batch of candidates, fanning out over the rayon pool when
/// parallel evaluation is configured. Tasks read the shared state; their
/// deltas are applied afterwards by [`consolidate`].
pub fn evaluate_batch(
    candidates: &[ConnectivityVector],
    context: &DomainContext,
    state: &SharedState,
    generation: usize,
    reporter: &ProgressReporter<'_>,
) -> Result<Vec<CandidateEvaluation>, EngineError> {
    let caches = state.caches();
    reporter.report(Progress::BatchStart {
        candidates: candidates.len() as u64,
    });
    let results = if context.settings.algorithm.parallelize_computation {
        candidates
            .par_iter()
            .map(|candidate| {
                let result = evaluate_candidate(candidate, context, &caches, generation);
                reporter.report(Progress::CandidateDone);
                result
            })
            .collect()
    } else {
        candidates
            .iter()
            .map(|candidate| {
                let result = evaluate_candidate(candidate, context, &caches, generation);
                reporter.report(Progress::CandidateDone);
                result
            })
            .collect()
    };
    reporter.report(Progress::BatchFinish);
    results
}

/// Folds a batch's deltas into the shared state: memoized results, district
/// realizations, capacity-vector memory, stand-alone fronts, the penalty
/// scale, and the tracker's candidate details.
pub fn consolidate(
    state: &mut SharedState,
    tracker: Option<&mut OptimizationTracker>,
    batch: Vec<CandidateEvaluation>,
) {
    let mut details = Vec::with_capacity(batch.len());
    for evaluation in batch {
        for (position, &observed) in evaluation.observed_maxima.iter().enumerate() {
            if observed > state.worst_observed[position] {
                state.worst_observed[position] = observed;
            }
        }
        state.civ_memory.consolidate(&evaluation.memory_delta);
        for (building, front) in evaluation.stand_alone_delta {
            state.stand_alone_systems.entry(building).or_insert(front);
        }
        state
            .evaluated
            .insert(evaluation.key.clone(), evaluation.district.best_combinations.clone());
        state.districts.insert(evaluation.key, evaluation.district);
        details.push(evaluation.details);
    }
    if let Some(tracker) = tracker {
        tracker.consolidate(details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::RunSettings;
    use crate::engine::context::fixtures::context_with;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn consolidation_memoizes_results_and_merges_deltas() {
        let mut settings = RunSettings::defaults();
        settings.algorithm.population = 4;
        settings.algorithm.generations_networks = 4;
        let context = context_with(settings, false);
        let mut rng = StdRng::seed_from_u64(13);
        let vector =
            ConnectivityVector::from_values(vec![1, 1, 0, 0], &context, &mut rng).unwrap();
        let mut state = SharedState::new(2);
        let reporter = ProgressReporter::new();
        let batch =
            evaluate_batch(std::slice::from_ref(&vector), &context, &state, 0, &reporter).unwrap();
        assert_eq!(batch.len(), 1);
        consolidate(&mut state, None, batch);
        assert!(state.is_memoized("1_1_0_0"));
        assert_eq!(state.stand_alone_systems.len(), 2);
        assert!(state.worst_observed.iter().all(|&w| w > 0.0));
        // the memoized result short-circuits the next generation
        assert!(state.districts.contains_key("1_1_0_0"));
    }
}
