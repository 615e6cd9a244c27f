//! The genotype of the inner genetic algorithm: one capacity indicator in
//! [0, 1] per candidate component of a supply-system structure, expressing
//! the installed share of that component's maximum viable capacity.
//!
//! E.g. if the structure allows a 2 MW vapour-compression chiller, an
//! indicator of 0.5 installs 1 MW of it in the evaluated configuration.

use crate::core::models::flows::Placement;
use crate::engine::config::{CapacityCrossover, CapacityMutation, GeneticAlgorithm};
use crate::engine::error::EngineError;
use crate::engine::fitness::{Fitness, fast_non_dominated_sort};
use crate::engine::utils::operators;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use tracing::warn;

/// Installed capacity may exceed the strict upstream requirement by this
/// factor before a component group counts as overdimensioned.
pub const OVERDIMENSIONING_FACTOR: f64 = 1.2;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One component's capacity indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityIndicator {
    pub category: Placement,
    pub code: String,
    pub main_carrier: String,
    value: f64,
}

impl CapacityIndicator {
    pub fn new(category: Placement, code: &str, main_carrier: &str) -> Self {
        Self {
            category,
            code: code.to_string(),
            main_carrier: main_carrier.to_string(),
            value: 1.0,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Values are clamped into [0, 1] and kept at two decimals so equal
    /// configurations compare equal.
    pub fn set_value(&mut self, value: f64) {
        if value > 1.0 {
            warn!("capacity indicators are capped at 1; {value} was clamped");
            self.value = 1.0;
        } else if value < 0.0 {
            warn!("capacity indicators cannot be negative; {value} was clamped");
            self.value = 0.0;
        } else {
            self.value = round2(value);
        }
    }
}

/// Which upstream components each (category, carrier) group of components
/// depends on, with the share of the group's sizing demand each upstream
/// component causes at full capacity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies {
    groups: BTreeMap<Placement, BTreeMap<String, DependencyGroup>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DependencyGroup {
    pub components: Vec<String>,
    pub factors: Vec<f64>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: Placement, carrier: &str, group: DependencyGroup) {
        self.groups
            .entry(category)
            .or_default()
            .insert(carrier.to_string(), group);
    }

    pub fn group(&self, category: Placement, carrier: &str) -> Option<&DependencyGroup> {
        self.groups.get(&category)?.get(carrier)
    }
}

/// The full indicator vector parameterizing one concrete supply system.
///
/// Structural equality and hashing cover categories, codes and values, so
/// the vector doubles as a cache key for evaluated configurations.
#[derive(Debug, Clone)]
pub struct CapacityIndicatorVector {
    indicators: Vec<CapacityIndicator>,
    dependencies: Dependencies,
}

impl PartialEq for CapacityIndicatorVector {
    fn eq(&self, other: &Self) -> bool {
        self.indicators == other.indicators
    }
}

impl Eq for CapacityIndicatorVector {}

impl Hash for CapacityIndicatorVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for indicator in &self.indicators {
            indicator.category.to_string().hash(state);
            indicator.code.hash(state);
            format!("{:.2}", indicator.value).hash(state);
        }
    }
}

impl CapacityIndicatorVector {
    pub fn new(indicators: Vec<CapacityIndicator>, dependencies: Dependencies) -> Self {
        Self {
            indicators,
            dependencies,
        }
    }

    pub fn indicators(&self) -> &[CapacityIndicator] {
        &self.indicators
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.indicators.iter().map(|i| i.value()).collect()
    }

    /// Assigns new values, correcting overdimensioned component groups.
    pub fn set_values(
        &mut self,
        values: Vec<f64>,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        if values.len() != self.indicators.len() {
            return Err(EngineError::Internal(format!(
                "capacity indicator vector length mismatch ({} != {})",
                values.len(),
                self.indicators.len()
            )));
        }
        let values = if self.any_group_overdimensioned(&values) {
            self.corrected_values(values, rng)
        } else {
            values
        };
        for (indicator, value) in self.indicators.iter_mut().zip(values) {
            indicator.set_value(value);
        }
        Ok(())
    }

    /// Same component categories and codes, values aside.
    pub fn matches_structure(&self, other: &CapacityIndicatorVector) -> bool {
        self.indicators.len() == other.indicators.len()
            && self
                .indicators
                .iter()
                .zip(&other.indicators)
                .all(|(a, b)| a.category == b.category && a.code == b.code)
    }

    fn group_keys(&self) -> Vec<(Placement, String)> {
        let mut keys = Vec::new();
        for indicator in &self.indicators {
            let key = (indicator.category, indicator.main_carrier.clone());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn any_group_overdimensioned(&self, values: &[f64]) -> bool {
        self.group_keys()
            .iter()
            .any(|(category, carrier)| self.group_breaches_bound(*category, carrier, values))
    }

    /// Cumulated indicator values of one (category, carrier) group may not
    /// exceed the group's upper bound times the overdimensioning factor.
    fn group_breaches_bound(&self, category: Placement, carrier: &str, values: &[f64]) -> bool {
        let cumulated: f64 = self
            .indicators
            .iter()
            .zip(values)
            .filter(|(i, _)| i.category == category && i.main_carrier == carrier)
            .map(|(_, &v)| v)
            .sum();
        round2(cumulated) > round2(self.upper_bound(category, carrier, values) * OVERDIMENSIONING_FACTOR)
    }

    /// 1 for primary groups; for downstream groups the dependency-weighted
    /// sum of the upstream components' current indicator values.
    fn upper_bound(&self, category: Placement, carrier: &str, values: &[f64]) -> f64 {
        if category == Placement::Primary {
            return 1.0;
        }
        let Some(group) = self.dependencies.group(category, carrier) else {
            return 1.0;
        };
        let bound = group
            .components
            .iter()
            .zip(&group.factors)
            .map(|(component, factor)| {
                let upstream = self
                    .indicators
                    .iter()
                    .zip(values)
                    .find(|(i, _)| &i.code == component)
                    .map(|(_, &v)| v)
                    .unwrap_or(0.0);
                factor * upstream
            })
            .sum();
        round2(bound)
    }

    /// Lowers the smallest non-zero indicator of every breaching group (ties
    /// broken at random) until all groups meet their bounds, propagating the
    /// recheck downstream.
    fn corrected_values(&self, mut values: Vec<f64>, rng: &mut impl Rng) -> Vec<f64> {
        loop {
            let breaching: Vec<(Placement, String)> = self
                .group_keys()
                .into_iter()
                .filter(|(category, carrier)| self.group_breaches_bound(*category, carrier, &values))
                .collect();
            if breaching.is_empty() {
                return values;
            }
            for (category, carrier) in breaching {
                while self.group_breaches_bound(category, &carrier, &values) {
                    let members: Vec<usize> = self
                        .indicators
                        .iter()
                        .enumerate()
                        .filter(|(position, indicator)| {
                            indicator.category == category
                                && indicator.main_carrier == carrier
                                && values[*position] > 0.0
                        })
                        .map(|(position, _)| position)
                        .collect();
                    if members.is_empty() {
                        break;
                    }
                    let low = members
                        .iter()
                        .map(|&m| values[m])
                        .fold(f64::INFINITY, f64::min);
                    let lowest: Vec<usize> = members
                        .iter()
                        .copied()
                        .filter(|&m| values[m] == low)
                        .collect();
                    let target = *lowest
                        .choose(rng)
                        .expect("a breaching group has non-zero members");
                    let group_sum: f64 = members.iter().map(|&m| values[m]).sum();
                    let bound = self.upper_bound(category, &carrier, &values)
                        * OVERDIMENSIONING_FACTOR;
                    let corrected = values[target] - (group_sum - bound);
                    values[target] = round2(corrected.max(0.0));
                }
            }
        }
    }

    /// Draws a fresh vector for the structure, either uniformly at random or
    /// recalled from the memory of previously optimal configurations.
    pub fn generate(
        structure: &CapacityIndicatorVector,
        memory: Option<&CapacityVectorMemory>,
        max_system_demand: f64,
        rng: &mut impl Rng,
    ) -> Result<CapacityIndicatorVector, EngineError> {
        let mut vector = structure.clone();
        if let Some(memory) = memory {
            if let Some(values) = memory.recall(max_system_demand, structure, rng) {
                vector.set_values(values, rng)?;
                return Ok(vector);
            }
        }
        let values = (0..vector.len())
            .map(|_| rng.gen_range(0..=100) as f64 / 100.0)
            .collect();
        vector.set_values(values, rng)?;
        Ok(vector)
    }

    /// Mutates the vector in place with the configured operator.
    pub fn mutate(
        &mut self,
        algorithm: &GeneticAlgorithm,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        let mut values = self.values();
        match algorithm.capacity_mutation {
            CapacityMutation::UniformBounded => {
                let mut percentages: Vec<u16> =
                    values.iter().map(|v| (v * 100.0).round() as u16).collect();
                operators::mut_uniform_int(&mut percentages, 0, 100, algorithm.mut_prob, rng);
                values = percentages.iter().map(|&p| p as f64 / 100.0).collect();
            }
            CapacityMutation::PolynomialBounded => {
                operators::mut_polynomial_bounded(
                    &mut values,
                    algorithm.mut_eta,
                    0.0,
                    1.0,
                    algorithm.mut_prob,
                    rng,
                );
            }
        }
        self.set_values(values, rng)
    }

    /// Recombines two vectors in place with the configured operator.
    pub fn mate(
        first: &mut Self,
        second: &mut Self,
        algorithm: &GeneticAlgorithm,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        let mut a = first.values();
        let mut b = second.values();
        match algorithm.capacity_crossover {
            CapacityCrossover::OnePoint => operators::cx_one_point(&mut a, &mut b, rng),
            CapacityCrossover::TwoPoint => operators::cx_two_point(&mut a, &mut b, rng),
            CapacityCrossover::Uniform => {
                operators::cx_uniform(&mut a, &mut b, algorithm.cx_prob, rng)
            }
        }
        first.set_values(a, rng)?;
        second.set_values(b, rng)
    }
}

/// Memory of the best capacity indicator vectors found for comparable
/// system sizes, bracketed by peak system demand.
///
/// Seeding a subsystem's inner search from the bracket closest to its demand
/// spares the search from rediscovering the same capacity mixes for every
/// candidate network.
#[derive(Debug, Clone, Default)]
pub struct CapacityVectorMemory {
    max_district_energy_demand: Option<f64>,
    nbr_of_brackets: usize,
    brackets: Vec<(f64, Vec<(CapacityIndicatorVector, Fitness)>)>,
}

impl CapacityVectorMemory {
    pub fn new(max_district_energy_demand: Option<f64>) -> Self {
        let nbr_of_brackets = 20;
        let brackets = match max_district_energy_demand {
            Some(maximum) => Self::create_brackets(maximum, nbr_of_brackets),
            None => Vec::new(),
        };
        Self {
            max_district_energy_demand,
            nbr_of_brackets,
            brackets,
        }
    }

    fn create_brackets(maximum: f64, count: usize) -> Vec<(f64, Vec<(CapacityIndicatorVector, Fitness)>)> {
        (0..count)
            .map(|i| {
                let low = maximum * i as f64 / count as f64;
                let high = maximum * (i + 1) as f64 / count as f64;
                let median = ((low + high) / 2.0 * 1000.0).round() / 1000.0;
                (median, Vec::new())
            })
            .collect()
    }

    fn bracket_index(&self, demand: f64) -> Option<usize> {
        self.brackets
            .iter()
            .enumerate()
            .min_by(|a, b| {
                (a.1.0 - demand).abs().total_cmp(&(b.1.0 - demand).abs())
            })
            .map(|(index, _)| index)
    }

    /// Stores a front of optimal vectors in the bracket matching the system
    /// demand; up to two adjacent untouched brackets inherit the same set.
    pub fn update(
        &mut self,
        max_system_demand: f64,
        optimal: Vec<(CapacityIndicatorVector, Fitness)>,
    ) {
        let Some(index) = self.bracket_index(max_system_demand) else {
            return;
        };
        let former = std::mem::take(&mut self.brackets[index].1);
        self.brackets[index].1 = optimal.clone();

        for offset in 1..=2usize {
            let Some(lower) = index.checked_sub(offset) else {
                break;
            };
            if !self.brackets[lower].1.is_empty() && self.brackets[lower].1 != former {
                break;
            }
            self.brackets[lower].1 = optimal.clone();
        }
        for offset in 1..=2usize {
            let upper = index + offset;
            if upper >= self.brackets.len() {
                break;
            }
            if !self.brackets[upper].1.is_empty() && self.brackets[upper].1 != former {
                break;
            }
            self.brackets[upper].1 = optimal.clone();
        }
    }

    /// Recalls a random structure-matching vector from the bracket closest
    /// to the demand.
    pub fn recall(
        &self,
        max_system_demand: f64,
        structure: &CapacityIndicatorVector,
        rng: &mut impl Rng,
    ) -> Option<Vec<f64>> {
        let index = self.bracket_index(max_system_demand)?;
        let matching: Vec<&CapacityIndicatorVector> = self.brackets[index]
            .1
            .iter()
            .map(|(vector, _)| vector)
            .filter(|vector| vector.matches_structure(structure))
            .collect();
        matching.choose(rng).map(|vector| vector.values())
    }

    pub fn clear(&mut self) {
        for (_, bracket) in &mut self.brackets {
            bracket.clear();
        }
    }

    /// Merges another memory (e.g. one returned by a parallel evaluation
    /// task), keeping the non-dominated set per bracket.
    pub fn consolidate(&mut self, other: &CapacityVectorMemory) {
        if self.max_district_energy_demand.is_none() {
            self.max_district_energy_demand = other.max_district_energy_demand;
            self.nbr_of_brackets = other.nbr_of_brackets;
            if let Some(maximum) = self.max_district_energy_demand {
                self.brackets = Self::create_brackets(maximum, self.nbr_of_brackets);
            }
        }
        for (position, (_, bracket)) in self.brackets.iter_mut().enumerate() {
            let Some((_, additions)) = other.brackets.get(position) else {
                continue;
            };
            let mut combined: Vec<(CapacityIndicatorVector, Fitness)> = bracket.clone();
            for addition in additions {
                if !combined.contains(addition) {
                    combined.push(addition.clone());
                }
            }
            if combined.is_empty() {
                continue;
            }
            let fitnesses: Vec<&Fitness> = combined.iter().map(|(_, f)| f).collect();
            let fronts = fast_non_dominated_sort(&fitnesses);
            let first_front = &fronts[0];
            *bracket = first_front
                .iter()
                .map(|&index| combined[index].clone())
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    /// primary: VCC1 + VCC2 on T10W; secondary: BO2 on T90W feeding VCC2
    fn structure_vector() -> CapacityIndicatorVector {
        let indicators = vec![
            CapacityIndicator::new(Placement::Primary, "VCC1", "T10W"),
            CapacityIndicator::new(Placement::Primary, "VCC2", "T10W"),
            CapacityIndicator::new(Placement::Secondary, "BO2", "T90W"),
        ];
        let mut dependencies = Dependencies::new();
        dependencies.insert(
            Placement::Secondary,
            "T90W",
            DependencyGroup {
                components: vec!["VCC2".to_string()],
                factors: vec![1.0],
            },
        );
        CapacityIndicatorVector::new(indicators, dependencies)
    }

    #[test]
    fn values_clamp_and_round() {
        let mut indicator = CapacityIndicator::new(Placement::Primary, "VCC1", "T10W");
        indicator.set_value(1.7);
        assert_eq!(indicator.value(), 1.0);
        indicator.set_value(-0.3);
        assert_eq!(indicator.value(), 0.0);
        indicator.set_value(0.333);
        assert_eq!(indicator.value(), 0.33);
    }

    #[test]
    fn overdimensioned_primary_groups_are_corrected() {
        let mut vector = structure_vector();
        // primary group sums to 2.0 > 1.0 * 1.2
        vector.set_values(vec![1.0, 1.0, 0.5], &mut rng()).unwrap();
        let primary_sum: f64 = vector.values()[..2].iter().sum();
        assert!(primary_sum <= 1.2 + 1e-9);
    }

    #[test]
    fn downstream_bounds_follow_upstream_indicators() {
        let mut vector = structure_vector();
        // secondary bound = VCC2 value (0.2) * 1.2 = 0.24
        vector.set_values(vec![0.8, 0.2, 0.9], &mut rng()).unwrap();
        assert!(vector.values()[2] <= 0.24 + 1e-9);
    }

    #[test]
    fn structure_matching_ignores_values() {
        let mut a = structure_vector();
        let b = structure_vector();
        a.set_values(vec![0.1, 0.2, 0.1], &mut rng()).unwrap();
        assert!(a.matches_structure(&b));
    }

    #[test]
    fn generation_yields_feasible_vectors() {
        let structure = structure_vector();
        let mut rng = rng();
        for _ in 0..50 {
            let vector =
                CapacityIndicatorVector::generate(&structure, None, 100.0, &mut rng).unwrap();
            assert!(!vector.any_group_overdimensioned(&vector.values()));
        }
    }

    #[test]
    fn memory_recall_prefers_the_nearest_bracket() {
        let mut memory = CapacityVectorMemory::new(Some(1000.0));
        let mut stored = structure_vector();
        let mut rng = rng();
        stored.set_values(vec![0.6, 0.4, 0.3], &mut rng).unwrap();
        memory.update(120.0, vec![(stored.clone(), Fitness::new(vec![1.0]))]);
        let recalled = memory.recall(110.0, &structure_vector(), &mut rng);
        assert_eq!(recalled, Some(stored.values()));
        // far-away brackets stay empty
        assert_eq!(memory.recall(900.0, &structure_vector(), &mut rng), None);
    }

    #[test]
    fn consolidation_keeps_the_non_dominated_set_per_bracket() {
        let mut rng = rng();
        let mut a = CapacityVectorMemory::new(Some(1000.0));
        let mut b = CapacityVectorMemory::new(Some(1000.0));
        let mut good = structure_vector();
        good.set_values(vec![0.5, 0.5, 0.4], &mut rng).unwrap();
        let mut bad = structure_vector();
        bad.set_values(vec![0.9, 0.3, 0.2], &mut rng).unwrap();
        a.update(100.0, vec![(bad.clone(), Fitness::new(vec![2.0, 2.0]))]);
        b.update(100.0, vec![(good.clone(), Fitness::new(vec![1.0, 1.0]))]);
        a.consolidate(&b);
        let recalled = a.recall(100.0, &structure_vector(), &mut rng);
        assert_eq!(recalled, Some(good.values()));
    }
}
