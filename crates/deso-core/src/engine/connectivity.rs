//! The genotype of the outer genetic algorithm: one network-assignment
//! value per building in the domain.
//!
//! E.g. with 8 buildings and up to 2 networks, the vector
//! `[0, 1, 0, 0, 2, 1, 1, 2]` connects buildings 2, 6 and 7 to network 1,
//! buildings 5 and 8 to network 2, and leaves the rest stand-alone. Vectors
//! describing the same partition under a relabeling of network ids are
//! brought onto one canonical encoding so no duplicate topology is ever
//! evaluated twice.

use crate::engine::config::{ConnectivityCrossover, ConnectivityMutation, OverlapCorrection};
use crate::engine::context::DomainContext;
use crate::engine::district::SystemCombination;
use crate::engine::error::EngineError;
use crate::engine::fitness::{Fitness, fast_non_dominated_sort};
use crate::engine::network::Network;
use crate::engine::tracker::OptimizationTracker;
use crate::engine::utils::operators;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

/// One building's network assignment: 0 is stand-alone, `k > 0` membership
/// in network `k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub building: String,
    pub network: u16,
}

impl Connection {
    /// Validates the assignment against the domain: the network id must be
    /// in range and the building known. Zero-demand buildings always
    /// collapse to stand-alone.
    pub fn new(network: u16, building: &str, context: &DomainContext) -> Result<Self, EngineError> {
        if network > context.max_networks() {
            return Err(EngineError::Connectivity(format!(
                "network connection indicators need to lie in [0, {}]; tried to assign {network}",
                context.max_networks()
            )));
        }
        if !context.contains_building(building) {
            return Err(EngineError::Connectivity(format!(
                "'{building}' is not a building of this domain"
            )));
        }
        let network = if context.is_zero_demand(building) {
            0
        } else {
            network
        };
        Ok(Self {
            building: building.to_string(),
            network,
        })
    }
}

/// The ordered sequence of [`Connection`]s, one per building in domain
/// order.
///
/// Any assignment of new values runs the full validation pipeline: networks
/// of one building collapse to stand-alone, geometric overlaps between the
/// implied networks are corrected (when configured), and the vector is
/// stabilised onto its canonical encoding. Equality and hashing follow the
/// canonical values, which makes the vector directly usable as a
/// memoization key.
#[derive(Debug, Clone)]
pub struct ConnectivityVector {
    connections: Vec<Connection>,
}

impl PartialEq for ConnectivityVector {
    fn eq(&self, other: &Self) -> bool {
        self.values() == other.values()
    }
}

impl Eq for ConnectivityVector {}

impl Hash for ConnectivityVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values().hash(state);
    }
}

impl ConnectivityVector {
    pub fn new(
        connections: Vec<Connection>,
        context: &DomainContext,
        rng: &mut impl Rng,
    ) -> Result<Self, EngineError> {
        let values = connections.iter().map(|c| c.network).collect();
        let mut vector = Self { connections };
        vector.apply_values(values, context, rng)?;
        Ok(vector)
    }

    /// Builds a vector from raw per-building values in domain order.
    pub fn from_values(
        values: Vec<u16>,
        context: &DomainContext,
        rng: &mut impl Rng,
    ) -> Result<Self, EngineError> {
        let ids = context.ordered_building_ids();
        if values.len() != ids.len() {
            return Err(EngineError::Connectivity(format!(
                "a connectivity vector needs one value per building ({} != {})",
                values.len(),
                ids.len()
            )));
        }
        let connections = ids
            .iter()
            .zip(&values)
            .map(|(building, &network)| Connection::new(network, building, context))
            .collect::<Result<Vec<_>, _>>()?;
        let mut vector = Self { connections };
        vector.apply_values(values, context, rng)?;
        Ok(vector)
    }

    /// A vector with uniformly random assignments.
    pub fn generate(context: &DomainContext, rng: &mut impl Rng) -> Result<Self, EngineError> {
        let max = context.max_networks();
        let values = (0..context.building_count())
            .map(|_| rng.gen_range(0..=max))
            .collect();
        Self::from_values(values, context, rng)
    }

    /// The vector connecting the whole domain to one network.
    pub fn full_network(context: &DomainContext, rng: &mut impl Rng) -> Result<Self, EngineError> {
        Self::from_values(vec![1; context.building_count()], context, rng)
    }

    /// The as-built connectivity state from the buildings' initial
    /// designations, the permanently included reference individual.
    pub fn from_initial_state(
        context: &DomainContext,
        rng: &mut impl Rng,
    ) -> Result<Self, EngineError> {
        use crate::core::models::buildings::InitialConnectivity;
        let named: BTreeSet<String> = context
            .buildings()
            .filter_map(|b| match &b.initial_connectivity {
                InitialConnectivity::Named(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        if named.len() > context.max_networks() as usize {
            return Err(EngineError::Connectivity(format!(
                "the as-built layout uses {} networks but the optimization allows at most {}; \
                 raise maximum_number_of_networks",
                named.len(),
                context.max_networks()
            )));
        }
        let index_of: BTreeMap<&String, u16> = named
            .iter()
            .enumerate()
            .map(|(i, name)| (name, i as u16 + 1))
            .collect();
        let values = context
            .buildings()
            .map(|b| match &b.initial_connectivity {
                InitialConnectivity::StandAlone => 0,
                InitialConnectivity::AnyNetwork => 1,
                InitialConnectivity::Named(name) => index_of[name],
            })
            .collect();
        Self::from_values(values, context, rng)
    }

    pub fn values(&self) -> Vec<u16> {
        self.connections.iter().map(|c| c.network).collect()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Identifiers of the networks this vector implies.
    pub fn network_indexes(&self) -> BTreeSet<u16> {
        self.connections
            .iter()
            .map(|c| c.network)
            .filter(|&n| n != 0)
            .collect()
    }

    pub fn stand_alone_buildings(&self) -> Vec<String> {
        self.connections
            .iter()
            .filter(|c| c.network == 0)
            .map(|c| c.building.clone())
            .collect()
    }

    /// The canonical string encoding, used as the memoization key.
    pub fn as_str(&self) -> String {
        self.values()
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join("_")
    }

    /// A short hex digest of the canonical encoding, safe for file names.
    pub fn file_key(&self) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.values().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Re-assigns the vector's values, running the full validation pipeline.
    pub fn set_values(
        &mut self,
        values: Vec<u16>,
        context: &DomainContext,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        if values.len() != self.connections.len() {
            return Err(EngineError::Connectivity(
                "new values need to match the length of the connectivity vector".to_string(),
            ));
        }
        self.apply_values(values, context, rng)
    }

    fn apply_values(
        &mut self,
        mut values: Vec<u16>,
        context: &DomainContext,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        let max = context.max_networks();
        for (connection, value) in self.connections.iter().zip(&values) {
            if *value > max {
                return Err(EngineError::Connectivity(format!(
                    "network connection indicators need to lie in [0, {max}]; tried to assign \
                     {value} to '{}'",
                    connection.building
                )));
            }
        }
        for (position, connection) in self.connections.iter().enumerate() {
            if context.is_zero_demand(&connection.building) {
                values[position] = 0;
            }
        }

        collapse_single_member_networks(&mut values);

        if context.settings.algorithm.overlap_correction.is_enabled() {
            correct_for_network_overlaps(context, &mut values, rng)?;
            // cutting can orphan buildings into one-member networks
            collapse_single_member_networks(&mut values);
        }

        let values = Self::stabilise(&values);
        for (connection, value) in self.connections.iter_mut().zip(values) {
            connection.network = value;
        }
        Ok(())
    }

    /// Canonicalizes a value sequence so that all relabelings of the same
    /// building partition compare equal:
    ///
    /// 1. the used network ids are rebased onto the smallest contiguous set
    ///    starting at 0,
    /// 2. more-populous networks receive lower ids,
    /// 3. ids of equally populous networks are ordered by first appearance.
    pub fn stabilise(values: &[u16]) -> Vec<u16> {
        let mut distinct: BTreeSet<u16> = values.iter().copied().collect();
        distinct.insert(0);
        let rank: BTreeMap<u16, u16> = distinct
            .iter()
            .enumerate()
            .map(|(position, &value)| (value, position as u16))
            .collect();
        let rebased: Vec<u16> = values.iter().map(|value| rank[value]).collect();

        let mut count: BTreeMap<u16, usize> = BTreeMap::new();
        let mut first_appearance: BTreeMap<u16, usize> = BTreeMap::new();
        for (position, &value) in rebased.iter().enumerate() {
            if value != 0 {
                *count.entry(value).or_insert(0) += 1;
                first_appearance.entry(value).or_insert(position);
            }
        }
        let mut ids: Vec<u16> = count.keys().copied().collect();
        ids.sort_by_key(|id| (Reverse(count[id]), first_appearance[id]));
        let relabel: BTreeMap<u16, u16> = ids
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position as u16 + 1))
            .collect();

        rebased
            .into_iter()
            .map(|value| if value == 0 { 0 } else { relabel[&value] })
            .collect()
    }

    /// Mutates the vector in place with the configured operator.
    pub fn mutate(
        &mut self,
        context: &DomainContext,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        let algorithm = &context.settings.algorithm;
        let mut values = self.values();
        match algorithm.connectivity_mutation {
            ConnectivityMutation::ShuffleIndexes => {
                operators::mut_shuffle_indexes(&mut values, algorithm.mut_prob, rng);
            }
            ConnectivityMutation::UniformInteger => {
                operators::mut_uniform_int(
                    &mut values,
                    0,
                    context.max_networks(),
                    algorithm.mut_prob,
                    rng,
                );
            }
            ConnectivityMutation::ClusterSwitch => {
                mut_cluster_switch(&mut values, context, algorithm.mut_prob, rng)?;
            }
        }
        self.apply_values(values, context, rng)
    }

    /// Recombines two vectors in place with the configured operator.
    pub fn mate(
        first: &mut Self,
        second: &mut Self,
        context: &DomainContext,
        rng: &mut impl Rng,
    ) -> Result<(), EngineError> {
        let algorithm = &context.settings.algorithm;
        let mut a = first.values();
        let mut b = second.values();
        match algorithm.connectivity_crossover {
            ConnectivityCrossover::OnePoint => operators::cx_one_point(&mut a, &mut b, rng),
            ConnectivityCrossover::TwoPoint => operators::cx_two_point(&mut a, &mut b, rng),
            ConnectivityCrossover::Uniform => {
                operators::cx_uniform(&mut a, &mut b, algorithm.cx_prob, rng)
            }
            ConnectivityCrossover::ClusterSwap => {
                cx_cluster_swap(&mut a, &mut b, context, algorithm.cx_prob, rng)?;
            }
            ConnectivityCrossover::ClusterAlignment => {
                cx_cluster_alignment(&mut a, &mut b, context, algorithm.cx_prob, rng)?;
            }
        }
        first.apply_values(a, context, rng)?;
        second.apply_values(b, context, rng)
    }

    /// Selects the next population by non-dominated sorting over the pooled
    /// energy-system solutions of all candidates.
    ///
    /// Every supply-system combination competes in one pool; a connectivity
    /// vector survives as soon as any of its combinations appears in a
    /// sufficiently low-order front. Selection pressure therefore acts on
    /// the product space of topology and technology choice.
    pub fn select(
        individuals: Vec<ConnectivityVector>,
        solutions: &BTreeMap<String, Vec<SystemCombination>>,
        population_size: usize,
        tracker: Option<&mut OptimizationTracker>,
    ) -> Vec<ConnectivityVector> {
        let mut individual_dict: BTreeMap<String, ConnectivityVector> = individuals
            .into_iter()
            .map(|vector| (vector.as_str(), vector))
            .collect();

        let pooled: Vec<&SystemCombination> = solutions.values().flatten().collect();
        let fitnesses: Vec<&Fitness> = pooled.iter().map(|c| &c.fitness).collect();
        let fronts = fast_non_dominated_sort(&fitnesses);

        let mut new_population = Vec::new();
        'fronts: for front in &fronts {
            for &index in front {
                if new_population.len() >= population_size {
                    break 'fronts;
                }
                let owner = &pooled[index].encoding[0];
                if let Some(vector) = individual_dict.remove(owner) {
                    new_population.push(vector);
                }
            }
        }

        if let Some(tracker) = tracker {
            tracker.update_selection(&new_population, &pooled, &fronts);
        }
        new_population
    }
}

/// Network ids used by exactly one building are not networks; their member
/// falls back to stand-alone.
fn collapse_single_member_networks(values: &mut [u16]) {
    let mut count: BTreeMap<u16, usize> = BTreeMap::new();
    for &value in values.iter() {
        if value != 0 {
            *count.entry(value).or_insert(0) += 1;
        }
    }
    for value in values.iter_mut() {
        if *value != 0 && count[value] == 1 {
            *value = 0;
        }
    }
}

enum OverlapAction {
    Merge,
    Cut,
    Delete,
    Ignore,
}

/// Builds the candidate networks, then repeatedly resolves overlaps with
/// the configured strategy until none remain, and writes the resulting
/// assignment back into the value vector.
fn correct_for_network_overlaps(
    context: &DomainContext,
    values: &mut [u16],
    rng: &mut impl Rng,
) -> Result<(), EngineError> {
    let network_ids: BTreeSet<u16> = values.iter().copied().filter(|&v| v != 0).collect();
    if network_ids.len() < 2 {
        return Ok(());
    }
    let ordered_ids = context.ordered_building_ids();
    let mut networks: BTreeMap<u16, Network> = BTreeMap::new();
    for &network_id in &network_ids {
        networks.insert(
            network_id,
            Network::build_network(network_id, &ordered_ids, values, &context.substrate)?,
        );
    }

    let mut overlaps = Network::identify_overlapping_networks(&networks);
    if overlaps.is_empty() {
        return Ok(());
    }

    // under the weighted policy one action is drawn and then applied until
    // the layout is clean
    let action = match context.settings.algorithm.overlap_correction {
        OverlapCorrection::MergeOnOverlap => OverlapAction::Merge,
        OverlapCorrection::CutOnOverlap => OverlapAction::Cut,
        OverlapCorrection::DeleteOnOverlap => OverlapAction::Delete,
        OverlapCorrection::Random(weights) => {
            let distribution = WeightedIndex::new([
                weights.merge,
                weights.cut,
                weights.delete,
                weights.ignore,
            ])
            .map_err(|e| EngineError::Internal(format!("invalid overlap weights: {e}")))?;
            match distribution.sample(rng) {
                0 => OverlapAction::Merge,
                1 => OverlapAction::Cut,
                2 => OverlapAction::Delete,
                _ => OverlapAction::Ignore,
            }
        }
        OverlapCorrection::Disabled => return Ok(()),
    };

    while !overlaps.is_empty() {
        let with_overlap: Vec<u16> = overlaps.keys().copied().collect();
        let retain = *with_overlap
            .choose(rng)
            .expect("the overlap map is not empty");
        let others: Vec<u16> = overlaps[&retain].keys().copied().collect();
        match action {
            OverlapAction::Merge => Network::merge_networks(&mut networks, retain, &others),
            OverlapAction::Cut => {
                Network::cut_networks_on_overlap(&mut networks, &overlaps[&retain], retain)
            }
            OverlapAction::Delete => Network::delete_networks(&mut networks, &others),
            OverlapAction::Ignore => break,
        }
        overlaps = Network::identify_overlapping_networks(&networks);
    }

    let assignments = Network::building_assignments(&networks);
    for (position, building) in ordered_ids.iter().enumerate() {
        values[position] = assignments.get(building).copied().unwrap_or(0);
    }
    Ok(())
}

/// Cluster-aware mutation: all buildings of a cluster switch to one new
/// value, each with probability `mut_prob`; outliers mutate independently.
fn mut_cluster_switch(
    values: &mut [u16],
    context: &DomainContext,
    mut_prob: f64,
    rng: &mut impl Rng,
) -> Result<(), EngineError> {
    let clusters = cluster_indexes(context)?;
    let max = context.max_networks();
    let distinct: BTreeSet<i32> = clusters.iter().copied().collect();
    for &cluster in distinct.iter().filter(|&&c| c >= 0) {
        let new_value = rng.gen_range(0..=max);
        for (position, &index) in clusters.iter().enumerate() {
            if index == cluster && rng.r#gen::<f64>() < mut_prob {
                values[position] = new_value;
            }
        }
    }
    if distinct.iter().any(|&c| c < 0) {
        for (position, &index) in clusters.iter().enumerate() {
            if index < 0 && rng.r#gen::<f64>() < mut_prob {
                values[position] = rng.gen_range(0..=max);
            }
        }
    }
    Ok(())
}

/// Cluster-aware crossover: whole clusters exchange their values between the
/// two parents with probability `cx_prob`. Outliers remain untouched.
fn cx_cluster_swap(
    a: &mut [u16],
    b: &mut [u16],
    context: &DomainContext,
    cx_prob: f64,
    rng: &mut impl Rng,
) -> Result<(), EngineError> {
    let clusters = cluster_indexes(context)?;
    let distinct: BTreeSet<i32> = clusters.iter().copied().filter(|&c| c >= 0).collect();
    for &cluster in &distinct {
        if rng.r#gen::<f64>() >= cx_prob {
            continue;
        }
        for (position, &index) in clusters.iter().enumerate() {
            if index == cluster {
                std::mem::swap(&mut a[position], &mut b[position]);
            }
        }
    }
    Ok(())
}

/// Cluster-alignment crossover: swaps exactly the building values whose
/// exchange aligns each parent's cluster with the other parent's locally
/// dominant connectivity value.
fn cx_cluster_alignment(
    a: &mut [u16],
    b: &mut [u16],
    context: &DomainContext,
    cx_prob: f64,
    rng: &mut impl Rng,
) -> Result<(), EngineError> {
    let clusters = cluster_indexes(context)?;
    let prevailing_a = prevailing_values(a, clusters);
    let prevailing_b = prevailing_values(b, clusters);
    for position in 0..a.len() {
        let (Some(prevails_a), Some(prevails_b)) = (prevailing_a[position], prevailing_b[position])
        else {
            continue;
        };
        if a[position] == prevails_b && b[position] == prevails_a && rng.r#gen::<f64>() < cx_prob {
            std::mem::swap(&mut a[position], &mut b[position]);
        }
    }
    Ok(())
}

/// The most frequent connectivity value of each building's cluster, `None`
/// for outliers. Frequency ties resolve to the smaller value.
fn prevailing_values(values: &[u16], clusters: &[i32]) -> Vec<Option<u16>> {
    let mut prevailing = vec![None; values.len()];
    let distinct: BTreeSet<i32> = clusters.iter().copied().filter(|&c| c >= 0).collect();
    for &cluster in &distinct {
        let mut count: BTreeMap<u16, usize> = BTreeMap::new();
        for (position, &index) in clusters.iter().enumerate() {
            if index == cluster {
                *count.entry(values[position]).or_insert(0) += 1;
            }
        }
        let Some((&value, _)) = count.iter().max_by(|x, y| x.1.cmp(y.1).then(y.0.cmp(x.0))) else {
            continue;
        };
        for (position, &index) in clusters.iter().enumerate() {
            if index == cluster {
                prevailing[position] = Some(value);
            }
        }
    }
    prevailing
}

fn cluster_indexes(context: &DomainContext) -> Result<&[i32], EngineError> {
    context
        .clusters
        .as_deref()
        .ok_or_else(|| {
            EngineError::Internal(
                "a cluster-aware operator is configured but no clustering was computed".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::fixtures::{context_with, default_context};
    use crate::engine::config::RunSettings;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn stabilisation_is_idempotent() {
        for raw in [
            vec![0u16, 1, 3, 3, 3, 0, 1, 2, 3, 1, 2],
            vec![2, 2, 1, 1, 0, 0],
            vec![0, 0, 0, 0],
            vec![3, 3, 3, 3],
        ] {
            let once = ConnectivityVector::stabilise(&raw);
            let twice = ConnectivityVector::stabilise(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn stabilisation_is_invariant_under_relabeling() {
        let raw = vec![0u16, 1, 2, 2, 1, 1, 0, 2];
        // swap labels 1 and 2
        let relabeled: Vec<u16> = raw
            .iter()
            .map(|&v| match v {
                1 => 2,
                2 => 1,
                other => other,
            })
            .collect();
        assert_eq!(
            ConnectivityVector::stabilise(&raw),
            ConnectivityVector::stabilise(&relabeled)
        );
    }

    #[test]
    fn more_populous_networks_take_lower_ids() {
        let raw = vec![0u16, 1, 3, 3, 3, 0, 1, 2, 3, 1, 2];
        // network 3 has four members, 1 has three, 2 has two
        assert_eq!(
            ConnectivityVector::stabilise(&raw),
            vec![0, 2, 1, 1, 1, 0, 2, 3, 1, 2, 3]
        );
    }

    #[test]
    fn equal_counts_are_ordered_by_first_appearance() {
        let raw = vec![0u16, 1, 1, 3, 2, 3, 2, 0, 1, 1, 0];
        assert_eq!(
            ConnectivityVector::stabilise(&raw),
            vec![0, 1, 1, 2, 3, 2, 3, 0, 1, 1, 0]
        );
    }

    #[test]
    fn already_canonical_vectors_pass_through() {
        // [MODULE] scenario: 4 buildings, max one network, raw [1,1,0,0]
        let mut settings = RunSettings::defaults();
        settings.algorithm.maximum_number_of_networks = 1;
        let context = context_with(settings, false);
        let vector =
            ConnectivityVector::from_values(vec![1, 1, 0, 0], &context, &mut rng()).unwrap();
        assert_eq!(vector.values(), vec![1, 1, 0, 0]);
        assert_eq!(vector.as_str(), "1_1_0_0");
    }

    #[test]
    fn single_member_networks_collapse_and_rebase() {
        // raw [2,2,3,0]: id 3 has one member -> collapses; {0,2} rebases to
        // {0,1}
        let mut settings = RunSettings::defaults();
        settings.algorithm.maximum_number_of_networks = 3;
        let context = context_with(settings, false);
        let vector =
            ConnectivityVector::from_values(vec![2, 2, 3, 0], &context, &mut rng()).unwrap();
        assert_eq!(vector.values(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn out_of_range_and_unknown_buildings_fail_fast() {
        let context = default_context();
        assert!(ConnectivityVector::from_values(vec![7, 0, 0, 0], &context, &mut rng()).is_err());
        assert!(Connection::new(1, "B9999", &context).is_err());
        assert!(Connection::new(9, "B1001", &context).is_err());
    }

    #[test]
    fn zero_demand_buildings_stay_stand_alone() {
        let context = context_with(RunSettings::defaults(), true);
        let vector =
            ConnectivityVector::from_values(vec![1, 1, 1, 1], &context, &mut rng()).unwrap();
        assert_eq!(vector.values(), vec![1, 1, 1, 0]);
    }

    #[test]
    fn equal_vectors_hash_equal() {
        use std::collections::HashSet;
        let mut settings = RunSettings::defaults();
        settings.algorithm.maximum_number_of_networks = 2;
        let context = context_with(settings, false);
        let a = ConnectivityVector::from_values(vec![1, 1, 2, 2], &context, &mut rng()).unwrap();
        let b = ConnectivityVector::from_values(vec![2, 2, 1, 1], &context, &mut rng()).unwrap();
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn mutation_preserves_vector_validity() {
        let mut settings = RunSettings::defaults();
        settings.algorithm.mut_prob = 0.8;
        let context = context_with(settings, false);
        let mut rng = rng();
        let mut vector = ConnectivityVector::generate(&context, &mut rng).unwrap();
        for _ in 0..20 {
            vector.mutate(&context, &mut rng).unwrap();
            let values = vector.values();
            assert_eq!(ConnectivityVector::stabilise(&values), values);
            let mut count = BTreeMap::new();
            for &v in &values {
                if v != 0 {
                    *count.entry(v).or_insert(0usize) += 1;
                }
            }
            assert!(count.values().all(|&c| c >= 2));
        }
    }

    #[test]
    fn overlap_correction_leaves_no_overlapping_networks() {
        // raw [1,2,1,2] on the line domain routes network 1 through B1002's
        // node and network 2 through B1003's, so the candidate networks
        // share geometry under every correction method
        for method in [
            OverlapCorrection::MergeOnOverlap,
            OverlapCorrection::CutOnOverlap,
            OverlapCorrection::DeleteOnOverlap,
        ] {
            let mut settings = RunSettings::defaults();
            settings.algorithm.maximum_number_of_networks = 2;
            settings.algorithm.overlap_correction = method;
            let context = context_with(settings, false);
            let mut rng = rng();
            let vector =
                ConnectivityVector::from_values(vec![1, 2, 1, 2], &context, &mut rng).unwrap();
            let values = vector.values();
            let ordered = context.ordered_building_ids();
            let mut networks = BTreeMap::new();
            for index in vector.network_indexes() {
                networks.insert(
                    index,
                    Network::build_network(index, &ordered, &values, &context.substrate).unwrap(),
                );
            }
            assert!(
                Network::identify_overlapping_networks(&networks).is_empty(),
                "{method:?} left an overlap in {values:?}"
            );
        }
    }

    #[test]
    fn selection_respects_the_population_size_and_input_union() {
        let mut settings = RunSettings::defaults();
        settings.algorithm.maximum_number_of_networks = 2;
        let context = context_with(settings, false);
        let mut rng = rng();
        let a = ConnectivityVector::from_values(vec![1, 1, 0, 0], &context, &mut rng).unwrap();
        let b = ConnectivityVector::from_values(vec![0, 1, 1, 0], &context, &mut rng).unwrap();
        let c = ConnectivityVector::from_values(vec![1, 1, 1, 1], &context, &mut rng).unwrap();
        let input_keys: BTreeSet<String> =
            [&a, &b, &c].iter().map(|v| v.as_str()).collect();

        let mut solutions: BTreeMap<String, Vec<SystemCombination>> = BTreeMap::new();
        solutions.insert(
            a.as_str(),
            vec![SystemCombination {
                encoding: vec![a.as_str(), "N1001-0".to_string()],
                fitness: Fitness::new(vec![1.0, 5.0]),
            }],
        );
        solutions.insert(
            b.as_str(),
            vec![SystemCombination {
                encoding: vec![b.as_str(), "N1001-0".to_string()],
                fitness: Fitness::new(vec![2.0, 6.0]),
            }],
        );
        solutions.insert(
            c.as_str(),
            vec![SystemCombination {
                encoding: vec![c.as_str(), "N1001-0".to_string()],
                fitness: Fitness::new(vec![5.0, 1.0]),
            }],
        );

        let selected =
            ConnectivityVector::select(vec![a, b, c], &solutions, 2, None);
        assert_eq!(selected.len(), 2);
        for vector in &selected {
            assert!(input_keys.contains(&vector.as_str()));
        }
        // b is dominated by a in both objectives and must not displace the
        // non-dominated pair
        let selected_keys: BTreeSet<String> = selected.iter().map(|v| v.as_str()).collect();
        assert!(selected_keys.contains("1_1_0_0"));
        assert!(selected_keys.contains("1_1_1_1"));
    }
}
