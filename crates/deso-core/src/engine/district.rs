use crate::core::models::flows::EnergyFlow;
use crate::engine::capacity::{CapacityIndicatorVector, CapacityVectorMemory};
use crate::engine::config::Objective;
use crate::engine::connectivity::ConnectivityVector;
use crate::engine::context::DomainContext;
use crate::engine::error::EngineError;
use crate::engine::fitness::{Fitness, fast_non_dominated_sort, select_nsga2};
use crate::engine::network::Network;
use crate::engine::structure::SupplySystemStructure;
use crate::engine::supply::SupplySystem;
use crate::engine::tracker::{CandidateDetails, NetworkDetail};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

/// Cap on the number of enumerated supply-system combinations per candidate.
const COMBINATION_LIMIT: usize = 256;

/// Non-viable candidates score the worst observed value times this factor
/// in every objective.
const PENALTY_FACTOR: f64 = 10.0;
/// Penalty before any viable candidate has been observed.
const PENALTY_BASELINE: f64 = 1e12;

/// One energy-system solution of a candidate: a specific choice of supply
/// system for each subsystem, with the combined fitness.
///
/// The encoding leads with the owning connectivity vector's canonical
/// string, followed by one `subsystem-index` token per subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemCombination {
    pub encoding: Vec<String>,
    pub fitness: Fitness,
}

/// The fitness a non-viable candidate receives instead of crashing the run
/// or silently vanishing from the population.
pub fn penalty_fitness(objective_count: usize, worst_observed: &[f64]) -> Fitness {
    Fitness::new(
        (0..objective_count)
            .map(|position| {
                let worst = worst_observed.get(position).copied().unwrap_or(0.0);
                if worst > 0.0 {
                    worst * PENALTY_FACTOR
                } else {
                    PENALTY_BASELINE
                }
            })
            .collect(),
    )
}

/// The full realization of one connectivity vector: its networks, its
/// stand-alone buildings and, after evaluation, the near-pareto-optimal
/// combinations of supply-system choices across all subsystems.
#[derive(Debug, Clone)]
pub struct DistrictEnergySystem {
    pub connectivity: ConnectivityVector,
    pub networks: Vec<Network>,
    pub stand_alone_buildings: Vec<String>,
    pub network_supply_systems: BTreeMap<String, Vec<SupplySystem>>,
    pub stand_alone_supply_systems: BTreeMap<String, Vec<SupplySystem>>,
    pub best_combinations: Vec<SystemCombination>,
}

impl DistrictEnergySystem {
    /// Realizes the networks and stand-alone building set a connectivity
    /// vector implies.
    pub fn from_connectivity(
        vector: &ConnectivityVector,
        context: &DomainContext,
    ) -> Result<Self, EngineError> {
        let ordered = context.ordered_building_ids();
        let values = vector.values();
        let mut networks = Vec::new();
        for index in vector.network_indexes() {
            networks.push(Network::build_network(
                index,
                &ordered,
                &values,
                &context.substrate,
            )?);
        }
        Ok(Self {
            connectivity: vector.clone(),
            stand_alone_buildings: vector.stand_alone_buildings(),
            networks,
            network_supply_systems: BTreeMap::new(),
            stand_alone_supply_systems: BTreeMap::new(),
            best_combinations: Vec::new(),
        })
    }

    /// Resolves one combination's encoding tokens back to the concrete
    /// supply systems, e.g. for result writing.
    pub fn select_supply_system_combination(
        &self,
        combination: &SystemCombination,
    ) -> Vec<(String, &SupplySystem)> {
        let mut selected = Vec::new();
        for token in &combination.encoding[1..] {
            let Some((subsystem, index)) = token.rsplit_once('-') else {
                continue;
            };
            let Ok(index) = index.parse::<usize>() else {
                continue;
            };
            let front = self
                .network_supply_systems
                .get(subsystem)
                .or_else(|| self.stand_alone_supply_systems.get(subsystem));
            if let Some(system) = front.and_then(|front| front.get(index)) {
                selected.push((subsystem.to_string(), system));
            }
        }
        selected
    }
}

/// The result of evaluating one candidate, together with the deltas the
/// coordinator folds back into the shared caches after a (possibly
/// parallel) batch.
#[derive(Debug)]
pub struct CandidateEvaluation {
    pub key: String,
    pub district: DistrictEnergySystem,
    pub viable: bool,
    pub memory_delta: CapacityVectorMemory,
    pub stand_alone_delta: BTreeMap<String, Vec<SupplySystem>>,
    /// Highest viable fitness value seen per objective; feeds the penalty
    /// scale for later non-viable candidates.
    pub observed_maxima: Vec<f64>,
    pub details: CandidateDetails,
}

/// Read view of the coordinator-side caches an evaluation may consult.
pub struct SharedCaches<'a> {
    pub civ_memory: &'a CapacityVectorMemory,
    pub stand_alone_systems: &'a BTreeMap<String, Vec<SupplySystem>>,
    pub worst_observed: &'a [f64],
}

/// Evaluates one connectivity candidate: builds its networks, runs the
/// inner search over capacity indicator vectors for every subsystem, and
/// combines the per-subsystem fronts into the candidate's best supply
/// system combinations.
///
/// A candidate whose subsystems cannot be served does not abort the run; it
/// receives a single penalty combination and stays in the population as a
/// dominated individual.
pub fn evaluate_candidate(
    vector: &ConnectivityVector,
    context: &DomainContext,
    shared: &SharedCaches<'_>,
    generation: usize,
) -> Result<CandidateEvaluation, EngineError> {
    let key = vector.as_str();
    let mut rng = candidate_rng(context.settings.algorithm.seed, &key, generation);
    let objectives = &context.settings.algorithm.objectives;

    let mut district = DistrictEnergySystem::from_connectivity(vector, context)?;
    let mut memory_delta = CapacityVectorMemory::new(Some(max_district_demand_kw(context)));
    let mut stand_alone_delta: BTreeMap<String, Vec<SupplySystem>> = BTreeMap::new();
    let mut details = CandidateDetails {
        connectivity: key.clone(),
        networks: Vec::new(),
    };
    let mut viable = true;

    // inner optimization per network
    let networks = district.networks.clone();
    for network in &networks {
        match optimize_network_subsystem(context, network, shared, &mut memory_delta, &mut rng) {
            Ok((front, detail)) => {
                details.networks.push(detail);
                district
                    .network_supply_systems
                    .insert(network.identifier.clone(), front);
            }
            Err(EngineError::Evaluation { .. }) | Err(EngineError::InfeasibleStructure { .. }) => {
                viable = false;
                break;
            }
            Err(error) => return Err(error),
        }
    }

    // stand-alone buildings reuse the shared per-building fronts
    if viable {
        for building in district.stand_alone_buildings.clone() {
            if context.is_zero_demand(&building) {
                continue;
            }
            if let Some(front) = shared.stand_alone_systems.get(&building) {
                district
                    .stand_alone_supply_systems
                    .insert(building.clone(), front.clone());
                continue;
            }
            match optimize_stand_alone_building(context, &building, shared, &mut rng) {
                Ok(front) => {
                    stand_alone_delta.insert(building.clone(), front.clone());
                    district.stand_alone_supply_systems.insert(building, front);
                }
                Err(EngineError::Evaluation { .. })
                | Err(EngineError::InfeasibleStructure { .. }) => {
                    viable = false;
                    break;
                }
                Err(error) => return Err(error),
            }
        }
    }

    if viable {
        district.best_combinations = combine_subsystem_fronts(&district, context, &key);
        viable = !district.best_combinations.is_empty();
    }
    if !viable {
        district.best_combinations = vec![SystemCombination {
            encoding: vec![key.clone(), "penalty".to_string()],
            fitness: penalty_fitness(objectives.len(), shared.worst_observed),
        }];
    }

    let observed_maxima = if viable {
        (0..objectives.len())
            .map(|position| {
                district
                    .best_combinations
                    .iter()
                    .map(|combination| combination.fitness.values()[position])
                    .fold(0.0, f64::max)
            })
            .collect()
    } else {
        vec![0.0; objectives.len()]
    };

    Ok(CandidateEvaluation {
        key,
        district,
        viable,
        memory_delta,
        stand_alone_delta,
        observed_maxima,
        details,
    })
}

/// Deterministic per-candidate seeding: results do not depend on which
/// worker evaluates which candidate.
fn candidate_rng(seed: u64, key: &str, generation: usize) -> StdRng {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    key.hash(&mut hasher);
    generation.hash(&mut hasher);
    StdRng::seed_from_u64(hasher.finish())
}

/// Peak demand of the whole domain, the scale of the capacity-vector
/// memory's brackets.
pub fn max_district_demand_kw(context: &DomainContext) -> f64 {
    context.buildings().map(|b| b.demand.peak()).sum()
}

fn optimize_network_subsystem(
    context: &DomainContext,
    network: &Network,
    shared: &SharedCaches<'_>,
    memory_delta: &mut CapacityVectorMemory,
    rng: &mut StdRng,
) -> Result<(Vec<SupplySystem>, NetworkDetail), EngineError> {
    let mut demand = aggregate_member_demand(context, &network.member_buildings)?;
    demand = demand.plus(&network.thermal_loss_flow(&context.demand_carrier))?;
    let potentials = pooled_potentials(context, &network.member_buildings);
    let structure =
        SupplySystemStructure::build(context, &network.identifier, &demand, potentials)?;

    let front = optimize_supply_system(context, &structure, &demand, shared, rng)?;
    memory_delta.update(
        demand.peak(),
        front
            .iter()
            .map(|system| {
                (
                    system.capacity_indicator_vector.clone(),
                    system.fitness.clone(),
                )
            })
            .collect(),
    );

    let detail = NetworkDetail {
        network: network.identifier.clone(),
        members: network.member_buildings.clone(),
        max_capacities: structure
            .capacity_indicators
            .indicators()
            .iter()
            .map(|indicator| {
                let capacity = structure
                    .candidate(indicator.category, &indicator.code)
                    .map(|candidate| candidate.max_capacity_kw)
                    .unwrap_or(0.0);
                (indicator.code.clone(), capacity)
            })
            .collect(),
    };
    Ok((front, detail))
}

fn optimize_stand_alone_building(
    context: &DomainContext,
    building: &str,
    shared: &SharedCaches<'_>,
    rng: &mut StdRng,
) -> Result<Vec<SupplySystem>, EngineError> {
    let demand = context
        .building(building)
        .ok_or_else(|| {
            EngineError::Connectivity(format!("'{building}' is not a building of this domain"))
        })?
        .demand
        .clone();
    let potentials = building_potentials(context, building);
    let structure = SupplySystemStructure::build(context, building, &demand, potentials)?;
    optimize_supply_system(context, &structure, &demand, shared, rng)
}

/// The shallow inner genetic algorithm over capacity indicator vectors of
/// one subsystem. Returns the non-dominated front of the final population.
fn optimize_supply_system(
    context: &DomainContext,
    structure: &SupplySystemStructure,
    demand: &EnergyFlow,
    shared: &SharedCaches<'_>,
    rng: &mut StdRng,
) -> Result<Vec<SupplySystem>, EngineError> {
    let algorithm = &context.settings.algorithm;
    let objectives = &algorithm.objectives;
    let max_demand = demand.peak();

    let mut population: Vec<SupplySystem> = Vec::new();
    let mut attempts = 0;
    while population.len() < algorithm.population && attempts < algorithm.population * 10 {
        attempts += 1;
        let memory = (attempts % 2 == 0).then_some(shared.civ_memory);
        let civ = CapacityIndicatorVector::generate(
            &structure.capacity_indicators,
            memory,
            max_demand,
            rng,
        )?;
        match SupplySystem::evaluate(structure, civ, demand, objectives, &context.registry) {
            Ok(system) => population.push(system),
            Err(EngineError::Evaluation { .. }) => continue,
            Err(error) => return Err(error),
        }
    }
    if population.is_empty() {
        return Err(EngineError::Evaluation {
            target: structure.target.clone(),
            reason: "no feasible capacity indicator vector was found".to_string(),
        });
    }

    for _ in 0..algorithm.generations_supply_systems() {
        let mut civs: Vec<CapacityIndicatorVector> = population
            .iter()
            .map(|system| system.capacity_indicator_vector.clone())
            .collect();
        for pair in civs.chunks_mut(2) {
            if pair.len() == 2 && rng.r#gen::<f64>() < algorithm.cx_prob {
                let (first, second) = pair.split_at_mut(1);
                CapacityIndicatorVector::mate(&mut first[0], &mut second[0], algorithm, rng)?;
            }
        }
        for civ in &mut civs {
            if rng.r#gen::<f64>() < algorithm.mut_prob {
                civ.mutate(algorithm, rng)?;
            }
        }
        for civ in civs {
            match SupplySystem::evaluate(structure, civ, demand, objectives, &context.registry) {
                Ok(system) => population.push(system),
                Err(EngineError::Evaluation { .. }) => continue,
                Err(error) => return Err(error),
            }
        }

        // identical configurations would crowd the front
        let mut seen: HashSet<CapacityIndicatorVector> = HashSet::new();
        population.retain(|system| seen.insert(system.capacity_indicator_vector.clone()));

        let fitnesses: Vec<&Fitness> = population.iter().map(|system| &system.fitness).collect();
        let selected = select_nsga2(&fitnesses, algorithm.population);
        population = selected
            .into_iter()
            .map(|index| population[index].clone())
            .collect();
    }

    let fitnesses: Vec<&Fitness> = population.iter().map(|system| &system.fitness).collect();
    let fronts = fast_non_dominated_sort(&fitnesses);
    let front = fronts
        .first()
        .map(|front| {
            front
                .iter()
                .map(|&index| population[index].clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Ok(front)
}

/// Sum of the member buildings' demand flows.
fn aggregate_member_demand(
    context: &DomainContext,
    members: &[String],
) -> Result<EnergyFlow, EngineError> {
    let mut aggregated: Option<EnergyFlow> = None;
    for member in members {
        let building = context.building(member).ok_or_else(|| {
            EngineError::Connectivity(format!("'{member}' is not a building of this domain"))
        })?;
        aggregated = Some(match aggregated {
            Some(flow) => flow.plus(&building.demand)?,
            None => building.demand.clone(),
        });
    }
    aggregated.ok_or_else(|| {
        EngineError::Connectivity("a network without members cannot be evaluated".to_string())
    })
}

/// Building-scale potentials pooled over the members, plus the members'
/// demand share of the domain-scale ones.
fn pooled_potentials(
    context: &DomainContext,
    members: &[String],
) -> BTreeMap<String, EnergyFlow> {
    let member_demand: f64 = members
        .iter()
        .filter_map(|m| context.building(m))
        .map(|b| b.demand.total())
        .sum();
    let domain_demand: f64 = context.buildings().map(|b| b.demand.total()).sum();
    let share = if domain_demand > 0.0 {
        member_demand / domain_demand
    } else {
        0.0
    };

    let mut potentials: BTreeMap<String, EnergyFlow> = BTreeMap::new();
    for potential in &context.potentials {
        let flow = match potential.scale {
            crate::core::models::potentials::PotentialScale::Building => {
                potential.pooled_main_flow(&members.to_vec())
            }
            _ => Some(potential.domain_flow().scaled(share)),
        };
        let Some(flow) = flow else { continue };
        match potentials.remove(&flow.carrier) {
            Some(existing) => {
                let merged = existing
                    .plus(&flow)
                    .expect("potentials pooled by carrier share the carrier");
                potentials.insert(flow.carrier.clone(), merged);
            }
            None => {
                potentials.insert(flow.carrier.clone(), flow);
            }
        }
    }
    potentials
}

fn building_potentials(context: &DomainContext, building: &str) -> BTreeMap<String, EnergyFlow> {
    let mut potentials: BTreeMap<String, EnergyFlow> = BTreeMap::new();
    for potential in &context.potentials {
        if potential.scale != crate::core::models::potentials::PotentialScale::Building {
            continue;
        }
        let Some(flow) = potential.main_flow_for_building(building) else {
            continue;
        };
        match potentials.remove(&flow.carrier) {
            Some(existing) => {
                let merged = existing
                    .plus(&flow)
                    .expect("potentials pooled by carrier share the carrier");
                potentials.insert(flow.carrier.clone(), merged);
            }
            None => {
                potentials.insert(flow.carrier.clone(), flow);
            }
        }
    }
    potentials
}

/// Enumerates the (capped) tensor product of the per-subsystem fronts and
/// keeps the non-dominated combinations.
fn combine_subsystem_fronts(
    district: &DistrictEnergySystem,
    context: &DomainContext,
    key: &str,
) -> Vec<SystemCombination> {
    let algorithm = &context.settings.algorithm;
    let objectives = &algorithm.objectives;
    let cost_position = objectives.iter().position(|o| *o == Objective::Cost);

    // (subsystem, front, fixed extra cost of the subsystem)
    let mut subsystems: Vec<(String, Vec<&SupplySystem>, f64)> = Vec::new();
    for network in &district.networks {
        let Some(front) = district.network_supply_systems.get(&network.identifier) else {
            return Vec::new();
        };
        subsystems.push((
            network.identifier.clone(),
            front.iter().collect(),
            network.annual_piping_cost_usd(context.settings.interest_rate),
        ));
    }
    for (building, front) in &district.stand_alone_supply_systems {
        subsystems.push((building.clone(), front.iter().collect(), 0.0));
    }
    if subsystems.is_empty() {
        return Vec::new();
    }

    // trim each front so the product stays within the combination budget
    let per_subsystem_limit = (COMBINATION_LIMIT as f64)
        .powf(1.0 / subsystems.len() as f64)
        .floor()
        .max(1.0) as usize;
    for (_, front, _) in &mut subsystems {
        if front.len() > per_subsystem_limit {
            let fitnesses: Vec<&Fitness> = front.iter().map(|system| &system.fitness).collect();
            let keep = select_nsga2(&fitnesses, per_subsystem_limit);
            *front = keep.into_iter().map(|index| front[index]).collect();
        }
    }

    let mut combinations = Vec::new();
    let mut indexes = vec![0usize; subsystems.len()];
    'enumerate: loop {
        let mut fitness: Option<Fitness> = None;
        let mut encoding = vec![key.to_string()];
        for (position, (subsystem, front, extra_cost)) in subsystems.iter().enumerate() {
            let system = front[indexes[position]];
            let mut values = system.fitness.values().to_vec();
            if let Some(cost_position) = cost_position {
                values[cost_position] += extra_cost;
            }
            let member = Fitness::new(values);
            fitness = Some(match fitness {
                Some(total) => total.combined(&member),
                None => member,
            });
            encoding.push(format!("{subsystem}-{}", indexes[position]));
        }
        combinations.push(SystemCombination {
            encoding,
            fitness: fitness.expect("subsystem list is not empty"),
        });

        // advance the mixed-radix counter over the fronts
        let mut position = subsystems.len() - 1;
        loop {
            indexes[position] += 1;
            if indexes[position] < subsystems[position].1.len() {
                continue 'enumerate;
            }
            indexes[position] = 0;
            if position == 0 {
                break 'enumerate;
            }
            position -= 1;
        }
    }

    let fitnesses: Vec<&Fitness> = combinations.iter().map(|c| &c.fitness).collect();
    let keep = select_nsga2(&fitnesses, algorithm.population);
    keep.into_iter()
        .map(|index| combinations[index].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::RunSettings;
    use crate::engine::context::fixtures::context_with;

    fn shared<'a>(
        memory: &'a CapacityVectorMemory,
        cache: &'a BTreeMap<String, Vec<SupplySystem>>,
        worst: &'a [f64],
    ) -> SharedCaches<'a> {
        SharedCaches {
            civ_memory: memory,
            stand_alone_systems: cache,
            worst_observed: worst,
        }
    }

    fn small_settings() -> RunSettings {
        let mut settings = RunSettings::defaults();
        settings.algorithm.population = 4;
        settings.algorithm.generations_networks = 4;
        settings
    }

    #[test]
    fn evaluation_builds_fronts_for_every_subsystem() {
        let context = context_with(small_settings(), false);
        let mut rng = StdRng::seed_from_u64(9);
        let vector =
            ConnectivityVector::from_values(vec![1, 1, 0, 0], &context, &mut rng).unwrap();
        let memory = CapacityVectorMemory::new(None);
        let cache = BTreeMap::new();
        let worst = vec![0.0, 0.0];
        let evaluation =
            evaluate_candidate(&vector, &context, &shared(&memory, &cache, &worst), 0).unwrap();
        assert_eq!(evaluation.key, "1_1_0_0");
        assert!(evaluation.district.network_supply_systems.contains_key("N1001"));
        assert_eq!(evaluation.district.stand_alone_supply_systems.len(), 2);
        assert!(!evaluation.district.best_combinations.is_empty());
        // stand-alone fronts are new and returned for consolidation
        assert_eq!(evaluation.stand_alone_delta.len(), 2);
        for combination in &evaluation.district.best_combinations {
            assert_eq!(combination.encoding[0], "1_1_0_0");
            assert_eq!(combination.encoding.len(), 4);
        }
    }

    #[test]
    fn evaluation_is_deterministic_per_candidate_and_generation() {
        let context = context_with(small_settings(), false);
        let mut rng = StdRng::seed_from_u64(9);
        let vector =
            ConnectivityVector::from_values(vec![1, 1, 0, 0], &context, &mut rng).unwrap();
        let memory = CapacityVectorMemory::new(None);
        let cache = BTreeMap::new();
        let worst = vec![0.0, 0.0];
        let first =
            evaluate_candidate(&vector, &context, &shared(&memory, &cache, &worst), 3).unwrap();
        let second =
            evaluate_candidate(&vector, &context, &shared(&memory, &cache, &worst), 3).unwrap();
        let first_fits: Vec<Vec<f64>> = first
            .district
            .best_combinations
            .iter()
            .map(|c| c.fitness.values().to_vec())
            .collect();
        let second_fits: Vec<Vec<f64>> = second
            .district
            .best_combinations
            .iter()
            .map(|c| c.fitness.values().to_vec())
            .collect();
        assert_eq!(first_fits, second_fits);
    }

    #[test]
    fn combination_tokens_resolve_to_supply_systems() {
        let context = context_with(small_settings(), false);
        let mut rng = StdRng::seed_from_u64(9);
        let vector =
            ConnectivityVector::from_values(vec![1, 1, 1, 0], &context, &mut rng).unwrap();
        let memory = CapacityVectorMemory::new(None);
        let cache = BTreeMap::new();
        let worst = vec![0.0, 0.0];
        let evaluation =
            evaluate_candidate(&vector, &context, &shared(&memory, &cache, &worst), 0).unwrap();
        let combination = &evaluation.district.best_combinations[0];
        let selected = evaluation
            .district
            .select_supply_system_combination(combination);
        assert_eq!(selected.len(), combination.encoding.len() - 1);
    }

    #[test]
    fn penalty_fitness_scales_with_observed_worst() {
        let fresh = penalty_fitness(2, &[0.0, 0.0]);
        assert_eq!(fresh.values(), &[PENALTY_BASELINE, PENALTY_BASELINE]);
        let scaled = penalty_fitness(2, &[100.0, 7.0]);
        assert_eq!(scaled.values(), &[1000.0, 70.0]);
    }
}
