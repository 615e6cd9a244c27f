//! The Domain orchestrator: the outer genetic algorithm over network
//! connectivity, wrapped in scenario loading and result writing.
//!
//! One run walks through loading the scenario (buildings, optional base
//! network layout, energy potentials), modelling the as-built energy system
//! as the permanently included reference individual, evolving the population
//! of connectivity vectors with the inner supply-system search embedded in
//! every fitness evaluation, and finally materializing and writing the
//! near-pareto-optimal district energy systems.

use crate::core::io::IoError;
use crate::core::io::demand::{EnergyService, read_building_demand, read_supply_designations};
use crate::core::io::layout::load_network_layout;
use crate::core::io::potentials::read_potential_profile;
use crate::core::io::results::{
    GeoEdge, GeoNode, SubsystemRow, SummaryRow, write_network_geojson, write_subsystem_csv,
    write_summary_csv,
};
use crate::core::io::zone::read_zone_centroids;
use crate::core::models::buildings::{Building, InitialConnectivity};
use crate::core::models::carriers::{EnergyCarrierRegistry, ThermalMedium};
use crate::core::models::flows::{EnergyFlow, Placement};
use crate::core::models::potentials::{EnergyPotential, PotentialSource};
use crate::core::technologies::catalog::TechnologyCatalog;
use crate::engine::config::{Objective, RunSettings, SystemType};
use crate::engine::connectivity::ConnectivityVector;
use crate::engine::consolidate::{SharedState, consolidate, evaluate_batch};
use crate::engine::context::DomainContext;
use crate::engine::district::{DistrictEnergySystem, SystemCombination};
use crate::engine::error::EngineError;
use crate::engine::fitness::{Fitness, fast_non_dominated_sort};
use crate::engine::network::NodeKind;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::tracker::OptimizationTracker;
use petgraph::visit::EdgeRef;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Building-scale potential sources and the carriers/columns their profile
/// files are read with.
const BUILDING_SCALE_SOURCES: [(PotentialSource, &str, Option<&str>, &str, Option<&str>); 4] = [
    (PotentialSource::PhotovoltaicPanels, "E230AC", None, "E_kWh", None),
    (
        PotentialSource::PhotovoltaicThermal,
        "T60W",
        Some("E230AC"),
        "Q_kWh",
        Some("E_kWh"),
    ),
    (PotentialSource::SolarCollectorsFlatPlate, "T60W", None, "Q_kWh", None),
    (PotentialSource::SolarCollectorsEvacuatedTube, "T60W", None, "Q_kWh", None),
];

/// Domain-scale potential sources, read from one file each.
const DOMAIN_SCALE_SOURCES: [(PotentialSource, &str, &str); 3] = [
    (PotentialSource::Geothermal, "T15B", "Q_kWh"),
    (PotentialSource::WaterBody, "T15B", "Q_kWh"),
    (PotentialSource::SewageHeat, "T15B", "Q_kWh"),
];

/// Input and output locations of one optimization scenario.
#[derive(Debug, Clone)]
pub struct ScenarioPaths {
    pub zone: PathBuf,
    pub demand_dir: PathBuf,
    pub supply: Option<PathBuf>,
    pub layout: Option<PathBuf>,
    pub potentials_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl ScenarioPaths {
    /// The conventional scenario-directory layout: `zone.geojson`,
    /// `demand/`, and the optional `supply.csv`, `network_layout.geojson`
    /// and `potentials/`; results go to `outputs/`.
    pub fn from_root(root: &Path) -> Self {
        let optional = |path: PathBuf| path.exists().then_some(path);
        Self {
            zone: root.join("zone.geojson"),
            demand_dir: root.join("demand"),
            supply: optional(root.join("supply.csv")),
            layout: optional(root.join("network_layout.geojson")),
            potentials_dir: optional(root.join("potentials")),
            output_dir: root.join("outputs"),
        }
    }
}

/// One district energy system of the final selection, as reported back to
/// the caller.
#[derive(Debug, Clone)]
pub struct SystemReport {
    pub name: String,
    pub connectivity: String,
    pub network_count: usize,
    pub stand_alone_count: usize,
    /// Objective label and value, in the configured objective order.
    pub objectives: Vec<(&'static str, f64)>,
}

#[derive(Debug, Clone)]
pub struct OptimizationReport {
    pub systems: Vec<SystemReport>,
}

/// One selected (connectivity, supply-system combination) pair with the full
/// district realization behind it.
struct SelectedSystem {
    name: String,
    district: DistrictEnergySystem,
    combination: SystemCombination,
}

#[instrument(skip_all, name = "optimize_domain")]
pub fn run(
    scenario: &ScenarioPaths,
    settings: RunSettings,
    reporter: &ProgressReporter<'_>,
) -> Result<OptimizationReport, EngineError> {
    // === Phase 0: Load the scenario and assemble the domain context ===
    reporter.report(Progress::PhaseStart { name: "Preparation" });
    info!("Loading scenario inputs and assembling the domain context.");

    let registry = EnergyCarrierRegistry::builtin();
    let catalog = TechnologyCatalog::builtin();
    let buildings = load_buildings(scenario, &settings, &registry)?;
    let potentials = load_potentials(scenario)?;
    info!(
        buildings = buildings.len(),
        potentials = potentials.len(),
        "Scenario loaded."
    );
    let context = DomainContext::new(registry, catalog, settings, buildings, potentials)?;
    let algorithm = context.settings.algorithm.clone();
    let mut rng = StdRng::seed_from_u64(algorithm.seed);
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Model the as-built energy system ===
    reporter.report(Progress::PhaseStart {
        name: "Modelling the as-built system",
    });
    info!("Evaluating the as-built connectivity state as the reference individual.");
    let as_built = ConnectivityVector::from_initial_state(&context, &mut rng)?;
    let mut state = SharedState::new(algorithm.objectives.len());
    let mut tracker = context.settings.debug.then(|| {
        OptimizationTracker::new(algorithm.objectives.clone(), context.ordered_building_ids())
    });
    let batch = evaluate_batch(
        std::slice::from_ref(&as_built),
        &context,
        &state,
        0,
        reporter,
    )?;
    consolidate(&mut state, tracker.as_mut(), batch);
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Initialize and evaluate the population ===
    reporter.report(Progress::PhaseStart {
        name: "Initializing population",
    });
    let mut population = initialize_population(&context, &as_built, &mut rng)?;
    info!(
        population = population.len(),
        "Initial population generated."
    );
    let to_evaluate: Vec<ConnectivityVector> = population
        .iter()
        .filter(|candidate| !state.is_memoized(&candidate.as_str()))
        .cloned()
        .collect();
    let batch = evaluate_batch(&to_evaluate, &context, &state, 0, reporter)?;
    consolidate(&mut state, tracker.as_mut(), batch);
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Evolve the connectivity population ===
    reporter.report(Progress::PhaseStart {
        name: "Optimizing networks",
    });
    for generation in 0..algorithm.generations_networks {
        reporter.report(Progress::GenerationStart {
            generation: generation + 1,
            total: algorithm.generations_networks,
        });

        let offspring = var_and(&population, &context, &mut rng)?;
        let mut batch_keys: BTreeSet<String> = BTreeSet::new();
        let to_evaluate: Vec<ConnectivityVector> = offspring
            .iter()
            .filter(|candidate| {
                let key = candidate.as_str();
                !state.is_memoized(&key) && batch_keys.insert(key)
            })
            .cloned()
            .collect();
        let evaluated = to_evaluate.len();
        let batch = evaluate_batch(&to_evaluate, &context, &state, generation + 1, reporter)?;
        consolidate(&mut state, tracker.as_mut(), batch);

        // parents ∪ offspring, one representative per canonical string
        let mut union_keys: BTreeSet<String> = BTreeSet::new();
        let union: Vec<ConnectivityVector> = population
            .iter()
            .chain(offspring.iter())
            .filter(|candidate| union_keys.insert(candidate.as_str()))
            .cloned()
            .collect();
        let solutions: BTreeMap<String, Vec<SystemCombination>> = union
            .iter()
            .filter_map(|vector| {
                let key = vector.as_str();
                state.evaluated.get(&key).map(|front| (key, front.clone()))
            })
            .collect();
        population =
            ConnectivityVector::select(union, &solutions, algorithm.population, tracker.as_mut());
        if !population.iter().any(|vector| *vector == as_built) {
            if population.len() >= algorithm.population {
                population.pop();
            }
            population.push(as_built.clone());
        }

        reporter.report(Progress::GenerationFinish {
            evaluated,
            memoized: offspring.len() - evaluated,
        });
        info!(
            generation = generation + 1,
            evaluated,
            survivors = population.len(),
            "Generation selected."
        );
    }
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Final selection across all surviving candidates ===
    reporter.report(Progress::PhaseStart {
        name: "Selecting final systems",
    });
    let final_systems = select_final_systems(&population, &state, &context);
    info!(
        systems = final_systems.len(),
        "Final non-dominated selection computed."
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 5: Materialize and write the results ===
    reporter.report(Progress::PhaseStart {
        name: "Writing results",
    });
    std::fs::create_dir_all(&scenario.output_dir).map_err(|source| IoError::Write {
        path: scenario.output_dir.clone(),
        source,
    })?;
    let mut summary_rows = Vec::new();
    for system in &final_systems {
        let directory = scenario.output_dir.join(&system.name);
        summary_rows.extend(write_system_outputs(&directory, system, &context)?);
    }
    write_summary_csv(&scenario.output_dir.join("summary.csv"), &summary_rows)?;
    if let Some(tracker) = &tracker {
        tracker.write_csvs(&scenario.output_dir)?;
    }
    reporter.report(Progress::PhaseFinish);

    let systems = final_systems
        .iter()
        .map(|system| SystemReport {
            name: system.name.clone(),
            connectivity: system.district.connectivity.as_str(),
            network_count: system.district.networks.len(),
            stand_alone_count: system.district.stand_alone_buildings.len(),
            objectives: algorithm
                .objectives
                .iter()
                .map(Objective::label)
                .zip(system.combination.fitness.values().iter().copied())
                .collect(),
        })
        .collect();
    info!("Optimization complete.");
    Ok(OptimizationReport { systems })
}

/// Loads the domain's buildings: zone centroids joined with demand profiles
/// and connectivity designations, the latter overridden by a validated base
/// network layout when one is supplied.
fn load_buildings(
    scenario: &ScenarioPaths,
    settings: &RunSettings,
    registry: &EnergyCarrierRegistry,
) -> Result<Vec<Building>, EngineError> {
    let centroids = read_zone_centroids(&scenario.zone)?;
    let mut designations = match &scenario.supply {
        Some(path) => read_supply_designations(path)?,
        None => BTreeMap::new(),
    };
    if let Some(layout_path) = &scenario.layout {
        let district: Vec<String> = centroids
            .iter()
            .filter(|(name, _)| {
                designations
                    .get(name)
                    .map(InitialConnectivity::is_district)
                    .unwrap_or(false)
            })
            .map(|(name, _)| name.clone())
            .collect();
        let layout = load_network_layout(layout_path, &centroids, &district)?;
        info!(
            networks = layout.networks.len(),
            "Base network layout loaded and validated."
        );
        for (building, network) in layout.building_networks() {
            designations.insert(building, InitialConnectivity::Named(network));
        }
    }

    let service = match settings.system_type {
        SystemType::Heating => EnergyService::SpaceHeating,
        SystemType::Cooling => EnergyService::SpaceCooling,
    };
    let carrier = registry
        .thermal_carrier_for(ThermalMedium::Water, settings.network_temperature_celsius)?
        .code
        .clone();

    let mut buildings = Vec::with_capacity(centroids.len());
    for (name, centroid) in centroids {
        let path = scenario.demand_dir.join(format!("{name}.csv"));
        let profile = read_building_demand(&path, service)?;
        let mut building = Building::new(
            &name,
            centroid,
            EnergyFlow::new(Placement::Primary, Placement::Consumer, &carrier, profile)?,
        );
        if let Some(designation) = designations.get(&building.identifier) {
            building.initial_connectivity = designation.clone();
        }
        buildings.push(building);
    }
    Ok(buildings)
}

/// Loads the scenario's energy potentials. Absent directories and files mean
/// the resource is not available, not an error.
fn load_potentials(scenario: &ScenarioPaths) -> Result<Vec<EnergyPotential>, EngineError> {
    let Some(root) = &scenario.potentials_dir else {
        return Ok(Vec::new());
    };
    let mut potentials = Vec::new();

    for (kind, main_carrier, auxiliary_carrier, main_column, auxiliary_column) in
        BUILDING_SCALE_SOURCES
    {
        let directory = root.join(kind.label());
        if !directory.is_dir() {
            continue;
        }
        let mut potential = EnergyPotential::building_scale(kind, main_carrier, auxiliary_carrier);
        let mut files: Vec<PathBuf> = std::fs::read_dir(&directory)
            .map_err(|source| IoError::Read {
                path: directory.clone(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        files.sort();
        for path in files {
            let Some(building) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let main = read_potential_profile(&path, main_column)?;
            let auxiliary = match auxiliary_column {
                Some(column) => Some(read_potential_profile(&path, column)?),
                None => None,
            };
            potential.add_building_profile(building, main, auxiliary)?;
        }
        if potential.buildings().next().is_some() {
            potentials.push(potential);
        }
    }

    for (kind, carrier, column) in DOMAIN_SCALE_SOURCES {
        let path = root.join(format!("{}.csv", kind.label()));
        if !path.is_file() {
            continue;
        }
        let profile = read_potential_profile(&path, column)?;
        potentials.push(EnergyPotential::domain_scale(kind, carrier, profile)?);
    }
    Ok(potentials)
}

/// The initial population: the as-built reference individual plus distinct
/// random vectors up to the configured population size.
fn initialize_population(
    context: &DomainContext,
    as_built: &ConnectivityVector,
    rng: &mut StdRng,
) -> Result<Vec<ConnectivityVector>, EngineError> {
    let target = context.settings.algorithm.population;
    let mut population = vec![as_built.clone()];
    let mut keys = BTreeSet::from([as_built.as_str()]);
    let mut attempts = 0;
    // small domains may not have `target` distinct canonical topologies
    while population.len() < target && attempts < target * 50 {
        attempts += 1;
        let candidate = ConnectivityVector::generate(context, rng)?;
        if keys.insert(candidate.as_str()) {
            population.push(candidate);
        }
    }
    Ok(population)
}

/// Clones the population and applies crossover to adjacent pairs and
/// mutation to every clone, each under its configured probability.
fn var_and(
    population: &[ConnectivityVector],
    context: &DomainContext,
    rng: &mut StdRng,
) -> Result<Vec<ConnectivityVector>, EngineError> {
    let algorithm = &context.settings.algorithm;
    let mut offspring = population.to_vec();
    for pair in offspring.chunks_mut(2) {
        if pair.len() == 2 && rng.r#gen::<f64>() < algorithm.cx_prob {
            let (first, second) = pair.split_at_mut(1);
            ConnectivityVector::mate(&mut first[0], &mut second[0], context, rng)?;
        }
    }
    for candidate in &mut offspring {
        if rng.r#gen::<f64>() < algorithm.mut_prob {
            candidate.mutate(context, rng)?;
        }
    }
    Ok(offspring)
}

/// Pools every surviving candidate's best combinations, takes the global
/// non-dominated front (padded with later fronts up to the population size),
/// and reduces it to one system per distinct (connectivity, combination)
/// pair.
fn select_final_systems(
    population: &[ConnectivityVector],
    state: &SharedState,
    context: &DomainContext,
) -> Vec<SelectedSystem> {
    let mut pool: Vec<SystemCombination> = Vec::new();
    let mut seen_candidates = BTreeSet::new();
    for vector in population {
        let key = vector.as_str();
        if !seen_candidates.insert(key.clone()) {
            continue;
        }
        if let Some(combinations) = state.evaluated.get(&key) {
            pool.extend(combinations.iter().cloned());
        }
    }

    let fitnesses: Vec<&Fitness> = pool.iter().map(|c| &c.fitness).collect();
    let fronts = fast_non_dominated_sort(&fitnesses);
    let minimum = context.settings.algorithm.population.min(pool.len());
    let mut selected = Vec::new();
    for front in &fronts {
        if selected.len() >= minimum {
            break;
        }
        selected.extend(front.iter().copied());
    }

    let mut seen_combinations = BTreeSet::new();
    let mut systems = Vec::new();
    for index in selected {
        let combination = &pool[index];
        if !seen_combinations.insert(combination.encoding.join("_")) {
            continue;
        }
        let Some(district) = state.districts.get(&combination.encoding[0]) else {
            continue;
        };
        systems.push(SelectedSystem {
            name: format!("DES_{}", systems.len() + 1),
            district: district.clone(),
            combination: combination.clone(),
        });
    }
    systems
}

/// Writes one selected system's outputs: a layout GeoJSON per network and a
/// component/carrier CSV per subsystem. Returns the system's summary rows.
fn write_system_outputs(
    directory: &Path,
    system: &SelectedSystem,
    context: &DomainContext,
) -> Result<Vec<SummaryRow>, EngineError> {
    std::fs::create_dir_all(directory).map_err(|source| IoError::Write {
        path: directory.to_path_buf(),
        source,
    })?;

    for network in &system.district.networks {
        let nodes: Vec<GeoNode> = network
            .graph
            .node_weights()
            .map(|node| GeoNode {
                position: node.key.to_point(),
                building: match &node.kind {
                    NodeKind::Building(id) => Some(id.clone()),
                    NodeKind::Junction => None,
                },
            })
            .collect();
        let edges: Vec<GeoEdge> = network
            .graph
            .edge_references()
            .map(|edge| GeoEdge {
                from: network.graph[edge.source()].key.to_point(),
                to: network.graph[edge.target()].key.to_point(),
                length_m: edge.weight().length_m,
            })
            .collect();
        write_network_geojson(
            &directory.join(format!("{}_layout.geojson", network.identifier)),
            &network.identifier,
            &nodes,
            &edges,
        )?;
    }

    let mut summary = Vec::new();
    for (subsystem, supply) in system
        .district
        .select_supply_system_combination(&system.combination)
    {
        let mut rows = Vec::new();
        for (placement, components) in &supply.installed {
            for component in components.values() {
                rows.push(SubsystemRow::Component {
                    placement: placement.to_string(),
                    code: component.code.clone(),
                    capacity_kw: component.capacity_kw,
                    capex_annual_usd: component.capex_annual_usd,
                    om_annual_usd: component.om_annual_usd,
                });
            }
        }
        for (placement, adapters) in &supply.adapters {
            for adapter in adapters.values() {
                rows.push(SubsystemRow::Component {
                    placement: placement.to_string(),
                    code: adapter.code.clone(),
                    capacity_kw: adapter.capacity_kw,
                    capex_annual_usd: adapter.capex_annual_usd,
                    om_annual_usd: adapter.om_annual_usd,
                });
            }
        }
        for (carrier, _) in supply.system_energy_demand.iter() {
            let net = supply.system_energy_demand.annual_total(carrier);
            if net > 0.0 {
                rows.push(SubsystemRow::CarrierInput {
                    carrier: carrier.to_string(),
                    annual_kwh: net,
                });
            } else if net < 0.0 {
                rows.push(SubsystemRow::CarrierOutput {
                    carrier: carrier.to_string(),
                    annual_kwh: -net,
                });
            }
        }
        for (carrier, profile) in supply.heat_rejection.iter() {
            rows.push(SubsystemRow::CarrierOutput {
                carrier: carrier.to_string(),
                annual_kwh: profile.iter().sum(),
            });
        }
        write_subsystem_csv(
            &directory.join(format!("{subsystem}_supply_system.csv")),
            &rows,
        )?;

        let piping_cost = system
            .district
            .networks
            .iter()
            .find(|network| network.identifier == subsystem)
            .map(|network| network.annual_piping_cost_usd(context.settings.interest_rate))
            .unwrap_or(0.0);
        summary.push(SummaryRow {
            system: system.name.clone(),
            subsystem,
            heat_rejection_kwh: supply.objective_value(Objective::AnthropogenicHeat),
            system_energy_demand_kwh: supply.objective_value(Objective::SystemEnergyDemand),
            ghg_emissions_kg: supply.objective_value(Objective::GhgEmissions),
            annual_cost_usd: supply.objective_value(Objective::Cost) + piping_cost,
        });
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::flows::HOURS_PER_YEAR;
    use crate::engine::config::{ConnectivityCrossover, ConnectivityMutation};
    use serde_json::json;
    use std::io::Write;

    fn write_scenario(root: &Path) {
        let zone = json!({
            "type": "FeatureCollection",
            "features": (0..4).map(|index| json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [100.0 * index as f64, 0.0]},
                "properties": {"Name": format!("B{}", 1001 + index)}
            })).collect::<Vec<_>>(),
        });
        std::fs::write(root.join("zone.geojson"), zone.to_string()).unwrap();

        let demand_dir = root.join("demand");
        std::fs::create_dir_all(&demand_dir).unwrap();
        for index in 0..4 {
            let path = demand_dir.join(format!("B{}.csv", 1001 + index));
            let mut file = std::fs::File::create(path).unwrap();
            writeln!(file, "QH_kWh").unwrap();
            for hour in 0..HOURS_PER_YEAR {
                let base = 10.0 + index as f64;
                let value = if hour == 0 { base * 5.0 } else { base };
                writeln!(file, "{value}").unwrap();
            }
        }
    }

    fn small_settings() -> RunSettings {
        let mut settings = RunSettings::defaults();
        settings.algorithm.population = 4;
        settings.algorithm.generations_networks = 2;
        settings.algorithm.maximum_number_of_networks = 1;
        settings.algorithm.connectivity_mutation = ConnectivityMutation::UniformInteger;
        settings.algorithm.connectivity_crossover = ConnectivityCrossover::Uniform;
        settings
    }

    #[test]
    fn scenario_paths_pick_up_optional_inputs() {
        let dir = tempfile::tempdir().unwrap();
        write_scenario(dir.path());
        let scenario = ScenarioPaths::from_root(dir.path());
        assert!(scenario.supply.is_none());
        assert!(scenario.layout.is_none());
        std::fs::write(dir.path().join("supply.csv"), "Name,Supply\n").unwrap();
        let scenario = ScenarioPaths::from_root(dir.path());
        assert!(scenario.supply.is_some());
    }

    #[test]
    fn end_to_end_run_writes_selected_systems() {
        let dir = tempfile::tempdir().unwrap();
        write_scenario(dir.path());
        let mut settings = small_settings();
        settings.debug = true;
        let scenario = ScenarioPaths::from_root(dir.path());
        let reporter = ProgressReporter::new();
        let report = run(&scenario, settings, &reporter).unwrap();

        assert!(!report.systems.is_empty());
        assert!(dir.path().join("outputs/summary.csv").exists());
        assert!(dir.path().join("outputs/fitness_tracker.csv").exists());
        for system in &report.systems {
            assert!(dir.path().join("outputs").join(&system.name).is_dir());
            assert_eq!(system.objectives.len(), 2);
            assert_eq!(system.objectives[0].0, "cost");
            assert!(system.objectives[0].1 > 0.0);
        }
        let summary = std::fs::read_to_string(dir.path().join("outputs/summary.csv")).unwrap();
        assert!(summary.contains("DES_1,TOTAL"));
    }

    #[test]
    fn supply_designations_shape_the_reference_individual() {
        let dir = tempfile::tempdir().unwrap();
        write_scenario(dir.path());
        let mut supply = std::fs::File::create(dir.path().join("supply.csv")).unwrap();
        writeln!(supply, "Name,Supply").unwrap();
        writeln!(supply, "B1001,N1001").unwrap();
        writeln!(supply, "B1002,N1001").unwrap();
        writeln!(supply, "B1003,STANDALONE").unwrap();
        writeln!(supply, "B1004,STANDALONE").unwrap();
        drop(supply);

        let scenario = ScenarioPaths::from_root(dir.path());
        let settings = small_settings();
        let registry = EnergyCarrierRegistry::builtin();
        let buildings = load_buildings(&scenario, &settings, &registry).unwrap();
        let context = DomainContext::new(
            registry,
            TechnologyCatalog::builtin(),
            settings,
            buildings,
            Vec::new(),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let as_built = ConnectivityVector::from_initial_state(&context, &mut rng).unwrap();
        assert_eq!(as_built.values(), vec![1, 1, 0, 0]);
    }
}
