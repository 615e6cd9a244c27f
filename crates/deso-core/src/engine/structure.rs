use crate::core::models::flows::{EnergyFlow, Placement};
use crate::core::technologies::component::ComponentModel;
use crate::engine::capacity::{
    CapacityIndicator, CapacityIndicatorVector, Dependencies, DependencyGroup,
};
use crate::engine::context::DomainContext;
use crate::engine::error::EngineError;
use std::collections::{BTreeMap, BTreeSet};

/// The three component categories of the generalized supply-system layout:
///
/// ```text
///  sources -> secondary -> primary -> consumer
///                 |           |
///                 +-> tertiary/rejection -> environment
/// ```
pub const CATEGORIES: [Placement; 3] = [Placement::Primary, Placement::Secondary, Placement::Tertiary];

/// One candidate component of a structure: the catalog model, the maximum
/// capacity that is useful in this system, and the passive converter needed
/// to couple it to the carrier it serves (if any).
#[derive(Debug, Clone)]
pub struct CandidateComponent {
    pub model: ComponentModel,
    pub max_capacity_kw: f64,
    pub adapter: Option<ComponentModel>,
}

/// The static candidate component space of one subsystem (a network's
/// aggregated demand or one stand-alone building).
///
/// Built once per subsystem, it fixes which technologies could serve which
/// carrier in which category, their maximum useful capacities, the
/// activation order of the water-filling cascade, and the ordered capacity
/// indicator slots any concrete configuration is parameterized by.
#[derive(Debug, Clone)]
pub struct SupplySystemStructure {
    pub target: String,
    pub main_carrier: String,
    pub peak_demand_kw: f64,
    pub available_potentials: BTreeMap<String, EnergyFlow>,
    pub components: BTreeMap<Placement, BTreeMap<String, CandidateComponent>>,
    pub activation_order: BTreeMap<Placement, Vec<String>>,
    pub selection_by_carrier: BTreeMap<Placement, BTreeMap<String, Vec<String>>>,
    pub capacity_indicators: CapacityIndicatorVector,
    pub infinite_carriers: BTreeSet<String>,
    pub releasable_env_carriers: BTreeSet<String>,
    pub releasable_grid_carriers: BTreeSet<String>,
    pub interest_rate: f64,
}

impl SupplySystemStructure {
    /// Sizes the candidate component space against the subsystem's demand:
    /// primary components from the peak demand, secondary components from
    /// the primary components' input carriers, tertiary components from the
    /// non-releasable outputs.
    pub fn build(
        context: &DomainContext,
        target: &str,
        demand: &EnergyFlow,
        available_potentials: BTreeMap<String, EnergyFlow>,
    ) -> Result<Self, EngineError> {
        let registry = &context.registry;
        let peak = demand.peak();
        if peak <= 0.0 {
            return Err(EngineError::InfeasibleStructure {
                target: target.to_string(),
                reason: "the subsystem has no demand to serve".to_string(),
            });
        }

        let infinite_carriers: BTreeSet<String> =
            registry.infinite_source_codes().into_iter().collect();
        let releasable_env_carriers: BTreeSet<String> = registry
            .releasable_environmental_codes()
            .into_iter()
            .collect();
        let releasable_grid_carriers: BTreeSet<String> =
            registry.releasable_grid_codes().into_iter().collect();

        // guaranteed hourly availability of each local potential
        let guaranteed_potential: BTreeMap<String, f64> = available_potentials
            .iter()
            .map(|(carrier, flow)| {
                (
                    carrier.clone(),
                    flow.profile().iter().copied().fold(f64::INFINITY, f64::min),
                )
            })
            .collect();

        let mut components: BTreeMap<Placement, BTreeMap<String, CandidateComponent>> =
            CATEGORIES.iter().map(|&c| (c, BTreeMap::new())).collect();
        let mut dependencies = Dependencies::new();

        // PRIMARY: components able to produce the demand carrier
        let primary = viable_components(
            context,
            &demand.carrier,
            peak,
            &infinite_carriers,
            &guaranteed_potential,
        );
        if primary.is_empty() {
            return Err(EngineError::InfeasibleStructure {
                target: target.to_string(),
                reason: format!(
                    "no catalogued technology can deliver '{}' at {peak:.1} kW",
                    demand.carrier
                ),
            });
        }
        components.insert(Placement::Primary, primary);

        // carrier requirements caused by the primary components at full
        // capacity, net of guaranteed potentials and grid sources
        let primary_inputs =
            max_input_requirements(&components[&Placement::Primary]);
        let secondary_requirements = open_requirements(
            &primary_inputs,
            &infinite_carriers,
            &guaranteed_potential,
        );

        // SECONDARY: components supplying the primary components' inputs
        for (carrier, &requirement) in &secondary_requirements {
            let producers = viable_components(
                context,
                carrier,
                requirement,
                &infinite_carriers,
                &guaranteed_potential,
            );
            if producers.is_empty() {
                return Err(EngineError::InfeasibleStructure {
                    target: target.to_string(),
                    reason: format!(
                        "the energy carrier '{carrier}' can neither be drawn from a grid nor \
                         produced by any catalogued technology"
                    ),
                });
            }
            let consumers = &components[&Placement::Primary];
            let total: f64 = primary_inputs.get(carrier).copied().unwrap_or(0.0);
            dependencies.insert(
                Placement::Secondary,
                carrier,
                dependency_group(consumers, carrier, total),
            );
            components
                .get_mut(&Placement::Secondary)
                .expect("categories are preallocated")
                .extend(producers);
        }

        // TERTIARY: rejection equipment for the non-releasable outputs of
        // the categories above
        let mut output_totals: BTreeMap<String, f64> = BTreeMap::new();
        for placement in [Placement::Primary, Placement::Secondary] {
            for (carrier, amount) in max_output_quantities(&components[&placement]) {
                *output_totals.entry(carrier).or_insert(0.0) += amount;
            }
        }
        for (carrier, &requirement) in &output_totals {
            if releasable_env_carriers.contains(carrier)
                || releasable_grid_carriers.contains(carrier)
                || requirement <= 0.0
            {
                continue;
            }
            let absorbers = viable_components(
                context,
                carrier,
                requirement,
                &infinite_carriers,
                &guaranteed_potential,
            );
            if absorbers.is_empty() {
                return Err(EngineError::InfeasibleStructure {
                    target: target.to_string(),
                    reason: format!(
                        "the energy carrier '{carrier}' can neither be released to a grid or the \
                         environment nor absorbed by any catalogued technology"
                    ),
                });
            }
            let mut upstream: BTreeMap<String, CandidateComponent> = BTreeMap::new();
            for placement in [Placement::Primary, Placement::Secondary] {
                upstream.extend(components[&placement].clone());
            }
            dependencies.insert(
                Placement::Tertiary,
                carrier,
                output_dependency_group(&upstream, carrier, requirement),
            );
            components
                .get_mut(&Placement::Tertiary)
                .expect("categories are preallocated")
                .extend(absorbers);
        }

        // the tertiary components' own inputs and outputs must close the
        // balance
        let tertiary_inputs = max_input_requirements(&components[&Placement::Tertiary]);
        let open_inputs =
            open_requirements(&tertiary_inputs, &infinite_carriers, &guaranteed_potential);
        if let Some((carrier, _)) = open_inputs.iter().next() {
            return Err(EngineError::InfeasibleStructure {
                target: target.to_string(),
                reason: format!(
                    "the rejection equipment itself requires '{carrier}' which cannot be supplied"
                ),
            });
        }
        for (carrier, amount) in max_output_quantities(&components[&Placement::Tertiary]) {
            if amount > 0.0
                && !releasable_env_carriers.contains(&carrier)
                && !releasable_grid_carriers.contains(&carrier)
            {
                return Err(EngineError::InfeasibleStructure {
                    target: target.to_string(),
                    reason: format!(
                        "the energy carrier '{carrier}' could not be released to a grid or the \
                         environment"
                    ),
                });
            }
        }

        let activation_order: BTreeMap<Placement, Vec<String>> = CATEGORIES
            .iter()
            .map(|&placement| {
                let mut codes: Vec<&CandidateComponent> =
                    components[&placement].values().collect();
                codes.sort_by_key(|c| (c.model.activation_priority, c.model.code.clone()));
                (
                    placement,
                    codes.into_iter().map(|c| c.model.code.clone()).collect(),
                )
            })
            .collect();

        // which installed component can serve which carrier, per category
        let mut selection_by_carrier: BTreeMap<Placement, BTreeMap<String, Vec<String>>> =
            CATEGORIES.iter().map(|&c| (c, BTreeMap::new())).collect();
        for &placement in &CATEGORIES {
            for candidate in components[&placement].values() {
                let served = match &candidate.adapter {
                    Some(adapter) => adapter.main_carrier.clone(),
                    None => candidate.model.main_carrier.clone(),
                };
                selection_by_carrier
                    .get_mut(&placement)
                    .expect("categories are preallocated")
                    .entry(served)
                    .or_default()
                    .push(candidate.model.code.clone());
            }
        }
        for selections in selection_by_carrier.values_mut() {
            for (_, codes) in selections.iter_mut() {
                codes.sort_by_key(|code| {
                    activation_order
                        .values()
                        .flatten()
                        .position(|c| c == code)
                        .unwrap_or(usize::MAX)
                });
            }
        }

        // the ordered capacity indicator slots of the structure
        let indicator_list: Vec<CapacityIndicator> = CATEGORIES
            .iter()
            .flat_map(|&placement| {
                activation_order[&placement].iter().map(move |code| (placement, code))
            })
            .map(|(placement, code)| {
                let candidate = &components[&placement][code];
                CapacityIndicator::new(placement, code, &candidate.model.main_carrier)
            })
            .collect();
        let capacity_indicators = CapacityIndicatorVector::new(indicator_list, dependencies);

        Ok(Self {
            target: target.to_string(),
            main_carrier: demand.carrier.clone(),
            peak_demand_kw: peak,
            available_potentials,
            components,
            activation_order,
            selection_by_carrier,
            capacity_indicators,
            infinite_carriers,
            releasable_env_carriers,
            releasable_grid_carriers,
            interest_rate: context.settings.interest_rate,
        })
    }

    pub fn candidate(&self, placement: Placement, code: &str) -> Option<&CandidateComponent> {
        self.components.get(&placement)?.get(code)
    }
}

/// Active components able to deliver the carrier at up to the requested
/// power, directly or through a passive converter, with their maximum
/// useful capacities.
///
/// A component only qualifies when each of its input carriers is coverable:
/// from a grid, from a local potential (capping the component's size at the
/// potential's guaranteed availability), or by some other catalogued
/// producer.
fn viable_components(
    context: &DomainContext,
    carrier: &str,
    requested_kw: f64,
    infinite_carriers: &BTreeSet<String>,
    guaranteed_potential: &BTreeMap<String, f64>,
) -> BTreeMap<String, CandidateComponent> {
    let catalog = &context.catalog;
    let mut viable = BTreeMap::new();

    let mut candidates: Vec<(ComponentModel, Option<ComponentModel>)> = catalog
        .active_producers_of(carrier)
        .into_iter()
        .map(|model| (model.clone(), None))
        .collect();
    if candidates.is_empty() {
        // no direct producer: reach the carrier through a passive converter
        for adapter in catalog.passive_converters_to(carrier) {
            let source_carrier = adapter
                .converts_from
                .as_deref()
                .expect("passive converters declare their source carrier");
            for model in catalog.active_producers_of(source_carrier) {
                candidates.push((model.clone(), Some(adapter.clone())));
            }
        }
    }

    'candidates: for (model, adapter) in candidates {
        let mut max_capacity = requested_kw.min(model.maximum_capacity_kw);
        for input in &model.inputs_per_main_kwh {
            if infinite_carriers.contains(&input.carrier) {
                continue;
            }
            if let Some(&guaranteed) = guaranteed_potential.get(&input.carrier) {
                if guaranteed > 0.0 && input.factor > 0.0 {
                    max_capacity = max_capacity.min(guaranteed / input.factor);
                    continue;
                }
            }
            if catalog.active_producers_of(&input.carrier).is_empty() {
                continue 'candidates;
            }
        }
        if max_capacity < model.minimum_capacity_kw {
            continue;
        }
        viable.insert(
            model.code.clone(),
            CandidateComponent {
                model,
                max_capacity_kw: max_capacity,
                adapter,
            },
        );
    }
    viable
}

/// Peak input requirement per carrier when every component of the category
/// runs at its maximum capacity.
fn max_input_requirements(
    components: &BTreeMap<String, CandidateComponent>,
) -> BTreeMap<String, f64> {
    let mut requirements: BTreeMap<String, f64> = BTreeMap::new();
    for candidate in components.values() {
        for input in &candidate.model.inputs_per_main_kwh {
            *requirements.entry(input.carrier.clone()).or_insert(0.0) +=
                input.factor * candidate.max_capacity_kw;
        }
    }
    requirements
}

/// Peak output quantity per carrier at maximum capacity.
fn max_output_quantities(
    components: &BTreeMap<String, CandidateComponent>,
) -> BTreeMap<String, f64> {
    let mut quantities: BTreeMap<String, f64> = BTreeMap::new();
    for candidate in components.values() {
        for output in &candidate.model.outputs_per_main_kwh {
            *quantities.entry(output.carrier.clone()).or_insert(0.0) +=
                output.factor * candidate.max_capacity_kw;
        }
    }
    quantities
}

/// Requirements that neither a grid nor a guaranteed potential can cover.
fn open_requirements(
    requirements: &BTreeMap<String, f64>,
    infinite_carriers: &BTreeSet<String>,
    guaranteed_potential: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    requirements
        .iter()
        .filter(|(carrier, _)| !infinite_carriers.contains(*carrier))
        .filter_map(|(carrier, &amount)| {
            let open = amount - guaranteed_potential.get(carrier).copied().unwrap_or(0.0);
            (open > 1e-9).then(|| (carrier.clone(), open))
        })
        .collect()
}

/// The upstream components consuming `carrier` and the share of the sizing
/// requirement each causes at full capacity.
fn dependency_group(
    consumers: &BTreeMap<String, CandidateComponent>,
    carrier: &str,
    total: f64,
) -> DependencyGroup {
    let mut group = DependencyGroup::default();
    if total <= 0.0 {
        return group;
    }
    for candidate in consumers.values() {
        for input in &candidate.model.inputs_per_main_kwh {
            if input.carrier == carrier {
                group.components.push(candidate.model.code.clone());
                group
                    .factors
                    .push(input.factor * candidate.max_capacity_kw / total);
            }
        }
    }
    group
}

/// Like [`dependency_group`], but for the components releasing `carrier`.
fn output_dependency_group(
    producers: &BTreeMap<String, CandidateComponent>,
    carrier: &str,
    total: f64,
) -> DependencyGroup {
    let mut group = DependencyGroup::default();
    if total <= 0.0 {
        return group;
    }
    for candidate in producers.values() {
        for output in &candidate.model.outputs_per_main_kwh {
            if output.carrier == carrier {
                group.components.push(candidate.model.code.clone());
                group
                    .factors
                    .push(output.factor * candidate.max_capacity_kw / total);
            }
        }
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::flows::HOURS_PER_YEAR;
    use crate::engine::config::RunSettings;
    use crate::engine::context::fixtures::context_with;

    fn heating_demand(peak: f64) -> EnergyFlow {
        let mut profile = vec![peak / 2.0; HOURS_PER_YEAR];
        profile[0] = peak;
        EnergyFlow::new(Placement::Primary, Placement::Consumer, "T60W", profile).unwrap()
    }

    fn cooling_demand(peak: f64) -> EnergyFlow {
        let mut profile = vec![peak / 2.0; HOURS_PER_YEAR];
        profile[0] = peak;
        EnergyFlow::new(Placement::Primary, Placement::Consumer, "T10W", profile).unwrap()
    }

    #[test]
    fn heating_structures_need_no_tertiary_equipment() {
        let context = context_with(RunSettings::defaults(), false);
        let structure =
            SupplySystemStructure::build(&context, "N1001", &heating_demand(500.0), BTreeMap::new())
                .unwrap();
        assert!(!structure.components[&Placement::Primary].is_empty());
        assert!(structure.components[&Placement::Tertiary].is_empty());
        // grid-backed boilers and heat pumps need no secondary production
        assert!(structure.components[&Placement::Secondary].is_empty());
        // HP2 requires a geothermal potential that this domain lacks
        assert!(!structure.components[&Placement::Primary].contains_key("HP2"));
    }

    #[test]
    fn cooling_structures_cascade_into_secondary_and_tertiary() {
        let mut settings = RunSettings::defaults();
        settings.network_temperature_celsius = 10.0;
        let context = context_with(settings, false);
        let structure =
            SupplySystemStructure::build(&context, "N1001", &cooling_demand(400.0), BTreeMap::new())
                .unwrap();
        let primary: Vec<&String> =
            structure.components[&Placement::Primary].keys().collect();
        assert_eq!(primary, vec!["ACH1", "VCC1", "VCC2"]);
        // the absorption chiller pulls high-temperature heat from a boiler
        assert!(structure.components[&Placement::Secondary].contains_key("BO2"));
        // condenser heat must be absorbed by cooling towers
        assert!(structure.components[&Placement::Tertiary].contains_key("CT1"));
        // capacity indicator slots follow the activation order per category
        let codes: Vec<&str> = structure
            .capacity_indicators
            .indicators()
            .iter()
            .map(|i| i.code.as_str())
            .collect();
        assert_eq!(codes, vec!["VCC1", "VCC2", "ACH1", "BO2", "CT1", "CT2"]);
    }

    #[test]
    fn potentials_cap_component_sizes_instead_of_excluding_them() {
        let mut potentials = BTreeMap::new();
        potentials.insert(
            "T15B".to_string(),
            EnergyFlow::constant(Placement::Source, Placement::Secondary, "T15B", 100.0),
        );
        let context = context_with(RunSettings::defaults(), false);
        let structure =
            SupplySystemStructure::build(&context, "B1001", &heating_demand(500.0), potentials)
                .unwrap();
        let hp2 = structure.candidate(Placement::Primary, "HP2").unwrap();
        // T15B draw factor is 1 - 1/4.2; the 100 kW potential caps the unit
        let expected = 100.0 / (1.0 - 1.0 / 4.2);
        assert!((hp2.max_capacity_kw - expected).abs() < 1e-6);
    }

    #[test]
    fn zero_demand_subsystems_are_rejected() {
        let context = context_with(RunSettings::defaults(), false);
        let demand = EnergyFlow::zeros(Placement::Primary, Placement::Consumer, "T60W");
        assert!(matches!(
            SupplySystemStructure::build(&context, "B1001", &demand, BTreeMap::new()),
            Err(EngineError::InfeasibleStructure { .. })
        ));
    }
}
