use crate::core::models::carriers::EnergyCarrierRegistry;
use crate::core::models::flows::{CarrierLedger, EnergyFlow, Placement};
use crate::core::technologies::component::{Component, PassiveComponent};
use crate::engine::capacity::CapacityIndicatorVector;
use crate::engine::config::Objective;
use crate::engine::error::EngineError;
use crate::engine::fitness::Fitness;
use crate::engine::structure::{CATEGORIES, SupplySystemStructure};
use std::collections::BTreeMap;

/// One concrete supply system: a structure instantiated through a capacity
/// indicator vector and operated against its demand.
///
/// Evaluation is a pure function of `(structure, capacity vector, demand)`;
/// identical inputs produce bit-identical cost, emission and energy figures,
/// which the memoization layers rely on.
#[derive(Debug, Clone)]
pub struct SupplySystem {
    pub target: String,
    pub capacity_indicator_vector: CapacityIndicatorVector,
    pub installed: BTreeMap<Placement, BTreeMap<String, Component>>,
    pub adapters: BTreeMap<Placement, BTreeMap<String, PassiveComponent>>,
    pub component_inputs: BTreeMap<Placement, BTreeMap<String, BTreeMap<String, EnergyFlow>>>,
    pub component_outputs: BTreeMap<Placement, BTreeMap<String, BTreeMap<String, EnergyFlow>>>,
    pub used_potentials: BTreeMap<String, EnergyFlow>,
    pub system_energy_demand: CarrierLedger,
    pub heat_rejection: CarrierLedger,
    pub greenhouse_gas_emissions: CarrierLedger,
    pub annual_cost: BTreeMap<String, f64>,
    pub fitness: Fitness,
}

impl SupplySystem {
    /// Builds and operates the supply system:
    ///
    /// 1. size the components prescribed by the capacity indicators,
    /// 2. serve the main demand with the primary components (water-filling
    ///    activation), drawing on local potentials and grids first,
    /// 3. serve the primary components' inputs with the secondary ones,
    /// 4. absorb the non-releasable outputs with the tertiary ones,
    /// 5. close the system balance and derive cost, emissions, energy
    ///    demand and heat rejection.
    pub fn evaluate(
        structure: &SupplySystemStructure,
        capacity_indicator_vector: CapacityIndicatorVector,
        demand: &EnergyFlow,
        objectives: &[Objective],
        registry: &EnergyCarrierRegistry,
    ) -> Result<SupplySystem, EngineError> {
        let mut system = SupplySystem {
            target: structure.target.clone(),
            capacity_indicator_vector,
            installed: CATEGORIES.iter().map(|&c| (c, BTreeMap::new())).collect(),
            adapters: CATEGORIES.iter().map(|&c| (c, BTreeMap::new())).collect(),
            component_inputs: CATEGORIES.iter().map(|&c| (c, BTreeMap::new())).collect(),
            component_outputs: CATEGORIES.iter().map(|&c| (c, BTreeMap::new())).collect(),
            used_potentials: BTreeMap::new(),
            system_energy_demand: CarrierLedger::new(),
            heat_rejection: CarrierLedger::new(),
            greenhouse_gas_emissions: CarrierLedger::new(),
            annual_cost: BTreeMap::new(),
            fitness: Fitness::new(Vec::new()),
        };

        system.build_components(structure)?;

        // primary components against the main demand
        let primary_demand =
            BTreeMap::from([(structure.main_carrier.clone(), demand.clone())]);
        let remaining = system.draw_from_potentials(structure, primary_demand, true);
        let remaining = system.draw_from_infinite_sources(structure, remaining);
        system.water_fill(structure, Placement::Primary, remaining)?;

        // secondary components against the primary components' inputs
        let secondary_demand = system.group_flows_by_carrier(&[Placement::Primary], Side::In);
        let remaining = system.draw_from_potentials(structure, secondary_demand, false);
        let remaining = system.draw_from_infinite_sources(structure, remaining);
        system.water_fill(structure, Placement::Secondary, remaining)?;

        // tertiary components against the non-releasable outputs
        let releases =
            system.group_flows_by_carrier(&[Placement::Primary, Placement::Secondary], Side::Out);
        let tertiary_demand = system.release_to_grids_or_env(structure, releases);
        system.water_fill(structure, Placement::Tertiary, tertiary_demand)?;

        // the supporting categories' own inputs and outputs close the
        // balance
        let inflows =
            system.group_flows_by_carrier(&[Placement::Secondary, Placement::Tertiary], Side::In);
        let remaining = system.draw_from_potentials(structure, inflows, false);
        let unmet = system.draw_from_infinite_sources(structure, remaining);
        let outflows = system.group_flows_by_carrier(&[Placement::Tertiary], Side::Out);
        let unreleasable = system.release_to_grids_or_env(structure, outflows);
        if let Some(carrier) = unmet.keys().chain(unreleasable.keys()).next() {
            return Err(EngineError::Evaluation {
                target: structure.target.clone(),
                reason: format!(
                    "the energy carrier '{carrier}' could not be balanced against the available \
                     potentials, grids and the environment"
                ),
            });
        }

        system.calculate_greenhouse_gas_emissions(registry)?;
        system.calculate_cost(registry)?;
        system.calculate_fitness(objectives);
        Ok(system)
    }

    /// Sizes the components the capacity indicators prescribe. Indicators
    /// whose resulting capacity falls below the catalog minimum install
    /// nothing.
    fn build_components(&mut self, structure: &SupplySystemStructure) -> Result<(), EngineError> {
        for indicator in self.capacity_indicator_vector.indicators().to_vec() {
            let Some(candidate) = structure.candidate(indicator.category, &indicator.code) else {
                return Err(EngineError::Internal(format!(
                    "capacity indicator '{}' has no matching candidate component",
                    indicator.code
                )));
            };
            let capacity = indicator.value() * candidate.max_capacity_kw;
            if capacity <= 0.0 || capacity < candidate.model.minimum_capacity_kw {
                continue;
            }
            let component = Component::from_model(
                &candidate.model,
                indicator.category,
                capacity,
                structure.interest_rate,
            )?;
            if let Some(adapter_model) = &candidate.adapter {
                let adapter = PassiveComponent::from_model(
                    adapter_model,
                    indicator.category,
                    capacity,
                    structure.interest_rate,
                )?;
                self.adapters
                    .get_mut(&indicator.category)
                    .expect("categories are preallocated")
                    .insert(indicator.code.clone(), adapter);
            }
            self.installed
                .get_mut(&indicator.category)
                .expect("categories are preallocated")
                .insert(indicator.code.clone(), component);
        }
        Ok(())
    }

    /// Serves each demand flow by ramping up the installed components of
    /// the category in activation order, each to its capacity, until the
    /// demand is exhausted (the water-filling principle).
    fn water_fill(
        &mut self,
        structure: &SupplySystemStructure,
        placement: Placement,
        demands: BTreeMap<String, EnergyFlow>,
    ) -> Result<(), EngineError> {
        for (carrier, mut demand) in demands {
            if demand.is_zero() {
                continue;
            }
            let Some(order) = structure.activation_order.get(&placement) else {
                continue;
            };
            for code in order {
                let serves = structure
                    .selection_by_carrier
                    .get(&placement)
                    .and_then(|by_carrier| by_carrier.get(&carrier))
                    .map(|codes| codes.contains(code))
                    .unwrap_or(false);
                if !serves {
                    continue;
                }
                let Some(component) = self.installed[&placement].get(code) else {
                    continue;
                };
                let adapter = self.adapters[&placement].get(code);
                // an adapter converts with losses, so the demand-side cap is
                // lower than the component's nameplate capacity
                let effective_capacity = match adapter {
                    Some(adapter) => {
                        let converted = adapter.convert(&EnergyFlow::constant(
                            Placement::Source,
                            placement,
                            &carrier,
                            1.0,
                        ));
                        component.capacity_kw / converted.profile()[0]
                    }
                    None => component.capacity_kw,
                };
                let main_flow = demand.cap_at(effective_capacity);
                demand = demand.minus(&main_flow)?;
                let operated_flow = match adapter {
                    Some(adapter) => adapter.convert(&main_flow),
                    None => main_flow,
                };
                let (inputs, outputs) = component.operate(&operated_flow)?;
                let component = component.clone();
                self.record_flows(placement, &component.code, inputs, outputs)?;
                if demand.is_zero() {
                    break;
                }
            }
            if demand.peak() > 1e-9 {
                return Err(EngineError::Evaluation {
                    target: structure.target.clone(),
                    reason: format!(
                        "the installed capacity was insufficient; another {:.1} kW of '{carrier}' \
                         would be required",
                        demand.peak()
                    ),
                });
            }
        }
        Ok(())
    }

    fn record_flows(
        &mut self,
        placement: Placement,
        code: &str,
        inputs: BTreeMap<String, EnergyFlow>,
        outputs: BTreeMap<String, EnergyFlow>,
    ) -> Result<(), EngineError> {
        let input_bucket = self
            .component_inputs
            .get_mut(&placement)
            .expect("categories are preallocated")
            .entry(code.to_string())
            .or_default();
        for (carrier, flow) in inputs {
            match input_bucket.remove(&carrier) {
                Some(existing) => {
                    input_bucket.insert(carrier, existing.plus(&flow)?);
                }
                None => {
                    input_bucket.insert(carrier, flow);
                }
            }
        }
        let output_bucket = self
            .component_outputs
            .get_mut(&placement)
            .expect("categories are preallocated")
            .entry(code.to_string())
            .or_default();
        for (carrier, flow) in outputs {
            match output_bucket.remove(&carrier) {
                Some(existing) => {
                    output_bucket.insert(carrier, existing.plus(&flow)?);
                }
                None => {
                    output_bucket.insert(carrier, flow);
                }
            }
        }
        Ok(())
    }

    /// Energy flows into or out of the given categories, aggregated by
    /// carrier.
    fn group_flows_by_carrier(
        &self,
        placements: &[Placement],
        side: Side,
    ) -> BTreeMap<String, EnergyFlow> {
        let buckets = match side {
            Side::In => &self.component_inputs,
            Side::Out => &self.component_outputs,
        };
        let mut grouped: BTreeMap<String, EnergyFlow> = BTreeMap::new();
        for placement in placements {
            for flows in buckets[placement].values() {
                for (carrier, flow) in flows {
                    match grouped.remove(carrier) {
                        Some(existing) => {
                            grouped.insert(
                                carrier.clone(),
                                existing
                                    .plus(flow)
                                    .expect("flows grouped by carrier share the carrier"),
                            );
                        }
                        None => {
                            grouped.insert(carrier.clone(), flow.clone());
                        }
                    }
                }
            }
        }
        grouped
    }

    /// Covers what it can of the demands from the subsystem's local energy
    /// potentials and returns the remainder.
    fn draw_from_potentials(
        &mut self,
        structure: &SupplySystemStructure,
        demands: BTreeMap<String, EnergyFlow>,
        reset: bool,
    ) -> BTreeMap<String, EnergyFlow> {
        if reset {
            self.used_potentials.clear();
        }
        let mut remaining = BTreeMap::new();
        for (carrier, demand) in demands {
            let Some(available) = structure.available_potentials.get(&carrier) else {
                remaining.insert(carrier, demand);
                continue;
            };
            let unused = match self.used_potentials.get(&carrier) {
                Some(used) => available
                    .minus(used)
                    .expect("potential bookkeeping shares the carrier"),
                None => available.clone(),
            };
            let usable = unused.cap_at_profile(demand.profile());
            let left_over = demand
                .minus(&usable)
                .expect("potential draws share the demand carrier");
            match self.used_potentials.remove(&carrier) {
                Some(used) => {
                    self.used_potentials.insert(
                        carrier.clone(),
                        used.plus(&usable)
                            .expect("potential bookkeeping shares the carrier"),
                    );
                }
                None => {
                    self.used_potentials.insert(carrier.clone(), usable);
                }
            }
            remaining.insert(carrier, left_over);
        }
        remaining
    }

    /// Books demands of grid-supplied carriers as system energy demand and
    /// returns the rest.
    fn draw_from_infinite_sources(
        &mut self,
        structure: &SupplySystemStructure,
        demands: BTreeMap<String, EnergyFlow>,
    ) -> BTreeMap<String, EnergyFlow> {
        let mut remaining = BTreeMap::new();
        for (carrier, demand) in demands {
            if structure.infinite_carriers.contains(&carrier) {
                self.system_energy_demand.add(&carrier, demand.profile());
            } else {
                remaining.insert(carrier, demand);
            }
        }
        remaining
    }

    /// Books releasable flows as heat rejection (environment) or as demand
    /// reduction (grid feed-in) and returns what still needs absorbing.
    fn release_to_grids_or_env(
        &mut self,
        structure: &SupplySystemStructure,
        flows: BTreeMap<String, EnergyFlow>,
    ) -> BTreeMap<String, EnergyFlow> {
        let mut remaining = BTreeMap::new();
        for (carrier, flow) in flows {
            if structure.releasable_env_carriers.contains(&carrier) {
                self.heat_rejection.add(&carrier, flow.profile());
            } else if structure.releasable_grid_carriers.contains(&carrier) {
                self.system_energy_demand.deduct(&carrier, flow.profile());
            } else {
                remaining.insert(carrier, flow);
            }
        }
        remaining
    }

    /// Emissions of every positive system-demand flow at the carrier's unit
    /// GHG intensity.
    fn calculate_greenhouse_gas_emissions(
        &mut self,
        registry: &EnergyCarrierRegistry,
    ) -> Result<(), EngineError> {
        let mut emissions = CarrierLedger::new();
        for (carrier, profile) in self.system_energy_demand.iter() {
            let unit_ghg = registry.unit_ghg(carrier)?;
            let ghg: Vec<f64> = profile.iter().map(|v| v.max(0.0) * unit_ghg).collect();
            emissions.add(carrier, &ghg);
        }
        self.greenhouse_gas_emissions = emissions;
        Ok(())
    }

    /// Annualized component investment and maintenance plus the cost of the
    /// net carrier purchases.
    fn calculate_cost(&mut self, registry: &EnergyCarrierRegistry) -> Result<(), EngineError> {
        let mut cost: BTreeMap<String, f64> = BTreeMap::new();
        for placement in &CATEGORIES {
            for (code, component) in &self.installed[placement] {
                *cost.entry(code.clone()).or_insert(0.0) +=
                    component.capex_annual_usd + component.om_annual_usd;
            }
            for (code, adapter) in &self.adapters[placement] {
                let key = format!("{code}+{}", adapter.code);
                *cost.entry(key).or_insert(0.0) +=
                    adapter.capex_annual_usd + adapter.om_annual_usd;
            }
        }
        for (carrier, _) in self.system_energy_demand.iter() {
            let net = self.system_energy_demand.annual_total(carrier).max(0.0);
            let unit_cost = registry.unit_cost(carrier)?;
            if net > 0.0 && unit_cost > 0.0 {
                *cost.entry(carrier.to_string()).or_insert(0.0) += net * unit_cost;
            }
        }
        self.annual_cost = cost;
        Ok(())
    }

    fn calculate_fitness(&mut self, objectives: &[Objective]) {
        let values = objectives
            .iter()
            .map(|objective| self.objective_value(*objective))
            .collect();
        self.fitness = Fitness::new(values);
    }

    /// The system's value for one objective, in the objective's native
    /// unit (USD/a, kgCO2/a, kWh/a).
    pub fn objective_value(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Cost => self.annual_cost.values().sum(),
            Objective::GhgEmissions => self
                .greenhouse_gas_emissions
                .iter()
                .map(|(_, profile)| profile.iter().sum::<f64>())
                .sum(),
            Objective::SystemEnergyDemand => self
                .system_energy_demand
                .iter()
                .map(|(carrier, _)| self.system_energy_demand.annual_total(carrier))
                .sum(),
            Objective::AnthropogenicHeat => self
                .heat_rejection
                .iter()
                .map(|(_, profile)| profile.iter().sum::<f64>())
                .sum(),
        }
    }
}

enum Side {
    In,
    Out,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::flows::HOURS_PER_YEAR;
    use crate::engine::config::RunSettings;
    use crate::engine::context::fixtures::context_with;
    use crate::engine::structure::SupplySystemStructure;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn heating_demand(peak: f64) -> EnergyFlow {
        let mut profile = vec![peak / 2.0; HOURS_PER_YEAR];
        profile[0] = peak;
        EnergyFlow::new(Placement::Primary, Placement::Consumer, "T60W", profile).unwrap()
    }

    fn civ_with(
        structure: &SupplySystemStructure,
        values: &[(&str, f64)],
    ) -> CapacityIndicatorVector {
        let mut vector = structure.capacity_indicators.clone();
        let mut rng = StdRng::seed_from_u64(3);
        let new_values: Vec<f64> = vector
            .indicators()
            .iter()
            .map(|indicator| {
                values
                    .iter()
                    .find(|(code, _)| *code == indicator.code)
                    .map(|(_, value)| *value)
                    .unwrap_or(0.0)
            })
            .collect();
        vector.set_values(new_values, &mut rng).unwrap();
        vector
    }

    #[test]
    fn boiler_only_system_buys_gas_and_emits() {
        let context = context_with(RunSettings::defaults(), false);
        let demand = heating_demand(500.0);
        let structure =
            SupplySystemStructure::build(&context, "N1001", &demand, BTreeMap::new()).unwrap();
        let civ = civ_with(&structure, &[("BO1", 1.0)]);
        let objectives = [Objective::Cost, Objective::GhgEmissions];
        let system = SupplySystem::evaluate(
            &structure,
            civ,
            &demand,
            &objectives,
            &context.registry,
        )
        .unwrap();
        let gas = system.system_energy_demand.annual_total("NGAS");
        let expected_gas = demand.total() / 0.94;
        assert!((gas - expected_gas).abs() < 1e-6);
        let ghg = system.objective_value(Objective::GhgEmissions);
        assert!((ghg - expected_gas * 0.198).abs() < 1e-6);
        assert!(system.objective_value(Objective::Cost) > 0.0);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let context = context_with(RunSettings::defaults(), false);
        let demand = heating_demand(300.0);
        let structure =
            SupplySystemStructure::build(&context, "N1001", &demand, BTreeMap::new()).unwrap();
        let civ = civ_with(&structure, &[("BO1", 0.6), ("HP1", 0.5)]);
        let objectives = [
            Objective::Cost,
            Objective::GhgEmissions,
            Objective::SystemEnergyDemand,
        ];
        let first = SupplySystem::evaluate(
            &structure,
            civ.clone(),
            &demand,
            &objectives,
            &context.registry,
        )
        .unwrap();
        let second =
            SupplySystem::evaluate(&structure, civ, &demand, &objectives, &context.registry)
                .unwrap();
        assert_eq!(first.fitness, second.fitness);
        assert_eq!(first.annual_cost, second.annual_cost);
    }

    #[test]
    fn insufficient_capacity_is_an_evaluation_error() {
        let context = context_with(RunSettings::defaults(), false);
        let demand = heating_demand(500.0);
        let structure =
            SupplySystemStructure::build(&context, "N1001", &demand, BTreeMap::new()).unwrap();
        let civ = civ_with(&structure, &[("BO1", 0.3)]);
        let result = SupplySystem::evaluate(
            &structure,
            civ,
            &demand,
            &[Objective::Cost],
            &context.registry,
        );
        assert!(matches!(result, Err(EngineError::Evaluation { .. })));
    }

    #[test]
    fn cogeneration_feed_in_reduces_the_electricity_balance() {
        let context = context_with(RunSettings::defaults(), false);
        let demand = heating_demand(400.0);
        let structure =
            SupplySystemStructure::build(&context, "N1001", &demand, BTreeMap::new()).unwrap();
        let civ = civ_with(&structure, &[("CHP1", 1.0)]);
        let system = SupplySystem::evaluate(
            &structure,
            civ,
            &demand,
            &[Objective::Cost, Objective::SystemEnergyDemand],
            &context.registry,
        )
        .unwrap();
        // the cogeneration unit's electricity is fed into the grid
        assert!(system.system_energy_demand.annual_total("E230AC") < 0.0);
    }
}
