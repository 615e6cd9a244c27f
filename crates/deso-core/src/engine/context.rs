use crate::core::models::buildings::Building;
use crate::core::models::carriers::{EnergyCarrierRegistry, ThermalMedium};
use crate::core::models::ids::BuildingId;
use crate::core::models::potentials::EnergyPotential;
use crate::core::technologies::catalog::TechnologyCatalog;
use crate::engine::clustering::Clustering;
use crate::engine::config::RunSettings;
use crate::engine::error::EngineError;
use crate::engine::network::SubstrateGraph;
use nalgebra::Point2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use slotmap::SlotMap;
use std::collections::BTreeSet;

/// The immutable shared state of one optimization run.
///
/// Every component borrows the context instead of consulting global state;
/// parallel evaluation tasks can therefore share it freely, and nothing has
/// to be re-initialized per worker.
pub struct DomainContext {
    pub registry: EnergyCarrierRegistry,
    pub catalog: TechnologyCatalog,
    pub settings: RunSettings,
    buildings: SlotMap<BuildingId, Building>,
    ordered: Vec<BuildingId>,
    zero_demand: BTreeSet<String>,
    pub substrate: SubstrateGraph,
    /// Cluster index per building (domain order); present when a
    /// cluster-aware operator is configured.
    pub clusters: Option<Vec<i32>>,
    /// Carrier the networks distribute, derived from the system type and
    /// network temperature.
    pub demand_carrier: String,
    pub potentials: Vec<EnergyPotential>,
}

impl DomainContext {
    pub fn new(
        registry: EnergyCarrierRegistry,
        catalog: TechnologyCatalog,
        settings: RunSettings,
        building_list: Vec<Building>,
        potentials: Vec<EnergyPotential>,
    ) -> Result<Self, EngineError> {
        if building_list.is_empty() {
            return Err(EngineError::Initialization(
                "the domain contains no buildings".to_string(),
            ));
        }
        let demand_carrier = registry
            .thermal_carrier_for(ThermalMedium::Water, settings.network_temperature_celsius)?
            .code
            .clone();

        let centroids: Vec<(String, Point2<f64>)> = building_list
            .iter()
            .map(|b| (b.identifier.clone(), b.location))
            .collect();
        let substrate = SubstrateGraph::generate_condensed_graph(&centroids);

        let zero_demand = building_list
            .iter()
            .filter(|b| b.has_zero_demand())
            .map(|b| b.identifier.clone())
            .collect();

        let mut buildings = SlotMap::with_key();
        let mut ordered = Vec::with_capacity(building_list.len());
        for building in building_list {
            ordered.push(buildings.insert(building));
        }

        let clusters = if settings.algorithm.needs_clusters() {
            let points = centroids.iter().map(|(_, p)| *p).collect();
            let mut rng = StdRng::seed_from_u64(settings.algorithm.seed);
            Some(Clustering::new(&substrate, points).cluster(settings.algorithm.clustering, &mut rng))
        } else {
            None
        };

        Ok(Self {
            registry,
            catalog,
            settings,
            buildings,
            ordered,
            zero_demand,
            substrate,
            clusters,
            demand_carrier,
            potentials,
        })
    }

    pub fn building_count(&self) -> usize {
        self.ordered.len()
    }

    /// Building identifiers in domain order; connectivity vectors align with
    /// this ordering.
    pub fn ordered_building_ids(&self) -> Vec<String> {
        self.ordered
            .iter()
            .map(|&id| self.buildings[id].identifier.clone())
            .collect()
    }

    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.ordered.iter().map(|&id| &self.buildings[id])
    }

    pub fn building(&self, identifier: &str) -> Option<&Building> {
        self.ordered
            .iter()
            .map(|&id| &self.buildings[id])
            .find(|b| b.identifier == identifier)
    }

    pub fn contains_building(&self, identifier: &str) -> bool {
        self.building(identifier).is_some()
    }

    pub fn is_zero_demand(&self, identifier: &str) -> bool {
        self.zero_demand.contains(identifier)
    }

    pub fn max_networks(&self) -> u16 {
        self.settings.algorithm.maximum_number_of_networks
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::core::models::flows::{EnergyFlow, HOURS_PER_YEAR, Placement};
    use crate::engine::config::RunSettings;

    /// A four-building test domain on a line, heating service, with one
    /// zero-demand building variant available.
    pub fn context_with(settings: RunSettings, zero_demand_last: bool) -> DomainContext {
        let mut buildings = Vec::new();
        for (index, name) in ["B1001", "B1002", "B1003", "B1004"].iter().enumerate() {
            let profile = if zero_demand_last && index == 3 {
                vec![0.0; HOURS_PER_YEAR]
            } else {
                let mut p = vec![10.0 + index as f64; HOURS_PER_YEAR];
                p[0] = 50.0 + index as f64;
                p
            };
            buildings.push(Building::new(
                name,
                Point2::new(100.0 * index as f64, 0.0),
                EnergyFlow::new(Placement::Primary, Placement::Consumer, "T60W", profile)
                    .unwrap(),
            ));
        }
        DomainContext::new(
            EnergyCarrierRegistry::builtin(),
            TechnologyCatalog::builtin(),
            settings,
            buildings,
            Vec::new(),
        )
        .unwrap()
    }

    pub fn default_context() -> DomainContext {
        context_with(RunSettings::defaults(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::default_context;

    #[test]
    fn context_derives_the_demand_carrier_from_the_network_temperature() {
        let context = default_context();
        assert_eq!(context.demand_carrier, "T60W");
        assert_eq!(context.building_count(), 4);
        assert_eq!(
            context.ordered_building_ids(),
            vec!["B1001", "B1002", "B1003", "B1004"]
        );
    }
}
