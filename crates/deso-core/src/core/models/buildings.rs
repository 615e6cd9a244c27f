use super::flows::EnergyFlow;
use nalgebra::Point2;

/// Connectivity designation a building carries before optimization, read
/// from the scenario's supply table or an imported base-network layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialConnectivity {
    /// The building is served by its own stand-alone supply system.
    StandAlone,
    /// The building is designated for district supply, network unspecified.
    AnyNetwork,
    /// The building belongs to one specific named network (e.g. "N1001").
    Named(String),
}

impl InitialConnectivity {
    /// Parses the supply-table encoding: `STANDALONE`, `NETWORK`, or a
    /// network identifier.
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "" | "STANDALONE" => InitialConnectivity::StandAlone,
            "NETWORK" => InitialConnectivity::AnyNetwork,
            name => InitialConnectivity::Named(name.to_string()),
        }
    }

    pub fn is_district(&self) -> bool {
        !matches!(self, InitialConnectivity::StandAlone)
    }
}

/// One building of the optimization domain.
///
/// Bundles the properties relevant to the energy-system search: the unique
/// identifier, the centroid location, the demand profile of the energy
/// service being optimized, and the connectivity state the neighbourhood is
/// currently built with. The stand-alone supply system that would serve the
/// building outside any network is computed by the engine and stored with
/// the optimization results, not here.
#[derive(Debug, Clone)]
pub struct Building {
    pub identifier: String,
    pub location: Point2<f64>,
    pub demand: EnergyFlow,
    pub initial_connectivity: InitialConnectivity,
}

impl Building {
    pub fn new(identifier: &str, location: Point2<f64>, demand: EnergyFlow) -> Self {
        Self {
            identifier: identifier.to_string(),
            location,
            demand,
            initial_connectivity: InitialConnectivity::StandAlone,
        }
    }

    /// Buildings without demand never join a network and are skipped when
    /// sizing supply systems.
    pub fn has_zero_demand(&self) -> bool {
        self.demand.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::flows::Placement;

    #[test]
    fn parses_supply_table_designations() {
        assert_eq!(
            InitialConnectivity::parse("STANDALONE"),
            InitialConnectivity::StandAlone
        );
        assert_eq!(
            InitialConnectivity::parse("NETWORK"),
            InitialConnectivity::AnyNetwork
        );
        assert_eq!(
            InitialConnectivity::parse("N1002"),
            InitialConnectivity::Named("N1002".to_string())
        );
        assert!(InitialConnectivity::parse("N1002").is_district());
        assert!(!InitialConnectivity::parse("").is_district());
    }

    #[test]
    fn zero_demand_detection() {
        let building = Building::new(
            "B1001",
            Point2::new(0.0, 0.0),
            EnergyFlow::zeros(Placement::Primary, Placement::Consumer, "T60W"),
        );
        assert!(building.has_zero_demand());
    }
}
