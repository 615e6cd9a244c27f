use super::flows::{EnergyFlow, FlowError, HOURS_PER_YEAR, Placement};
use std::collections::BTreeMap;

/// Technology or resource category an energy potential originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PotentialSource {
    PhotovoltaicPanels,
    PhotovoltaicThermal,
    SolarCollectorsFlatPlate,
    SolarCollectorsEvacuatedTube,
    Geothermal,
    WaterBody,
    SewageHeat,
}

impl PotentialSource {
    pub fn label(&self) -> &'static str {
        match self {
            PotentialSource::PhotovoltaicPanels => "PV",
            PotentialSource::PhotovoltaicThermal => "PVT",
            PotentialSource::SolarCollectorsFlatPlate => "SC_FP",
            PotentialSource::SolarCollectorsEvacuatedTube => "SC_ET",
            PotentialSource::Geothermal => "Geothermal",
            PotentialSource::WaterBody => "WaterBody",
            PotentialSource::SewageHeat => "Sewage",
        }
    }
}

/// Spatial scale the potential is available at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PotentialScale {
    Building,
    Network,
    Domain,
}

/// Availability of one renewable or waste-heat resource.
///
/// Source and scale are fixed at construction, before any profile is
/// registered. Building-scale potentials keep the per-building profile table
/// next to the running domain aggregate; co-generating sources (PVT) carry an
/// auxiliary profile in a second carrier.
#[derive(Debug, Clone)]
pub struct EnergyPotential {
    pub source: PotentialSource,
    pub scale: PotentialScale,
    pub main_carrier: String,
    pub auxiliary_carrier: Option<String>,
    domain_profile: Vec<f64>,
    auxiliary_domain_profile: Option<Vec<f64>>,
    building_profiles: BTreeMap<String, Vec<f64>>,
    auxiliary_building_profiles: BTreeMap<String, Vec<f64>>,
}

impl EnergyPotential {
    pub fn building_scale(
        source: PotentialSource,
        main_carrier: &str,
        auxiliary_carrier: Option<&str>,
    ) -> Self {
        Self {
            source,
            scale: PotentialScale::Building,
            main_carrier: main_carrier.to_string(),
            auxiliary_carrier: auxiliary_carrier.map(str::to_string),
            domain_profile: vec![0.0; HOURS_PER_YEAR],
            auxiliary_domain_profile: auxiliary_carrier.map(|_| vec![0.0; HOURS_PER_YEAR]),
            building_profiles: BTreeMap::new(),
            auxiliary_building_profiles: BTreeMap::new(),
        }
    }

    pub fn domain_scale(
        source: PotentialSource,
        main_carrier: &str,
        profile: Vec<f64>,
    ) -> Result<Self, FlowError> {
        if profile.len() != HOURS_PER_YEAR {
            return Err(FlowError::WrongProfileLength {
                expected: HOURS_PER_YEAR,
                got: profile.len(),
            });
        }
        Ok(Self {
            source,
            scale: PotentialScale::Domain,
            main_carrier: main_carrier.to_string(),
            auxiliary_carrier: None,
            domain_profile: profile,
            auxiliary_domain_profile: None,
            building_profiles: BTreeMap::new(),
            auxiliary_building_profiles: BTreeMap::new(),
        })
    }

    /// Registers one building's availability profile and folds it into the
    /// domain aggregate.
    pub fn add_building_profile(
        &mut self,
        building: &str,
        main: Vec<f64>,
        auxiliary: Option<Vec<f64>>,
    ) -> Result<(), FlowError> {
        if main.len() != HOURS_PER_YEAR {
            return Err(FlowError::WrongProfileLength {
                expected: HOURS_PER_YEAR,
                got: main.len(),
            });
        }
        for (acc, value) in self.domain_profile.iter_mut().zip(&main) {
            *acc += value;
        }
        self.building_profiles.insert(building.to_string(), main);
        if let (Some(aux), Some(domain_aux)) = (auxiliary, self.auxiliary_domain_profile.as_mut()) {
            if aux.len() != HOURS_PER_YEAR {
                return Err(FlowError::WrongProfileLength {
                    expected: HOURS_PER_YEAR,
                    got: aux.len(),
                });
            }
            for (acc, value) in domain_aux.iter_mut().zip(&aux) {
                *acc += value;
            }
            self.auxiliary_building_profiles
                .insert(building.to_string(), aux);
        }
        Ok(())
    }

    pub fn buildings(&self) -> impl Iterator<Item = &str> {
        self.building_profiles.keys().map(String::as_str)
    }

    /// The resource flow available to one building, if any was registered.
    pub fn main_flow_for_building(&self, building: &str) -> Option<EnergyFlow> {
        self.building_profiles.get(building).map(|profile| {
            EnergyFlow::new(
                Placement::Source,
                Placement::Secondary,
                &self.main_carrier,
                profile.clone(),
            )
            .expect("stored profiles have annual length")
        })
    }

    /// The resource flow pooled over a set of buildings (network scale).
    pub fn pooled_main_flow(&self, buildings: &[String]) -> Option<EnergyFlow> {
        let mut pooled = vec![0.0; HOURS_PER_YEAR];
        let mut any = false;
        for building in buildings {
            if let Some(profile) = self.building_profiles.get(building) {
                any = true;
                for (acc, value) in pooled.iter_mut().zip(profile) {
                    *acc += value;
                }
            }
        }
        if !any {
            return None;
        }
        Some(
            EnergyFlow::new(
                Placement::Source,
                Placement::Secondary,
                &self.main_carrier,
                pooled,
            )
            .expect("pooled profiles have annual length"),
        )
    }

    /// The domain-wide aggregate of the resource.
    pub fn domain_flow(&self) -> EnergyFlow {
        EnergyFlow::new(
            Placement::Source,
            Placement::Secondary,
            &self.main_carrier,
            self.domain_profile.clone(),
        )
        .expect("domain profiles have annual length")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_profiles_fold_into_domain_aggregate() {
        let mut potential =
            EnergyPotential::building_scale(PotentialSource::PhotovoltaicPanels, "E230AC", None);
        potential
            .add_building_profile("B1001", vec![1.0; HOURS_PER_YEAR], None)
            .unwrap();
        potential
            .add_building_profile("B1002", vec![2.0; HOURS_PER_YEAR], None)
            .unwrap();
        assert_eq!(potential.domain_flow().profile()[0], 3.0);
        let pooled = potential
            .pooled_main_flow(&["B1001".to_string(), "B1002".to_string()])
            .unwrap();
        assert_eq!(pooled.profile()[0], 3.0);
        assert!(potential.main_flow_for_building("B9999").is_none());
    }

    #[test]
    fn auxiliary_profile_requires_auxiliary_carrier() {
        let mut potential = EnergyPotential::building_scale(
            PotentialSource::PhotovoltaicThermal,
            "T60W",
            Some("E230AC"),
        );
        potential
            .add_building_profile(
                "B1001",
                vec![1.0; HOURS_PER_YEAR],
                Some(vec![0.5; HOURS_PER_YEAR]),
            )
            .unwrap();
        assert_eq!(
            potential.auxiliary_domain_profile.as_ref().unwrap()[0],
            0.5
        );
    }

    #[test]
    fn short_profiles_are_rejected() {
        let result = EnergyPotential::domain_scale(PotentialSource::Geothermal, "T15B", vec![1.0]);
        assert!(result.is_err());
    }
}
