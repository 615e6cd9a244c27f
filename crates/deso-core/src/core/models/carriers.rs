use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unknown energy carrier code: '{0}'. It could not be found in the energy carrier catalog.")]
    UnknownCarrier(String),

    #[error("No {medium:?} carrier in the catalog can transport heat at {temperature} °C")]
    NoThermalCarrier {
        medium: ThermalMedium,
        temperature: f64,
    },

    #[error("No {current:?} carrier in the catalog operates near {voltage} V")]
    NoElectricalCarrier {
        current: ElectricalCurrent,
        voltage: f64,
    },

    #[error("Invalid carrier record '{code}': {message}")]
    InvalidCarrier { code: String, message: String },

    #[error("Unknown component code: '{0}'. It could not be found in the technology catalog.")]
    UnknownComponent(String),

    #[error("Invalid component record '{code}': {message}")]
    InvalidComponent { code: String, message: String },

    #[error("Failed to parse carrier catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Transport medium of a thermal energy carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThermalMedium {
    Water,
    Air,
    Brine,
}

/// Current type of an electrical energy carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElectricalCurrent {
    Ac,
    Dc,
}

/// Origin of a combustible energy carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FuelOrigin {
    Fossil,
    Biofuel,
}

/// Overarching classification of an energy carrier.
///
/// The qualifier value attached to each kind (temperature for thermal
/// carriers, voltage for electrical ones) lives on the carrier itself as
/// [`EnergyCarrier::mean_quality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CarrierKind {
    Thermal(ThermalMedium),
    Electrical(ElectricalCurrent),
    Combustible(FuelOrigin),
}

impl CarrierKind {
    /// Unit of the carrier's qualifier value (`°C`, `V`, or `-`).
    pub fn quality_unit(&self) -> &'static str {
        match self {
            CarrierKind::Thermal(_) => "°C",
            CarrierKind::Electrical(_) => "V",
            CarrierKind::Combustible(_) => "-",
        }
    }
}

/// A typed, quality-qualified transport medium for energy.
///
/// Energy carriers are immutable catalog values; every energy flow in the
/// system references exactly one of them by code. Costs are in USD per kWh,
/// emissions in kg CO2-eq per kWh.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyCarrier {
    pub code: String,
    pub description: String,
    pub kind: CarrierKind,
    /// Temperature in °C for thermal carriers, voltage in V for electrical
    /// ones, unused for combustibles.
    pub mean_quality: f64,
    pub unit_cost_usd_per_kwh: f64,
    pub unit_ghg_kg_per_kwh: f64,
}

impl EnergyCarrier {
    pub fn is_thermal(&self) -> bool {
        matches!(self.kind, CarrierKind::Thermal(_))
    }

    pub fn is_electrical(&self) -> bool {
        matches!(self.kind, CarrierKind::Electrical(_))
    }

    pub fn is_combustible(&self) -> bool {
        matches!(self.kind, CarrierKind::Combustible(_))
    }
}

#[derive(Debug, Deserialize)]
struct CarrierRecord {
    code: String,
    description: String,
    kind: String,
    subtype: String,
    #[serde(default)]
    mean_quality: f64,
    #[serde(default)]
    unit_cost_usd_per_kwh: f64,
    #[serde(default)]
    unit_ghg_kg_per_kwh: f64,
}

#[derive(Debug, Deserialize)]
struct CarrierCatalogFile {
    #[serde(rename = "carrier")]
    carriers: Vec<CarrierRecord>,
}

impl CarrierRecord {
    fn into_carrier(self) -> Result<EnergyCarrier, CatalogError> {
        let kind = match (self.kind.as_str(), self.subtype.as_str()) {
            ("thermal", "water") => CarrierKind::Thermal(ThermalMedium::Water),
            ("thermal", "air") => CarrierKind::Thermal(ThermalMedium::Air),
            ("thermal", "brine") => CarrierKind::Thermal(ThermalMedium::Brine),
            ("electrical", "AC") => CarrierKind::Electrical(ElectricalCurrent::Ac),
            ("electrical", "DC") => CarrierKind::Electrical(ElectricalCurrent::Dc),
            ("combustible", "fossil") => CarrierKind::Combustible(FuelOrigin::Fossil),
            ("combustible", "biofuel") => CarrierKind::Combustible(FuelOrigin::Biofuel),
            (kind, subtype) => {
                return Err(CatalogError::InvalidCarrier {
                    code: self.code,
                    message: format!(
                        "unsupported kind/subtype combination '{kind}'/'{subtype}'; valid kinds \
                         are 'thermal' (water|air|brine), 'electrical' (AC|DC) and 'combustible' \
                         (fossil|biofuel)"
                    ),
                });
            }
        };
        Ok(EnergyCarrier {
            code: self.code,
            description: self.description,
            kind,
            mean_quality: self.mean_quality,
            unit_cost_usd_per_kwh: self.unit_cost_usd_per_kwh,
            unit_ghg_kg_per_kwh: self.unit_ghg_kg_per_kwh,
        })
    }
}

/// The fixed catalog of energy carriers available to a domain.
///
/// Lookups by code fail fast; quality-based lookups snap to the catalogued
/// carrier closest to the requested temperature or voltage.
#[derive(Debug, Clone, Default)]
pub struct EnergyCarrierRegistry {
    carriers: BTreeMap<String, EnergyCarrier>,
}

impl EnergyCarrierRegistry {
    /// The built-in default catalog.
    ///
    /// Covers the carriers the built-in technology catalog converts between:
    /// chilled/low-/medium-/high-temperature water, ambient air, grid
    /// electricity and the two combustible fuels.
    pub fn builtin() -> Self {
        let carriers = [
            ("T10W", "Chilled water, 10 °C", CarrierKind::Thermal(ThermalMedium::Water), 10.0, 0.0, 0.0),
            ("T30W", "Low-temperature water, 30 °C", CarrierKind::Thermal(ThermalMedium::Water), 30.0, 0.0, 0.0),
            ("T60W", "Medium-temperature water, 60 °C", CarrierKind::Thermal(ThermalMedium::Water), 60.0, 0.0, 0.0),
            ("T90W", "High-temperature water, 90 °C", CarrierKind::Thermal(ThermalMedium::Water), 90.0, 0.0, 0.0),
            ("T15B", "Ground-loop brine, 15 °C", CarrierKind::Thermal(ThermalMedium::Brine), 15.0, 0.0, 0.0),
            ("T25A", "Ambient air, 25 °C", CarrierKind::Thermal(ThermalMedium::Air), 25.0, 0.0, 0.0),
            ("E230AC", "Grid electricity, 230 V AC", CarrierKind::Electrical(ElectricalCurrent::Ac), 230.0, 0.22, 0.212),
            ("NGAS", "Natural gas", CarrierKind::Combustible(FuelOrigin::Fossil), 0.0, 0.09, 0.198),
            ("WPEL", "Wood pellets", CarrierKind::Combustible(FuelOrigin::Biofuel), 0.0, 0.07, 0.027),
        ];
        let carriers = carriers
            .into_iter()
            .map(|(code, description, kind, mean_quality, cost, ghg)| {
                (
                    code.to_string(),
                    EnergyCarrier {
                        code: code.to_string(),
                        description: description.to_string(),
                        kind,
                        mean_quality,
                        unit_cost_usd_per_kwh: cost,
                        unit_ghg_kg_per_kwh: ghg,
                    },
                )
            })
            .collect();
        Self { carriers }
    }

    /// Parses a carrier catalog from its TOML representation.
    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let file: CarrierCatalogFile = toml::from_str(text)?;
        let mut carriers = BTreeMap::new();
        for record in file.carriers {
            let carrier = record.into_carrier()?;
            carriers.insert(carrier.code.clone(), carrier);
        }
        Ok(Self { carriers })
    }

    pub fn get(&self, code: &str) -> Result<&EnergyCarrier, CatalogError> {
        self.carriers
            .get(code)
            .ok_or_else(|| CatalogError::UnknownCarrier(code.to_string()))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.carriers.contains_key(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnergyCarrier> {
        self.carriers.values()
    }

    pub fn unit_cost(&self, code: &str) -> Result<f64, CatalogError> {
        Ok(self.get(code)?.unit_cost_usd_per_kwh)
    }

    pub fn unit_ghg(&self, code: &str) -> Result<f64, CatalogError> {
        Ok(self.get(code)?.unit_ghg_kg_per_kwh)
    }

    /// All thermal carriers of the given medium, ordered by temperature.
    pub fn thermal_carriers(&self, medium: ThermalMedium) -> Vec<&EnergyCarrier> {
        let mut carriers: Vec<_> = self
            .carriers
            .values()
            .filter(|c| c.kind == CarrierKind::Thermal(medium))
            .collect();
        carriers.sort_by(|a, b| a.mean_quality.total_cmp(&b.mean_quality));
        carriers
    }

    /// Snaps a temperature to the catalogued thermal carrier closest to it.
    pub fn thermal_carrier_for(
        &self,
        medium: ThermalMedium,
        temperature: f64,
    ) -> Result<&EnergyCarrier, CatalogError> {
        self.thermal_carriers(medium)
            .into_iter()
            .min_by(|a, b| {
                (a.mean_quality - temperature)
                    .abs()
                    .total_cmp(&(b.mean_quality - temperature).abs())
            })
            .ok_or(CatalogError::NoThermalCarrier {
                medium,
                temperature,
            })
    }

    /// Thermal carriers of the same medium with a strictly higher temperature.
    pub fn hotter_thermal_carriers(&self, carrier: &EnergyCarrier) -> Vec<&EnergyCarrier> {
        match carrier.kind {
            CarrierKind::Thermal(medium) => self
                .thermal_carriers(medium)
                .into_iter()
                .filter(|c| c.mean_quality > carrier.mean_quality)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Thermal carriers of the same medium with a strictly lower temperature.
    pub fn colder_thermal_carriers(&self, carrier: &EnergyCarrier) -> Vec<&EnergyCarrier> {
        match carrier.kind {
            CarrierKind::Thermal(medium) => self
                .thermal_carriers(medium)
                .into_iter()
                .filter(|c| c.mean_quality < carrier.mean_quality)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Snaps a voltage to the catalogued electrical carrier closest to it.
    pub fn electrical_carrier_for(
        &self,
        current: ElectricalCurrent,
        voltage: f64,
    ) -> Result<&EnergyCarrier, CatalogError> {
        self.carriers
            .values()
            .filter(|c| c.kind == CarrierKind::Electrical(current))
            .min_by(|a, b| {
                (a.mean_quality - voltage)
                    .abs()
                    .total_cmp(&(b.mean_quality - voltage).abs())
            })
            .ok_or(CatalogError::NoElectricalCarrier { current, voltage })
    }

    /// Carriers drawable in unlimited quantity from external grids
    /// (electricity and fuels).
    pub fn infinite_source_codes(&self) -> Vec<String> {
        self.carriers
            .values()
            .filter(|c| c.is_electrical() || c.is_combustible())
            .map(|c| c.code.clone())
            .collect()
    }

    /// Carriers that can be rejected directly to the environment.
    pub fn releasable_environmental_codes(&self) -> Vec<String> {
        self.carriers
            .values()
            .filter(|c| matches!(c.kind, CarrierKind::Thermal(ThermalMedium::Air)))
            .map(|c| c.code.clone())
            .collect()
    }

    /// Carriers that can be fed back into an external grid (surplus
    /// electricity from cogeneration).
    pub fn releasable_grid_codes(&self) -> Vec<String> {
        self.carriers
            .values()
            .filter(|c| c.is_electrical())
            .map(|c| c.code.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_resolves_known_codes() {
        let registry = EnergyCarrierRegistry::builtin();
        let carrier = registry.get("T60W").unwrap();
        assert_eq!(carrier.kind, CarrierKind::Thermal(ThermalMedium::Water));
        assert_eq!(carrier.mean_quality, 60.0);
        assert!(registry.get("T61W").is_err());
    }

    #[test]
    fn temperature_snaps_to_nearest_carrier() {
        let registry = EnergyCarrierRegistry::builtin();
        let carrier = registry
            .thermal_carrier_for(ThermalMedium::Water, 55.0)
            .unwrap();
        assert_eq!(carrier.code, "T60W");
        let carrier = registry
            .thermal_carrier_for(ThermalMedium::Water, 12.0)
            .unwrap();
        assert_eq!(carrier.code, "T10W");
    }

    #[test]
    fn hotter_and_colder_queries_are_ordered() {
        let registry = EnergyCarrierRegistry::builtin();
        let t30 = registry.get("T30W").unwrap();
        let hotter: Vec<_> = registry
            .hotter_thermal_carriers(t30)
            .iter()
            .map(|c| c.code.clone())
            .collect();
        assert_eq!(hotter, vec!["T60W", "T90W"]);
        let colder: Vec<_> = registry
            .colder_thermal_carriers(t30)
            .iter()
            .map(|c| c.code.clone())
            .collect();
        assert_eq!(colder, vec!["T10W"]);
    }

    #[test]
    fn grid_and_environment_classification() {
        let registry = EnergyCarrierRegistry::builtin();
        let infinite = registry.infinite_source_codes();
        assert!(infinite.contains(&"E230AC".to_string()));
        assert!(infinite.contains(&"NGAS".to_string()));
        assert!(!infinite.contains(&"T60W".to_string()));
        assert_eq!(registry.releasable_environmental_codes(), vec!["T25A"]);
    }

    #[test]
    fn toml_catalog_round_trips() {
        let text = r#"
            [[carrier]]
            code = "T40W"
            description = "Warm water, 40 °C"
            kind = "thermal"
            subtype = "water"
            mean_quality = 40.0
        "#;
        let registry = EnergyCarrierRegistry::from_toml_str(text).unwrap();
        assert_eq!(registry.get("T40W").unwrap().mean_quality, 40.0);
    }

    #[test]
    fn invalid_subtype_is_rejected() {
        let text = r#"
            [[carrier]]
            code = "X1"
            description = "Bogus"
            kind = "thermal"
            subtype = "plasma"
        "#;
        assert!(matches!(
            EnergyCarrierRegistry::from_toml_str(text),
            Err(CatalogError::InvalidCarrier { .. })
        ));
    }
}
