use super::component::{CarrierFactor, ComponentClass, ComponentModel};
use crate::core::models::carriers::CatalogError;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct ComponentRecord {
    code: String,
    description: String,
    main_carrier: String,
    #[serde(default)]
    inputs: Vec<CarrierFactor>,
    #[serde(default)]
    outputs: Vec<CarrierFactor>,
    minimum_capacity_kw: f64,
    maximum_capacity_kw: f64,
    base_cost_usd: f64,
    unit_cost_usd_per_kw: f64,
    lifetime_years: f64,
    om_share: f64,
    activation_priority: u8,
    #[serde(default)]
    converts_from: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TechnologyCatalogFile {
    #[serde(rename = "component")]
    components: Vec<ComponentRecord>,
}

/// The catalog of technology models a supply system can be assembled from.
#[derive(Debug, Clone, Default)]
pub struct TechnologyCatalog {
    models: BTreeMap<String, ComponentModel>,
}

impl TechnologyCatalog {
    /// The built-in default catalog.
    ///
    /// Conversion factors are expressed per kWh of the main flow. Heat
    /// pumps and chillers carry their compressor electricity on the input
    /// side; chillers and absorption units reject condenser heat as
    /// low-temperature water which tertiary equipment has to absorb.
    pub fn builtin() -> Self {
        let entries: Vec<ComponentModel> = vec![
            model(
                "HP1", "Air-source heat pump", "T60W",
                &[("E230AC", 1.0 / 3.2)], &[],
                (5.0, 8_000.0), 18_000.0, 480.0, 20.0, 0.02, 1, None,
            ),
            model(
                "HP2", "Ground-source heat pump", "T60W",
                &[("E230AC", 1.0 / 4.2), ("T15B", 1.0 - 1.0 / 4.2)], &[],
                (10.0, 6_000.0), 26_000.0, 620.0, 20.0, 0.02, 0, None,
            ),
            model(
                "BO1", "Condensing gas boiler", "T60W",
                &[("NGAS", 1.0 / 0.94)], &[],
                (10.0, 20_000.0), 12_000.0, 110.0, 20.0, 0.03, 2, None,
            ),
            model(
                "BO2", "High-temperature gas boiler", "T90W",
                &[("NGAS", 1.0 / 0.90)], &[],
                (10.0, 20_000.0), 13_500.0, 120.0, 20.0, 0.03, 3, None,
            ),
            model(
                "BO3", "Wood-pellet boiler", "T60W",
                &[("WPEL", 1.0 / 0.86)], &[],
                (20.0, 10_000.0), 21_000.0, 260.0, 20.0, 0.04, 4, None,
            ),
            model(
                "CHP1", "Gas-fired cogeneration unit", "T60W",
                &[("NGAS", 1.0 / 0.55)], &[("E230AC", 0.45 / 0.55)],
                (50.0, 15_000.0), 65_000.0, 900.0, 25.0, 0.04, 5, None,
            ),
            model(
                "VCC1", "Vapour-compression chiller, high efficiency", "T10W",
                &[("E230AC", 1.0 / 5.5)], &[("T30W", 1.0 + 1.0 / 5.5)],
                (10.0, 12_000.0), 28_000.0, 310.0, 20.0, 0.03, 1, None,
            ),
            model(
                "VCC2", "Vapour-compression chiller, standard", "T10W",
                &[("E230AC", 1.0 / 4.8)], &[("T30W", 1.0 + 1.0 / 4.8)],
                (5.0, 18_000.0), 17_000.0, 240.0, 20.0, 0.03, 2, None,
            ),
            model(
                "ACH1", "Absorption chiller", "T10W",
                &[("T90W", 1.0 / 0.7), ("E230AC", 0.02)],
                &[("T30W", 1.0 + 1.0 / 0.7 + 0.02)],
                (20.0, 8_000.0), 46_000.0, 520.0, 22.0, 0.04, 3, None,
            ),
            model(
                "CT1", "Wet cooling tower", "T30W",
                &[("E230AC", 0.02)], &[("T25A", 1.02)],
                (10.0, 40_000.0), 9_000.0, 75.0, 25.0, 0.03, 1, None,
            ),
            model(
                "CT2", "Hybrid cooling tower", "T30W",
                &[("E230AC", 0.035)], &[("T25A", 1.035)],
                (10.0, 25_000.0), 14_000.0, 105.0, 25.0, 0.03, 2, None,
            ),
            model(
                "HEX1", "Plate heat exchanger, 90/60", "T60W",
                &[("T90W", 1.0 / 0.95)], &[],
                (1.0, 50_000.0), 2_000.0, 18.0, 25.0, 0.01, 1, Some("T90W"),
            ),
            model(
                "HEX2", "Plate heat exchanger, 60/30", "T30W",
                &[("T60W", 1.0 / 0.95)], &[],
                (1.0, 50_000.0), 2_000.0, 18.0, 25.0, 0.01, 2, Some("T60W"),
            ),
        ];
        Self {
            models: entries
                .into_iter()
                .map(|m| (m.code.clone(), m))
                .collect(),
        }
    }

    /// Parses a technology catalog from its TOML representation.
    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let file: TechnologyCatalogFile = toml::from_str(text)?;
        let mut models = BTreeMap::new();
        for record in file.components {
            let class = ComponentClass::from_code(&record.code).ok_or_else(|| {
                CatalogError::InvalidComponent {
                    code: record.code.clone(),
                    message: "component code does not start with a known class prefix \
                              (BO, HP, VCC, ACH, CHP, CT, HEX)"
                        .to_string(),
                }
            })?;
            if class.is_passive() != record.converts_from.is_some() {
                return Err(CatalogError::InvalidComponent {
                    code: record.code.clone(),
                    message: "heat exchangers (and only heat exchangers) must declare \
                              'converts_from'"
                        .to_string(),
                });
            }
            models.insert(
                record.code.clone(),
                ComponentModel {
                    code: record.code,
                    class,
                    description: record.description,
                    main_carrier: record.main_carrier,
                    inputs_per_main_kwh: record.inputs,
                    outputs_per_main_kwh: record.outputs,
                    minimum_capacity_kw: record.minimum_capacity_kw,
                    maximum_capacity_kw: record.maximum_capacity_kw,
                    base_cost_usd: record.base_cost_usd,
                    unit_cost_usd_per_kw: record.unit_cost_usd_per_kw,
                    lifetime_years: record.lifetime_years,
                    om_share: record.om_share,
                    activation_priority: record.activation_priority,
                    converts_from: record.converts_from,
                },
            );
        }
        Ok(Self { models })
    }

    pub fn get(&self, code: &str) -> Result<&ComponentModel, CatalogError> {
        self.models
            .get(code)
            .ok_or_else(|| CatalogError::UnknownComponent(code.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentModel> {
        self.models.values()
    }

    /// Active models whose main carrier is the given one, ordered by
    /// activation priority.
    pub fn active_producers_of(&self, carrier: &str) -> Vec<&ComponentModel> {
        let mut producers: Vec<_> = self
            .models
            .values()
            .filter(|m| !m.is_passive() && m.main_carrier == carrier)
            .collect();
        producers.sort_by_key(|m| (m.activation_priority, m.code.clone()));
        producers
    }

    /// Passive converters that deliver the given carrier.
    pub fn passive_converters_to(&self, carrier: &str) -> Vec<&ComponentModel> {
        let mut converters: Vec<_> = self
            .models
            .values()
            .filter(|m| m.is_passive() && m.main_carrier == carrier)
            .collect();
        converters.sort_by_key(|m| (m.activation_priority, m.code.clone()));
        converters
    }
}

fn model(
    code: &str,
    description: &str,
    main_carrier: &str,
    inputs: &[(&str, f64)],
    outputs: &[(&str, f64)],
    capacity_range: (f64, f64),
    base_cost_usd: f64,
    unit_cost_usd_per_kw: f64,
    lifetime_years: f64,
    om_share: f64,
    activation_priority: u8,
    converts_from: Option<&str>,
) -> ComponentModel {
    ComponentModel {
        code: code.to_string(),
        class: ComponentClass::from_code(code).expect("builtin codes use known prefixes"),
        description: description.to_string(),
        main_carrier: main_carrier.to_string(),
        inputs_per_main_kwh: inputs
            .iter()
            .map(|(carrier, factor)| CarrierFactor {
                carrier: carrier.to_string(),
                factor: *factor,
            })
            .collect(),
        outputs_per_main_kwh: outputs
            .iter()
            .map(|(carrier, factor)| CarrierFactor {
                carrier: carrier.to_string(),
                factor: *factor,
            })
            .collect(),
        minimum_capacity_kw: capacity_range.0,
        maximum_capacity_kw: capacity_range.1,
        base_cost_usd,
        unit_cost_usd_per_kw,
        lifetime_years,
        om_share,
        activation_priority,
        converts_from: converts_from.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_covers_both_services() {
        let catalog = TechnologyCatalog::builtin();
        let heating: Vec<_> = catalog
            .active_producers_of("T60W")
            .iter()
            .map(|m| m.code.clone())
            .collect();
        assert_eq!(heating, vec!["HP2", "HP1", "BO1", "BO3", "CHP1"]);
        let cooling: Vec<_> = catalog
            .active_producers_of("T10W")
            .iter()
            .map(|m| m.code.clone())
            .collect();
        assert_eq!(cooling, vec!["VCC1", "VCC2", "ACH1"]);
    }

    #[test]
    fn passive_converters_resolve_by_output_carrier() {
        let catalog = TechnologyCatalog::builtin();
        let converters = catalog.passive_converters_to("T60W");
        assert_eq!(converters.len(), 1);
        assert_eq!(converters[0].code, "HEX1");
        assert_eq!(converters[0].converts_from.as_deref(), Some("T90W"));
    }

    #[test]
    fn toml_catalog_rejects_mismatched_passive_declaration() {
        let text = r#"
            [[component]]
            code = "BO9"
            description = "Bogus boiler"
            main_carrier = "T60W"
            minimum_capacity_kw = 1.0
            maximum_capacity_kw = 10.0
            base_cost_usd = 100.0
            unit_cost_usd_per_kw = 10.0
            lifetime_years = 20.0
            om_share = 0.02
            activation_priority = 1
            converts_from = "T90W"
        "#;
        assert!(TechnologyCatalog::from_toml_str(text).is_err());
    }

    #[test]
    fn toml_catalog_parses_a_valid_component() {
        let text = r#"
            [[component]]
            code = "HP7"
            description = "Test heat pump"
            main_carrier = "T60W"
            inputs = [{ carrier = "E230AC", factor = 0.3 }]
            minimum_capacity_kw = 1.0
            maximum_capacity_kw = 10.0
            base_cost_usd = 100.0
            unit_cost_usd_per_kw = 10.0
            lifetime_years = 20.0
            om_share = 0.02
            activation_priority = 1
        "#;
        let catalog = TechnologyCatalog::from_toml_str(text).unwrap();
        assert_eq!(catalog.get("HP7").unwrap().inputs_per_main_kwh.len(), 1);
    }
}
