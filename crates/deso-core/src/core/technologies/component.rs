use crate::core::models::carriers::CatalogError;
use crate::core::models::flows::{EnergyFlow, Placement};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error(
        "No '{code}' unit can be installed at {requested:.1} kW; the catalog bounds its capacity \
         to [{min:.1}, {max:.1}] kW."
    )]
    CapacityOutOfRange {
        code: String,
        requested: f64,
        min: f64,
        max: f64,
    },

    #[error(
        "Component '{code}' (main carrier '{expected}') cannot operate on a '{got}' flow without \
         a passive converter."
    )]
    CarrierMismatch {
        code: String,
        expected: String,
        got: String,
    },

    #[error(
        "Component '{code}' was asked to deliver {requested:.1} kW but is sized for \
         {capacity:.1} kW."
    )]
    CapacityExceeded {
        code: String,
        requested: f64,
        capacity: f64,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Technology family of a supply-system component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentClass {
    Boiler,
    HeatPump,
    VaporCompressionChiller,
    AbsorptionChiller,
    CogenerationPlant,
    CoolingTower,
    HeatExchanger,
}

/// Component-code prefixes as used throughout the catalog and result files.
static CLASS_BY_PREFIX: phf::Map<&'static str, ComponentClass> = phf::phf_map! {
    "BO" => ComponentClass::Boiler,
    "HP" => ComponentClass::HeatPump,
    "VCC" => ComponentClass::VaporCompressionChiller,
    "ACH" => ComponentClass::AbsorptionChiller,
    "CHP" => ComponentClass::CogenerationPlant,
    "CT" => ComponentClass::CoolingTower,
    "HEX" => ComponentClass::HeatExchanger,
};

impl ComponentClass {
    /// Resolves a component code ("VCC2") to its class via the longest
    /// matching prefix.
    pub fn from_code(code: &str) -> Option<ComponentClass> {
        let mut best: Option<(usize, ComponentClass)> = None;
        for (prefix, class) in CLASS_BY_PREFIX.entries() {
            if code.starts_with(prefix) {
                match best {
                    Some((len, _)) if len >= prefix.len() => {}
                    _ => best = Some((prefix.len(), *class)),
                }
            }
        }
        best.map(|(_, class)| class)
    }

    pub fn is_passive(&self) -> bool {
        matches!(self, ComponentClass::HeatExchanger)
    }
}

/// Annualizes a total investment over a component lifetime.
///
/// `capex_a = capex_total * IR * (1+IR)^LT / ((1+IR)^LT - 1)`, applied
/// uniformly to every technology and to network piping.
pub fn annualized_investment(capex_total: f64, interest_rate: f64, lifetime_years: f64) -> f64 {
    if capex_total == 0.0 {
        return 0.0;
    }
    let growth = (1.0 + interest_rate).powf(lifetime_years);
    capex_total * interest_rate * growth / (growth - 1.0)
}

/// An energy carrier consumed or produced per kWh of a component's main
/// output.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct CarrierFactor {
    pub carrier: String,
    pub factor: f64,
}

/// One catalog entry: a technology model with its conversion factors, the
/// range of capacities it is manufactured in, and its cost parameters.
#[derive(Debug, Clone)]
pub struct ComponentModel {
    pub code: String,
    pub class: ComponentClass,
    pub description: String,
    /// Carrier of the main (sized) flow: the carrier produced for active
    /// components, the carrier absorbed for heat-rejection components.
    pub main_carrier: String,
    pub inputs_per_main_kwh: Vec<CarrierFactor>,
    pub outputs_per_main_kwh: Vec<CarrierFactor>,
    pub minimum_capacity_kw: f64,
    pub maximum_capacity_kw: f64,
    pub base_cost_usd: f64,
    pub unit_cost_usd_per_kw: f64,
    pub lifetime_years: f64,
    pub om_share: f64,
    /// Position in the water-filling activation cascade; lower first.
    pub activation_priority: u8,
    /// Passive converters (heat exchangers) adapt one carrier to another
    /// instead of converting between energy forms.
    pub converts_from: Option<String>,
}

impl ComponentModel {
    pub fn is_passive(&self) -> bool {
        self.converts_from.is_some()
    }
}

/// A sized instance of a [`ComponentModel`], installed in one placement of a
/// supply system.
#[derive(Debug, Clone)]
pub struct Component {
    pub code: String,
    pub class: ComponentClass,
    pub placement: Placement,
    pub capacity_kw: f64,
    pub capex_total_usd: f64,
    pub capex_annual_usd: f64,
    pub om_annual_usd: f64,
    main_carrier: String,
    inputs_per_main_kwh: Vec<CarrierFactor>,
    outputs_per_main_kwh: Vec<CarrierFactor>,
}

impl Component {
    pub fn from_model(
        model: &ComponentModel,
        placement: Placement,
        capacity_kw: f64,
        interest_rate: f64,
    ) -> Result<Self, ComponentError> {
        if capacity_kw < model.minimum_capacity_kw || capacity_kw > model.maximum_capacity_kw {
            return Err(ComponentError::CapacityOutOfRange {
                code: model.code.clone(),
                requested: capacity_kw,
                min: model.minimum_capacity_kw,
                max: model.maximum_capacity_kw,
            });
        }
        let capex_total = model.base_cost_usd + model.unit_cost_usd_per_kw * capacity_kw;
        Ok(Self {
            code: model.code.clone(),
            class: model.class,
            placement,
            capacity_kw,
            capex_total_usd: capex_total,
            capex_annual_usd: annualized_investment(
                capex_total,
                interest_rate,
                model.lifetime_years,
            ),
            om_annual_usd: capex_total * model.om_share,
            main_carrier: model.main_carrier.clone(),
            inputs_per_main_kwh: model.inputs_per_main_kwh.clone(),
            outputs_per_main_kwh: model.outputs_per_main_kwh.clone(),
        })
    }

    pub fn main_carrier(&self) -> &str {
        &self.main_carrier
    }

    /// Operates the component on its main flow, returning the energy flows
    /// drawn in and given off, bucketed by carrier.
    ///
    /// Pure: the same flow always yields the same input/output profiles.
    pub fn operate(
        &self,
        main_flow: &EnergyFlow,
    ) -> Result<(BTreeMap<String, EnergyFlow>, BTreeMap<String, EnergyFlow>), ComponentError> {
        if main_flow.carrier != self.main_carrier {
            return Err(ComponentError::CarrierMismatch {
                code: self.code.clone(),
                expected: self.main_carrier.clone(),
                got: main_flow.carrier.clone(),
            });
        }
        let peak = main_flow.peak();
        if peak > self.capacity_kw * (1.0 + 1e-9) {
            return Err(ComponentError::CapacityExceeded {
                code: self.code.clone(),
                requested: peak,
                capacity: self.capacity_kw,
            });
        }
        let mut inputs = BTreeMap::new();
        for CarrierFactor { carrier, factor } in &self.inputs_per_main_kwh {
            let mut flow = main_flow.scaled(*factor);
            flow.origin = Placement::Source;
            flow.destination = self.placement;
            flow.carrier = carrier.clone();
            merge_flow(&mut inputs, flow);
        }
        let mut outputs = BTreeMap::new();
        for CarrierFactor { carrier, factor } in &self.outputs_per_main_kwh {
            let mut flow = main_flow.scaled(*factor);
            flow.origin = self.placement;
            flow.destination = Placement::Environment;
            flow.carrier = carrier.clone();
            merge_flow(&mut outputs, flow);
        }
        Ok((inputs, outputs))
    }
}

fn merge_flow(bucket: &mut BTreeMap<String, EnergyFlow>, flow: EnergyFlow) {
    match bucket.remove(&flow.carrier) {
        Some(existing) => {
            let merged = existing
                .plus(&flow)
                .expect("flows bucketed by carrier share the carrier");
            bucket.insert(flow.carrier.clone(), merged);
        }
        None => {
            bucket.insert(flow.carrier.clone(), flow);
        }
    }
}

/// A sized passive converter adapting a flow of one carrier into the carrier
/// an active component can operate on.
#[derive(Debug, Clone)]
pub struct PassiveComponent {
    pub code: String,
    pub placement: Placement,
    pub capacity_kw: f64,
    pub capex_annual_usd: f64,
    pub om_annual_usd: f64,
    from_carrier: String,
    to_carrier: String,
    factor: f64,
}

impl PassiveComponent {
    pub fn from_model(
        model: &ComponentModel,
        placement: Placement,
        capacity_kw: f64,
        interest_rate: f64,
    ) -> Result<Self, ComponentError> {
        let Some(from_carrier) = model.converts_from.clone() else {
            return Err(ComponentError::CarrierMismatch {
                code: model.code.clone(),
                expected: "a passive converter".to_string(),
                got: "an active component model".to_string(),
            });
        };
        if capacity_kw < model.minimum_capacity_kw || capacity_kw > model.maximum_capacity_kw {
            return Err(ComponentError::CapacityOutOfRange {
                code: model.code.clone(),
                requested: capacity_kw,
                min: model.minimum_capacity_kw,
                max: model.maximum_capacity_kw,
            });
        }
        let factor = model
            .inputs_per_main_kwh
            .iter()
            .find(|f| f.carrier == from_carrier)
            .map(|f| f.factor)
            .unwrap_or(1.0);
        let capex_total = model.base_cost_usd + model.unit_cost_usd_per_kw * capacity_kw;
        Ok(Self {
            code: model.code.clone(),
            placement,
            capacity_kw,
            capex_annual_usd: annualized_investment(
                capex_total,
                interest_rate,
                model.lifetime_years,
            ),
            om_annual_usd: capex_total * model.om_share,
            from_carrier,
            to_carrier: model.main_carrier.clone(),
            factor,
        })
    }

    pub fn from_carrier(&self) -> &str {
        &self.from_carrier
    }

    /// Maps a demand flow of the converter's output carrier onto the flow of
    /// the source carrier that needs to be supplied upstream.
    pub fn convert(&self, demand: &EnergyFlow) -> EnergyFlow {
        let mut converted = demand.scaled(self.factor);
        converted.carrier = self.from_carrier.clone();
        converted
    }

    pub fn to_carrier(&self) -> &str {
        &self.to_carrier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::technologies::catalog::TechnologyCatalog;

    #[test]
    fn prefix_resolution_prefers_longest_match() {
        assert_eq!(ComponentClass::from_code("CT2"), Some(ComponentClass::CoolingTower));
        assert_eq!(
            ComponentClass::from_code("CHP1"),
            Some(ComponentClass::CogenerationPlant)
        );
        assert_eq!(
            ComponentClass::from_code("VCC1"),
            Some(ComponentClass::VaporCompressionChiller)
        );
        assert_eq!(ComponentClass::from_code("ZZ9"), None);
    }

    #[test]
    fn annualization_matches_reference_value() {
        // 1000 USD over 20 years at 5%: 1000 * 0.05*1.05^20/(1.05^20-1) = 80.24
        let annual = annualized_investment(1000.0, 0.05, 20.0);
        assert!((annual - 80.2426).abs() < 1e-3);
        assert_eq!(annualized_investment(0.0, 0.05, 20.0), 0.0);
    }

    #[test]
    fn sizing_outside_catalog_range_fails() {
        let catalog = TechnologyCatalog::builtin();
        let model = catalog.get("BO1").unwrap();
        let result = Component::from_model(model, Placement::Primary, 1e9, 0.05);
        assert!(matches!(
            result,
            Err(ComponentError::CapacityOutOfRange { .. })
        ));
    }

    #[test]
    fn operation_is_pure_and_factor_scaled() {
        let catalog = TechnologyCatalog::builtin();
        let model = catalog.get("VCC1").unwrap();
        let component = Component::from_model(model, Placement::Primary, 100.0, 0.05).unwrap();
        let demand = EnergyFlow::constant(Placement::Primary, Placement::Consumer, "T10W", 80.0);
        let (inputs_a, outputs_a) = component.operate(&demand).unwrap();
        let (inputs_b, outputs_b) = component.operate(&demand).unwrap();
        assert_eq!(inputs_a, inputs_b);
        assert_eq!(outputs_a, outputs_b);
        let electricity = &inputs_a["E230AC"];
        assert!((electricity.profile()[0] - 80.0 / 5.5).abs() < 1e-9);
        let rejected = &outputs_a["T30W"];
        assert!((rejected.profile()[0] - 80.0 * (1.0 + 1.0 / 5.5)).abs() < 1e-9);
    }

    #[test]
    fn operating_beyond_capacity_fails() {
        let catalog = TechnologyCatalog::builtin();
        let model = catalog.get("VCC1").unwrap();
        let component = Component::from_model(model, Placement::Primary, 50.0, 0.05).unwrap();
        let demand = EnergyFlow::constant(Placement::Primary, Placement::Consumer, "T10W", 80.0);
        assert!(matches!(
            component.operate(&demand),
            Err(ComponentError::CapacityExceeded { .. })
        ));
    }
}
