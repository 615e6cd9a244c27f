use std::collections::BTreeMap;
use thiserror::Error;

/// Number of time steps in an annual profile.
pub const HOURS_PER_YEAR: usize = 8760;

#[derive(Debug, Error, PartialEq)]
pub enum FlowError {
    #[error(
        "The energy flow profile does not have the correct format, i.e. a numerical series of \
         {expected} time steps (got {got})."
    )]
    WrongProfileLength { expected: usize, got: usize },

    #[error("Cannot combine energy flows of carriers '{left}' and '{right}'.")]
    CarrierMismatch { left: String, right: String },

    #[error(
        "All energy flows passed to 'aggregate' need to share the same origin and destination \
         placements."
    )]
    MixedPlacements,
}

/// Placement of the supply-system element an energy flow originates from or
/// is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placement {
    Source,
    Primary,
    Secondary,
    Tertiary,
    Storage,
    Consumer,
    Environment,
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Placement::Source => "source",
            Placement::Primary => "primary",
            Placement::Secondary => "secondary",
            Placement::Tertiary => "tertiary",
            Placement::Storage => "storage",
            Placement::Consumer => "consumer",
            Placement::Environment => "environment",
        };
        write!(f, "{name}")
    }
}

/// A named, time-indexed quantity of one energy carrier moving between two
/// placements of the system.
///
/// Profiles always span one year at hourly resolution. Values are
/// non-negative powers in kW unless the flow was constructed with
/// [`EnergyFlow::signed`] (net exports).
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyFlow {
    pub origin: Placement,
    pub destination: Placement,
    pub carrier: String,
    profile: Vec<f64>,
}

impl EnergyFlow {
    pub fn new(
        origin: Placement,
        destination: Placement,
        carrier: &str,
        mut profile: Vec<f64>,
    ) -> Result<Self, FlowError> {
        if profile.len() != HOURS_PER_YEAR {
            return Err(FlowError::WrongProfileLength {
                expected: HOURS_PER_YEAR,
                got: profile.len(),
            });
        }
        for value in &mut profile {
            if *value < 0.0 {
                *value = 0.0;
            }
        }
        Ok(Self {
            origin,
            destination,
            carrier: carrier.to_string(),
            profile,
        })
    }

    /// Builds a flow that may carry negative values (e.g. net export).
    pub fn signed(
        origin: Placement,
        destination: Placement,
        carrier: &str,
        profile: Vec<f64>,
    ) -> Result<Self, FlowError> {
        if profile.len() != HOURS_PER_YEAR {
            return Err(FlowError::WrongProfileLength {
                expected: HOURS_PER_YEAR,
                got: profile.len(),
            });
        }
        Ok(Self {
            origin,
            destination,
            carrier: carrier.to_string(),
            profile,
        })
    }

    pub fn constant(origin: Placement, destination: Placement, carrier: &str, value: f64) -> Self {
        Self {
            origin,
            destination,
            carrier: carrier.to_string(),
            profile: vec![value.max(0.0); HOURS_PER_YEAR],
        }
    }

    pub fn zeros(origin: Placement, destination: Placement, carrier: &str) -> Self {
        Self::constant(origin, destination, carrier, 0.0)
    }

    pub fn profile(&self) -> &[f64] {
        &self.profile
    }

    pub fn peak(&self) -> f64 {
        self.profile.iter().copied().fold(0.0, f64::max)
    }

    /// Annual total in kWh (hourly kW summed over the year).
    pub fn total(&self) -> f64 {
        self.profile.iter().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.profile.iter().all(|v| v.abs() < 1e-12)
    }

    /// Copy of the flow with its profile capped at a scalar threshold.
    pub fn cap_at(&self, threshold: f64) -> Self {
        Self {
            origin: self.origin,
            destination: self.destination,
            carrier: self.carrier.clone(),
            profile: self.profile.iter().map(|v| v.min(threshold)).collect(),
        }
    }

    /// Copy of the flow with its profile capped elementwise at another
    /// profile.
    pub fn cap_at_profile(&self, threshold: &[f64]) -> Self {
        Self {
            origin: self.origin,
            destination: self.destination,
            carrier: self.carrier.clone(),
            profile: self
                .profile
                .iter()
                .zip(threshold)
                .map(|(v, t)| v.min(*t))
                .collect(),
        }
    }

    pub fn plus(&self, other: &EnergyFlow) -> Result<Self, FlowError> {
        if self.carrier != other.carrier {
            return Err(FlowError::CarrierMismatch {
                left: self.carrier.clone(),
                right: other.carrier.clone(),
            });
        }
        Ok(Self {
            origin: self.origin,
            destination: self.destination,
            carrier: self.carrier.clone(),
            profile: self
                .profile
                .iter()
                .zip(&other.profile)
                .map(|(a, b)| a + b)
                .collect(),
        })
    }

    /// Subtracts another flow; resulting values are clamped at zero.
    pub fn minus(&self, other: &EnergyFlow) -> Result<Self, FlowError> {
        if self.carrier != other.carrier {
            return Err(FlowError::CarrierMismatch {
                left: self.carrier.clone(),
                right: other.carrier.clone(),
            });
        }
        Ok(Self {
            origin: self.origin,
            destination: self.destination,
            carrier: self.carrier.clone(),
            profile: self
                .profile
                .iter()
                .zip(&other.profile)
                .map(|(a, b)| (a - b).max(0.0))
                .collect(),
        })
    }

    /// Scales the profile by a constant factor.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            origin: self.origin,
            destination: self.destination,
            carrier: self.carrier.clone(),
            profile: self.profile.iter().map(|v| v * factor).collect(),
        }
    }

    /// Aggregates flows between the same two placements by energy carrier.
    pub fn aggregate(flows: &[EnergyFlow]) -> Result<Vec<EnergyFlow>, FlowError> {
        let Some(first) = flows.first() else {
            return Ok(Vec::new());
        };
        if flows
            .iter()
            .any(|f| f.origin != first.origin || f.destination != first.destination)
        {
            return Err(FlowError::MixedPlacements);
        }
        let mut by_carrier: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for flow in flows {
            let entry = by_carrier
                .entry(flow.carrier.as_str())
                .or_insert_with(|| vec![0.0; HOURS_PER_YEAR]);
            for (acc, value) in entry.iter_mut().zip(&flow.profile) {
                *acc += value;
            }
        }
        Ok(by_carrier
            .into_iter()
            .map(|(carrier, profile)| EnergyFlow {
                origin: first.origin,
                destination: first.destination,
                carrier: carrier.to_string(),
                profile,
            })
            .collect())
    }
}

/// Signed annual profiles bucketed by energy carrier code.
///
/// Used for the system-level balances (energy demand, heat rejection,
/// emissions) where flows of the same carrier accumulate and surplus
/// generation is deducted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarrierLedger {
    entries: BTreeMap<String, Vec<f64>>,
}

impl CarrierLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, carrier: &str, profile: &[f64]) {
        let entry = self
            .entries
            .entry(carrier.to_string())
            .or_insert_with(|| vec![0.0; HOURS_PER_YEAR]);
        for (acc, value) in entry.iter_mut().zip(profile) {
            *acc += value;
        }
    }

    pub fn deduct(&mut self, carrier: &str, profile: &[f64]) {
        let entry = self
            .entries
            .entry(carrier.to_string())
            .or_insert_with(|| vec![0.0; HOURS_PER_YEAR]);
        for (acc, value) in entry.iter_mut().zip(profile) {
            *acc -= value;
        }
    }

    pub fn get(&self, carrier: &str) -> Option<&[f64]> {
        self.entries.get(carrier).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Annual net total of one carrier.
    pub fn annual_total(&self, carrier: &str) -> f64 {
        self.entries
            .get(carrier)
            .map(|p| p.iter().sum())
            .unwrap_or(0.0)
    }

    /// Sum over all carriers of the positive part of each time step.
    pub fn positive_grand_total(&self) -> f64 {
        self.entries
            .values()
            .flat_map(|p| p.iter())
            .filter(|v| **v > 0.0)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spiky(peak_hour: usize, peak: f64) -> Vec<f64> {
        let mut profile = vec![1.0; HOURS_PER_YEAR];
        profile[peak_hour] = peak;
        profile
    }

    #[test]
    fn wrong_length_is_rejected() {
        let result = EnergyFlow::new(Placement::Primary, Placement::Consumer, "T60W", vec![1.0; 24]);
        assert_eq!(
            result.unwrap_err(),
            FlowError::WrongProfileLength {
                expected: HOURS_PER_YEAR,
                got: 24
            }
        );
    }

    #[test]
    fn negative_values_are_clamped_unless_signed() {
        let mut profile = vec![0.0; HOURS_PER_YEAR];
        profile[0] = -5.0;
        let flow =
            EnergyFlow::new(Placement::Primary, Placement::Consumer, "T60W", profile.clone())
                .unwrap();
        assert_eq!(flow.profile()[0], 0.0);
        let signed =
            EnergyFlow::signed(Placement::Primary, Placement::Consumer, "T60W", profile).unwrap();
        assert_eq!(signed.profile()[0], -5.0);
    }

    #[test]
    fn cap_and_peak() {
        let flow =
            EnergyFlow::new(Placement::Primary, Placement::Consumer, "T60W", spiky(100, 50.0))
                .unwrap();
        assert_eq!(flow.peak(), 50.0);
        let capped = flow.cap_at(10.0);
        assert_eq!(capped.peak(), 10.0);
        let residual = flow.minus(&capped).unwrap();
        assert_eq!(residual.profile()[100], 40.0);
        assert_eq!(residual.profile()[0], 0.0);
    }

    #[test]
    fn aggregate_groups_by_carrier() {
        let a = EnergyFlow::constant(Placement::Primary, Placement::Consumer, "T60W", 2.0);
        let b = EnergyFlow::constant(Placement::Primary, Placement::Consumer, "T60W", 3.0);
        let c = EnergyFlow::constant(Placement::Primary, Placement::Consumer, "E230AC", 1.0);
        let aggregated = EnergyFlow::aggregate(&[a, b, c]).unwrap();
        assert_eq!(aggregated.len(), 2);
        let t60 = aggregated.iter().find(|f| f.carrier == "T60W").unwrap();
        assert_eq!(t60.profile()[0], 5.0);
    }

    #[test]
    fn mixed_placements_cannot_aggregate() {
        let a = EnergyFlow::constant(Placement::Primary, Placement::Consumer, "T60W", 2.0);
        let b = EnergyFlow::constant(Placement::Secondary, Placement::Primary, "T60W", 3.0);
        assert_eq!(
            EnergyFlow::aggregate(&[a, b]).unwrap_err(),
            FlowError::MixedPlacements
        );
    }

    #[test]
    fn ledger_accumulates_and_deducts() {
        let mut ledger = CarrierLedger::new();
        ledger.add("E230AC", &vec![2.0; HOURS_PER_YEAR]);
        ledger.deduct("E230AC", &vec![0.5; HOURS_PER_YEAR]);
        assert!((ledger.annual_total("E230AC") - 1.5 * HOURS_PER_YEAR as f64).abs() < 1e-6);
    }
}
