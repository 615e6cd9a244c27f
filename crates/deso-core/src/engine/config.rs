use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error(
        "The chosen {kind} method ('{name}') has not been implemented. Valid choices are: \
         {valid}."
    )]
    UnknownOperator {
        kind: &'static str,
        name: String,
        valid: &'static str,
    },

    #[error("Invalid value for '{parameter}': {message}")]
    InvalidValue {
        parameter: &'static str,
        message: String,
    },

    #[error("Failed to parse run configuration: {0}")]
    Parse(String),
}

/// Objective functions of the optimization, all minimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Objective {
    Cost,
    GhgEmissions,
    SystemEnergyDemand,
    AnthropogenicHeat,
}

impl Objective {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "cost" => Ok(Objective::Cost),
            "ghg_emissions" => Ok(Objective::GhgEmissions),
            "system_energy_demand" => Ok(Objective::SystemEnergyDemand),
            "anthropogenic_heat" => Ok(Objective::AnthropogenicHeat),
            other => Err(ConfigError::UnknownOperator {
                kind: "objective",
                name: other.to_string(),
                valid: "'cost', 'ghg_emissions', 'system_energy_demand', 'anthropogenic_heat'",
            }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Objective::Cost => "cost",
            Objective::GhgEmissions => "ghg_emissions",
            Objective::SystemEnergyDemand => "system_energy_demand",
            Objective::AnthropogenicHeat => "anthropogenic_heat",
        }
    }
}

/// Mutation operators applicable to connectivity vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMutation {
    ShuffleIndexes,
    UniformInteger,
    ClusterSwitch,
}

impl ConnectivityMutation {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "ShuffleIndexes" => Ok(Self::ShuffleIndexes),
            "UniformInteger" => Ok(Self::UniformInteger),
            "ClusterSwitch" => Ok(Self::ClusterSwitch),
            other => Err(ConfigError::UnknownOperator {
                kind: "connectivity mutation",
                name: other.to_string(),
                valid: "'ShuffleIndexes', 'UniformInteger', 'ClusterSwitch'",
            }),
        }
    }

    pub fn needs_clusters(&self) -> bool {
        matches!(self, Self::ClusterSwitch)
    }
}

/// Crossover operators applicable to connectivity vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityCrossover {
    OnePoint,
    TwoPoint,
    Uniform,
    ClusterSwap,
    ClusterAlignment,
}

impl ConnectivityCrossover {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "OnePoint" => Ok(Self::OnePoint),
            "TwoPoint" => Ok(Self::TwoPoint),
            "Uniform" => Ok(Self::Uniform),
            "ClusterSwap" => Ok(Self::ClusterSwap),
            "ClusterAlignment" => Ok(Self::ClusterAlignment),
            other => Err(ConfigError::UnknownOperator {
                kind: "connectivity crossover",
                name: other.to_string(),
                valid: "'OnePoint', 'TwoPoint', 'Uniform', 'ClusterSwap', 'ClusterAlignment'",
            }),
        }
    }

    pub fn needs_clusters(&self) -> bool {
        matches!(self, Self::ClusterSwap | Self::ClusterAlignment)
    }
}

/// Mutation operators applicable to capacity indicator vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityMutation {
    UniformBounded,
    PolynomialBounded,
}

impl CapacityMutation {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "UniformBounded" => Ok(Self::UniformBounded),
            "PolynomialBounded" => Ok(Self::PolynomialBounded),
            other => Err(ConfigError::UnknownOperator {
                kind: "capacity mutation",
                name: other.to_string(),
                valid: "'UniformBounded', 'PolynomialBounded'",
            }),
        }
    }
}

/// Crossover operators applicable to capacity indicator vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityCrossover {
    OnePoint,
    TwoPoint,
    Uniform,
}

impl CapacityCrossover {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "OnePoint" => Ok(Self::OnePoint),
            "TwoPoint" => Ok(Self::TwoPoint),
            "Uniform" => Ok(Self::Uniform),
            other => Err(ConfigError::UnknownOperator {
                kind: "capacity crossover",
                name: other.to_string(),
                valid: "'OnePoint', 'TwoPoint', 'Uniform'",
            }),
        }
    }
}

/// Relative weights of the four outcomes of the 'Random' overlap policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapWeights {
    pub merge: u32,
    pub cut: u32,
    pub delete: u32,
    pub ignore: u32,
}

impl Default for OverlapWeights {
    fn default() -> Self {
        Self {
            merge: 25,
            cut: 25,
            delete: 25,
            ignore: 25,
        }
    }
}

/// Strategy for eliminating geometric overlap between candidate networks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlapCorrection {
    Disabled,
    MergeOnOverlap,
    CutOnOverlap,
    DeleteOnOverlap,
    Random(OverlapWeights),
}

impl OverlapCorrection {
    pub fn parse(name: &str, weights: OverlapWeights) -> Result<Self, ConfigError> {
        match name {
            "None" => Ok(Self::Disabled),
            "MergeOnOverlap" => Ok(Self::MergeOnOverlap),
            "CutOnOverlap" => Ok(Self::CutOnOverlap),
            "DeleteOnOverlap" => Ok(Self::DeleteOnOverlap),
            "Random" => Ok(Self::Random(weights)),
            other => Err(ConfigError::UnknownOperator {
                kind: "overlap correction",
                name: other.to_string(),
                valid: "'MergeOnOverlap', 'CutOnOverlap', 'DeleteOnOverlap', 'Random', 'None'",
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Geographic clustering method backing the cluster-aware operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringMethod {
    Density,
    LabelPropagation,
}

impl ClusteringMethod {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "Density" => Ok(Self::Density),
            "LabelPropagation" => Ok(Self::LabelPropagation),
            other => Err(ConfigError::UnknownOperator {
                kind: "clustering",
                name: other.to_string(),
                valid: "'Density', 'LabelPropagation'",
            }),
        }
    }
}

/// Thermal service a domain's networks provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemType {
    Heating,
    Cooling,
}

impl SystemType {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "heating" => Ok(Self::Heating),
            "cooling" => Ok(Self::Cooling),
            other => Err(ConfigError::UnknownOperator {
                kind: "system type",
                name: other.to_string(),
                valid: "'heating', 'cooling'",
            }),
        }
    }

    /// Standard network supply temperature in °C.
    pub fn default_network_temperature(&self) -> f64 {
        match self {
            SystemType::Heating => 60.0,
            SystemType::Cooling => 10.0,
        }
    }
}

/// Hyperparameters of the two-level genetic algorithm.
#[derive(Debug, Clone)]
pub struct GeneticAlgorithm {
    pub objectives: Vec<Objective>,
    pub population: usize,
    pub generations_networks: usize,
    pub mut_prob: f64,
    pub cx_prob: f64,
    pub mut_eta: f64,
    pub connectivity_mutation: ConnectivityMutation,
    pub connectivity_crossover: ConnectivityCrossover,
    pub capacity_mutation: CapacityMutation,
    pub capacity_crossover: CapacityCrossover,
    pub overlap_correction: OverlapCorrection,
    pub clustering: ClusteringMethod,
    pub maximum_number_of_networks: u16,
    pub parallelize_computation: bool,
    pub cores: usize,
    pub seed: u64,
}

impl GeneticAlgorithm {
    /// The inner search is deliberately shallower than the outer one since
    /// it runs once per individual per generation.
    pub fn generations_supply_systems(&self) -> usize {
        ((self.generations_networks as f64).sqrt().round() as usize).max(5)
    }

    pub fn needs_clusters(&self) -> bool {
        self.connectivity_mutation.needs_clusters() || self.connectivity_crossover.needs_clusters()
    }
}

#[derive(Default)]
pub struct GeneticAlgorithmBuilder {
    objectives: Option<Vec<Objective>>,
    population: Option<usize>,
    generations_networks: Option<usize>,
    mut_prob: Option<f64>,
    cx_prob: Option<f64>,
    mut_eta: Option<f64>,
    connectivity_mutation: Option<ConnectivityMutation>,
    connectivity_crossover: Option<ConnectivityCrossover>,
    capacity_mutation: Option<CapacityMutation>,
    capacity_crossover: Option<CapacityCrossover>,
    overlap_correction: Option<OverlapCorrection>,
    clustering: Option<ClusteringMethod>,
    maximum_number_of_networks: Option<u16>,
    parallelize_computation: Option<bool>,
    cores: Option<usize>,
    seed: Option<u64>,
}

impl GeneticAlgorithmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objectives(mut self, objectives: Vec<Objective>) -> Self {
        self.objectives = Some(objectives);
        self
    }
    pub fn population(mut self, population: usize) -> Self {
        self.population = Some(population);
        self
    }
    pub fn generations_networks(mut self, generations: usize) -> Self {
        self.generations_networks = Some(generations);
        self
    }
    pub fn mut_prob(mut self, prob: f64) -> Self {
        self.mut_prob = Some(prob);
        self
    }
    pub fn cx_prob(mut self, prob: f64) -> Self {
        self.cx_prob = Some(prob);
        self
    }
    pub fn mut_eta(mut self, eta: f64) -> Self {
        self.mut_eta = Some(eta);
        self
    }
    pub fn connectivity_mutation(mut self, operator: ConnectivityMutation) -> Self {
        self.connectivity_mutation = Some(operator);
        self
    }
    pub fn connectivity_crossover(mut self, operator: ConnectivityCrossover) -> Self {
        self.connectivity_crossover = Some(operator);
        self
    }
    pub fn capacity_mutation(mut self, operator: CapacityMutation) -> Self {
        self.capacity_mutation = Some(operator);
        self
    }
    pub fn capacity_crossover(mut self, operator: CapacityCrossover) -> Self {
        self.capacity_crossover = Some(operator);
        self
    }
    pub fn overlap_correction(mut self, correction: OverlapCorrection) -> Self {
        self.overlap_correction = Some(correction);
        self
    }
    pub fn clustering(mut self, method: ClusteringMethod) -> Self {
        self.clustering = Some(method);
        self
    }
    pub fn maximum_number_of_networks(mut self, maximum: u16) -> Self {
        self.maximum_number_of_networks = Some(maximum);
        self
    }
    pub fn parallelize_computation(mut self, parallelize: bool) -> Self {
        self.parallelize_computation = Some(parallelize);
        self
    }
    pub fn cores(mut self, cores: usize) -> Self {
        self.cores = Some(cores);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<GeneticAlgorithm, ConfigError> {
        let population = self
            .population
            .ok_or(ConfigError::MissingParameter("population"))?;
        if population < 2 {
            return Err(ConfigError::InvalidValue {
                parameter: "population",
                message: "the population must hold at least two individuals".to_string(),
            });
        }
        let objectives = self
            .objectives
            .ok_or(ConfigError::MissingParameter("objectives"))?;
        if objectives.is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "objectives",
                message: "at least one objective function is required".to_string(),
            });
        }
        Ok(GeneticAlgorithm {
            objectives,
            population,
            generations_networks: self
                .generations_networks
                .ok_or(ConfigError::MissingParameter("generations_networks"))?,
            mut_prob: self.mut_prob.unwrap_or(0.2),
            cx_prob: self.cx_prob.unwrap_or(0.5),
            mut_eta: self.mut_eta.unwrap_or(20.0),
            connectivity_mutation: self
                .connectivity_mutation
                .unwrap_or(ConnectivityMutation::UniformInteger),
            connectivity_crossover: self
                .connectivity_crossover
                .unwrap_or(ConnectivityCrossover::Uniform),
            capacity_mutation: self
                .capacity_mutation
                .unwrap_or(CapacityMutation::PolynomialBounded),
            capacity_crossover: self.capacity_crossover.unwrap_or(CapacityCrossover::Uniform),
            overlap_correction: self.overlap_correction.unwrap_or(OverlapCorrection::Disabled),
            clustering: self.clustering.unwrap_or(ClusteringMethod::Density),
            maximum_number_of_networks: self.maximum_number_of_networks.unwrap_or(2),
            parallelize_computation: self.parallelize_computation.unwrap_or(false),
            cores: self.cores.unwrap_or(1),
            seed: self.seed.unwrap_or(0),
        })
    }
}

/// The complete run configuration of one optimization.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub algorithm: GeneticAlgorithm,
    pub system_type: SystemType,
    pub network_temperature_celsius: f64,
    pub interest_rate: f64,
    pub debug: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRunConfig {
    #[serde(default = "defaults::objectives")]
    objectives: Vec<String>,
    #[serde(default = "defaults::population")]
    population: usize,
    #[serde(default = "defaults::generations")]
    generations_networks: usize,
    #[serde(default = "defaults::mut_prob")]
    mutation_probability: f64,
    #[serde(default = "defaults::cx_prob")]
    crossover_probability: f64,
    #[serde(default = "defaults::mut_eta")]
    mutation_eta: f64,
    #[serde(default = "defaults::connectivity_mutation")]
    networks_mutation_method: String,
    #[serde(default = "defaults::connectivity_crossover")]
    networks_crossover_method: String,
    #[serde(default = "defaults::capacity_mutation")]
    systems_mutation_method: String,
    #[serde(default = "defaults::capacity_crossover")]
    systems_crossover_method: String,
    #[serde(default = "defaults::overlap")]
    networks_overlap_correction_method: String,
    #[serde(default)]
    overlap_correction_weights: Option<[u32; 4]>,
    #[serde(default = "defaults::clustering")]
    building_clustering_method: String,
    #[serde(default = "defaults::max_networks")]
    maximum_number_of_networks: u16,
    #[serde(default)]
    multiprocessing: bool,
    #[serde(default = "defaults::cores")]
    number_of_cpus: usize,
    #[serde(default)]
    seed: u64,
    #[serde(default = "defaults::system_type")]
    system_type: String,
    #[serde(default)]
    network_temperature_celsius: Option<f64>,
    #[serde(default = "defaults::interest_rate")]
    interest_rate: f64,
    #[serde(default)]
    debug: bool,
}

mod defaults {
    pub fn objectives() -> Vec<String> {
        vec!["cost".to_string(), "ghg_emissions".to_string()]
    }
    pub fn population() -> usize {
        8
    }
    pub fn generations() -> usize {
        20
    }
    pub fn mut_prob() -> f64 {
        0.2
    }
    pub fn cx_prob() -> f64 {
        0.5
    }
    pub fn mut_eta() -> f64 {
        20.0
    }
    pub fn connectivity_mutation() -> String {
        "ClusterSwitch".to_string()
    }
    pub fn connectivity_crossover() -> String {
        "ClusterAlignment".to_string()
    }
    pub fn capacity_mutation() -> String {
        "PolynomialBounded".to_string()
    }
    pub fn capacity_crossover() -> String {
        "Uniform".to_string()
    }
    pub fn overlap() -> String {
        "None".to_string()
    }
    pub fn clustering() -> String {
        "Density".to_string()
    }
    pub fn max_networks() -> u16 {
        2
    }
    pub fn cores() -> usize {
        1
    }
    pub fn system_type() -> String {
        "heating".to_string()
    }
    pub fn interest_rate() -> f64 {
        0.05
    }
}

impl RunSettings {
    /// Parses a run configuration from its TOML representation, resolving
    /// every operator name to its typed variant up front.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawRunConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// The built-in default configuration.
    pub fn defaults() -> Self {
        Self::from_toml_str("").expect("the default configuration is valid")
    }

    fn from_raw(raw: RawRunConfig) -> Result<Self, ConfigError> {
        let objectives = raw
            .objectives
            .iter()
            .map(|name| Objective::parse(name))
            .collect::<Result<Vec<_>, _>>()?;
        let weights = match raw.overlap_correction_weights {
            Some([merge, cut, delete, ignore]) => OverlapWeights {
                merge,
                cut,
                delete,
                ignore,
            },
            None => OverlapWeights::default(),
        };
        let system_type = SystemType::parse(&raw.system_type)?;
        let algorithm = GeneticAlgorithmBuilder::new()
            .objectives(objectives)
            .population(raw.population)
            .generations_networks(raw.generations_networks)
            .mut_prob(raw.mutation_probability)
            .cx_prob(raw.crossover_probability)
            .mut_eta(raw.mutation_eta)
            .connectivity_mutation(ConnectivityMutation::parse(&raw.networks_mutation_method)?)
            .connectivity_crossover(ConnectivityCrossover::parse(
                &raw.networks_crossover_method,
            )?)
            .capacity_mutation(CapacityMutation::parse(&raw.systems_mutation_method)?)
            .capacity_crossover(CapacityCrossover::parse(&raw.systems_crossover_method)?)
            .overlap_correction(OverlapCorrection::parse(
                &raw.networks_overlap_correction_method,
                weights,
            )?)
            .clustering(ClusteringMethod::parse(&raw.building_clustering_method)?)
            .maximum_number_of_networks(raw.maximum_number_of_networks)
            .parallelize_computation(raw.multiprocessing)
            .cores(raw.number_of_cpus)
            .seed(raw.seed)
            .build()?;
        Ok(Self {
            algorithm,
            system_type,
            network_temperature_celsius: raw
                .network_temperature_celsius
                .unwrap_or_else(|| system_type.default_network_temperature()),
            interest_rate: raw.interest_rate,
            debug: raw.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_generation_count_follows_the_square_root_rule() {
        let algorithm = GeneticAlgorithmBuilder::new()
            .objectives(vec![Objective::Cost])
            .population(8)
            .generations_networks(100)
            .build()
            .unwrap();
        assert_eq!(algorithm.generations_supply_systems(), 10);
        let shallow = GeneticAlgorithmBuilder::new()
            .objectives(vec![Objective::Cost])
            .population(8)
            .generations_networks(4)
            .build()
            .unwrap();
        assert_eq!(shallow.generations_supply_systems(), 5);
    }

    #[test]
    fn missing_parameters_fail_the_builder() {
        let result = GeneticAlgorithmBuilder::new()
            .objectives(vec![Objective::Cost])
            .population(8)
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingParameter("generations_networks")
        );
    }

    #[test]
    fn unknown_operator_names_fail_fast() {
        assert!(matches!(
            ConnectivityMutation::parse("FancyNewOperator"),
            Err(ConfigError::UnknownOperator { .. })
        ));
        assert!(matches!(
            OverlapCorrection::parse("SometimesMaybe", OverlapWeights::default()),
            Err(ConfigError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn toml_round_trip_with_defaults() {
        let settings = RunSettings::from_toml_str(
            r#"
            objectives = ["cost", "system_energy_demand"]
            population = 6
            generations_networks = 12
            networks_overlap_correction_method = "Random"
            overlap_correction_weights = [40, 30, 20, 10]
            system_type = "cooling"
            "#,
        )
        .unwrap();
        assert_eq!(settings.algorithm.population, 6);
        assert_eq!(settings.network_temperature_celsius, 10.0);
        assert_eq!(
            settings.algorithm.overlap_correction,
            OverlapCorrection::Random(OverlapWeights {
                merge: 40,
                cut: 30,
                delete: 20,
                ignore: 10
            })
        );
    }
}
