use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Mathias Brenner",
    version,
    about = "DESO CLI - A command-line interface for DESO, a district-energy-system design \
             optimizer searching for near-pareto-optimal thermal-network layouts and supply \
             system configurations.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel candidate evaluation.
    /// Defaults to the core count of the run configuration.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Optimize the district energy system of a scenario directory.
    Optimize(OptimizeArgs),
    /// Print and validate the component and energy-carrier catalogs.
    Catalog(CatalogArgs),
}

/// Arguments for the `optimize` subcommand.
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Path to the scenario directory (zone.geojson, demand/, and the
    /// optional supply.csv, network_layout.geojson and potentials/).
    #[arg(short, long, required = true, value_name = "DIR")]
    pub scenario: PathBuf,

    /// Path to the run configuration in TOML format.
    /// Defaults to <scenario>/config.toml when that file exists.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the population size of the outer genetic algorithm.
    #[arg(long, value_name = "INT")]
    pub population: Option<usize>,

    /// Override the number of network-connectivity generations.
    #[arg(long, value_name = "INT")]
    pub generations: Option<usize>,

    /// Override the random seed of the run.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Write the generation-by-generation tracker CSVs next to the results.
    #[arg(long)]
    pub debug: bool,
}

/// Arguments for the `catalog` subcommand.
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Validate and print a technology catalog TOML instead of the built-in
    /// one.
    #[arg(long, value_name = "PATH")]
    pub components: Option<PathBuf>,

    /// Validate and print an energy-carrier catalog TOML instead of the
    /// built-in one.
    #[arg(long, value_name = "PATH")]
    pub carriers: Option<PathBuf>,
}
