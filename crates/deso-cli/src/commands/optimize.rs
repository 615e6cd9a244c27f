use crate::cli::OptimizeArgs;
use crate::progress::CliProgressHandler;
use anyhow::{Context, Result, bail};
use deso::engine::config::RunSettings;
use deso::engine::progress::ProgressReporter;
use deso::workflows::optimize::{self, ScenarioPaths};
use tracing::{debug, info};

pub fn run(args: OptimizeArgs) -> Result<()> {
    if !args.scenario.is_dir() {
        bail!(
            "the scenario directory '{}' does not exist",
            args.scenario.display()
        );
    }

    let config_path = args.config.clone().or_else(|| {
        let default = args.scenario.join("config.toml");
        default.is_file().then_some(default)
    });
    let mut settings = match &config_path {
        Some(path) => {
            info!("Loading run configuration from {:?}.", path);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            RunSettings::from_toml_str(&text)?
        }
        None => {
            info!("No run configuration found; using the built-in defaults.");
            RunSettings::defaults()
        }
    };
    if let Some(population) = args.population {
        settings.algorithm.population = population;
    }
    if let Some(generations) = args.generations {
        settings.algorithm.generations_networks = generations;
    }
    if let Some(seed) = args.seed {
        settings.algorithm.seed = seed;
    }
    if args.debug {
        settings.debug = true;
    }

    if settings.algorithm.parallelize_computation {
        // a pool sized via --threads takes precedence; rebuilding then fails
        if let Err(error) = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.algorithm.cores)
            .build_global()
        {
            debug!("Global thread pool already initialized: {error}");
        }
    }

    let scenario = ScenarioPaths::from_root(&args.scenario);
    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting district energy system optimization...");
    info!("Invoking the core optimization workflow...");
    let report = optimize::run(&scenario, settings, &reporter)?;

    if report.systems.is_empty() {
        println!("Warning: the optimization finished without a selectable system.");
        return Ok(());
    }
    println!(
        "Optimization complete. {} near-pareto-optimal system(s) written to {}:",
        report.systems.len(),
        scenario.output_dir.display()
    );
    for system in &report.systems {
        let objectives = system
            .objectives
            .iter()
            .map(|(label, value)| format!("{label}: {value:.0}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {} — {} network(s), {} stand-alone building(s) [{objectives}]",
            system.name, system.network_count, system.stand_alone_count
        );
    }
    Ok(())
}
