use crate::cli::CatalogArgs;
use anyhow::{Context, Result};
use deso::core::models::carriers::EnergyCarrierRegistry;
use deso::core::technologies::catalog::TechnologyCatalog;
use tracing::info;

pub fn run(args: CatalogArgs) -> Result<()> {
    let catalog = match &args.components {
        Some(path) => {
            info!("Validating technology catalog {:?}.", path);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            TechnologyCatalog::from_toml_str(&text)?
        }
        None => TechnologyCatalog::builtin(),
    };
    let registry = match &args.carriers {
        Some(path) => {
            info!("Validating energy-carrier catalog {:?}.", path);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            EnergyCarrierRegistry::from_toml_str(&text)?
        }
        None => EnergyCarrierRegistry::builtin(),
    };

    println!("Energy carriers ({}):", registry.iter().count());
    for carrier in registry.iter() {
        println!(
            "  {:<8} {:<40} {:>6.0} {}",
            carrier.code,
            carrier.description,
            carrier.mean_quality,
            carrier.kind.quality_unit()
        );
    }
    println!();
    println!("Components ({}):", catalog.iter().count());
    for model in catalog.iter() {
        println!(
            "  {:<6} {:<45} {:>7.0}-{:<7.0} kW -> {}",
            model.code,
            model.description,
            model.minimum_capacity_kw,
            model.maximum_capacity_kw,
            model.main_carrier
        );
    }
    println!("\n✓ Catalogs are valid.");
    Ok(())
}
