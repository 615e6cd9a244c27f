use super::IoError;
use nalgebra::Point2;
use serde_json::json;
use std::path::Path;

/// One row of a subsystem result file.
///
/// A subsystem file mixes component rows (installed capacity and cost) with
/// carrier rows (annual energy drawn in or given off), discriminated by the
/// `kind` column.
#[derive(Debug, Clone)]
pub enum SubsystemRow {
    Component {
        placement: String,
        code: String,
        capacity_kw: f64,
        capex_annual_usd: f64,
        om_annual_usd: f64,
    },
    CarrierInput {
        carrier: String,
        annual_kwh: f64,
    },
    CarrierOutput {
        carrier: String,
        annual_kwh: f64,
    },
}

/// Writes one subsystem's installed components and carrier exchanges.
pub fn write_subsystem_csv(path: &Path, rows: &[SubsystemRow]) -> Result<(), IoError> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let map_err = |source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    };
    writer
        .write_record([
            "Kind",
            "Placement",
            "Code",
            "Carrier",
            "Capacity_kW",
            "Annual_kWh",
            "Capex_a_USD",
            "Opex_fix_USD",
        ])
        .map_err(map_err)?;
    for row in rows {
        match row {
            SubsystemRow::Component {
                placement,
                code,
                capacity_kw,
                capex_annual_usd,
                om_annual_usd,
            } => writer
                .write_record([
                    "component",
                    placement,
                    code,
                    "",
                    &format!("{capacity_kw:.2}"),
                    "",
                    &format!("{capex_annual_usd:.2}"),
                    &format!("{om_annual_usd:.2}"),
                ])
                .map_err(map_err)?,
            SubsystemRow::CarrierInput {
                carrier,
                annual_kwh,
            } => writer
                .write_record([
                    "carrier_input",
                    "",
                    "",
                    carrier,
                    "",
                    &format!("{annual_kwh:.2}"),
                    "",
                    "",
                ])
                .map_err(map_err)?,
            SubsystemRow::CarrierOutput {
                carrier,
                annual_kwh,
            } => writer
                .write_record([
                    "carrier_output",
                    "",
                    "",
                    carrier,
                    "",
                    &format!("{annual_kwh:.2}"),
                    "",
                    "",
                ])
                .map_err(map_err)?,
        }
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// One line of the run summary: a subsystem's objective contributions.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub system: String,
    pub subsystem: String,
    pub heat_rejection_kwh: f64,
    pub system_energy_demand_kwh: f64,
    pub ghg_emissions_kg: f64,
    pub annual_cost_usd: f64,
}

/// Writes the summary CSV, appending a per-system total row.
pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<(), IoError> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let map_err = |source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    };
    writer
        .write_record([
            "System",
            "Subsystem",
            "Heat_rejection_kWh",
            "System_energy_demand_kWh",
            "GHG_emissions_kgCO2",
            "Annual_cost_USD",
        ])
        .map_err(map_err)?;
    let mut systems: Vec<&str> = rows.iter().map(|r| r.system.as_str()).collect();
    systems.dedup();
    for system in systems {
        let system_rows: Vec<_> = rows.iter().filter(|r| r.system == system).collect();
        for row in &system_rows {
            writer
                .write_record([
                    row.system.as_str(),
                    row.subsystem.as_str(),
                    &format!("{:.2}", row.heat_rejection_kwh),
                    &format!("{:.2}", row.system_energy_demand_kwh),
                    &format!("{:.2}", row.ghg_emissions_kg),
                    &format!("{:.2}", row.annual_cost_usd),
                ])
                .map_err(map_err)?;
        }
        writer
            .write_record([
                system,
                "TOTAL",
                &format!(
                    "{:.2}",
                    system_rows.iter().map(|r| r.heat_rejection_kwh).sum::<f64>()
                ),
                &format!(
                    "{:.2}",
                    system_rows
                        .iter()
                        .map(|r| r.system_energy_demand_kwh)
                        .sum::<f64>()
                ),
                &format!(
                    "{:.2}",
                    system_rows.iter().map(|r| r.ghg_emissions_kg).sum::<f64>()
                ),
                &format!(
                    "{:.2}",
                    system_rows.iter().map(|r| r.annual_cost_usd).sum::<f64>()
                ),
            ])
            .map_err(map_err)?;
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// A node of a result network layout.
#[derive(Debug, Clone)]
pub struct GeoNode {
    pub position: Point2<f64>,
    pub building: Option<String>,
}

/// An edge of a result network layout.
#[derive(Debug, Clone)]
pub struct GeoEdge {
    pub from: Point2<f64>,
    pub to: Point2<f64>,
    pub length_m: f64,
}

/// Writes one network's final layout as a GeoJSON FeatureCollection.
pub fn write_network_geojson(
    path: &Path,
    network_id: &str,
    nodes: &[GeoNode],
    edges: &[GeoEdge],
) -> Result<(), IoError> {
    let mut features = Vec::with_capacity(nodes.len() + edges.len());
    for node in nodes {
        features.push(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [node.position.x, node.position.y]},
            "properties": {
                "building": node.building.clone().unwrap_or_else(|| "NONE".to_string()),
                "type": if node.building.is_some() { "CONSUMER" } else { "NONE" },
            }
        }));
    }
    for edge in edges {
        features.push(json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": [[edge.from.x, edge.from.y], [edge.to.x, edge.to.y]],
            },
            "properties": {"length_m": edge.length_m, "network": network_id}
        }));
    }
    let collection = json!({
        "type": "FeatureCollection",
        "name": network_id,
        "features": features,
    });
    let text = serde_json::to_string_pretty(&collection).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_appends_totals_per_system() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let rows = vec![
            SummaryRow {
                system: "DES_1".to_string(),
                subsystem: "N1001".to_string(),
                heat_rejection_kwh: 10.0,
                system_energy_demand_kwh: 100.0,
                ghg_emissions_kg: 5.0,
                annual_cost_usd: 1000.0,
            },
            SummaryRow {
                system: "DES_1".to_string(),
                subsystem: "B1003".to_string(),
                heat_rejection_kwh: 2.0,
                system_energy_demand_kwh: 20.0,
                ghg_emissions_kg: 1.0,
                annual_cost_usd: 200.0,
            },
        ];
        write_summary_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("DES_1,TOTAL,12.00,120.00,6.00,1200.00"));
    }

    #[test]
    fn geojson_layout_is_a_feature_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N1001.geojson");
        write_network_geojson(
            &path,
            "N1001",
            &[GeoNode {
                position: Point2::new(1.0, 2.0),
                building: Some("B1001".to_string()),
            }],
            &[GeoEdge {
                from: Point2::new(1.0, 2.0),
                to: Point2::new(3.0, 2.0),
                length_m: 2.0,
            }],
        )
        .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"].as_array().unwrap().len(), 2);
    }
}
