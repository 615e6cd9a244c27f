use super::IoError;
use crate::core::models::buildings::InitialConnectivity;
use crate::core::models::flows::HOURS_PER_YEAR;
use std::collections::BTreeMap;
use std::path::Path;

/// Energy service whose demand profile drives the optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyService {
    SpaceHeating,
    SpaceCooling,
    DomesticHotWater,
    Electricity,
}

impl EnergyService {
    /// Column the service's hourly demand is stored under in the per-building
    /// demand files.
    pub fn column(&self) -> &'static str {
        match self {
            EnergyService::SpaceHeating => "QH_kWh",
            EnergyService::SpaceCooling => "QC_kWh",
            EnergyService::DomesticHotWater => "Qww_kWh",
            EnergyService::Electricity => "E_kWh",
        }
    }
}

/// Reads one building's hourly demand profile for the given service.
///
/// Demand files carry one row per hour of the year and one column per energy
/// service; missing columns and short files are configuration errors.
pub fn read_building_demand(path: &Path, service: EnergyService) -> Result<Vec<f64>, IoError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let headers = reader
        .headers()
        .map_err(|source| IoError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let column = headers
        .iter()
        .position(|h| h == service.column())
        .ok_or_else(|| IoError::MissingColumn {
            path: path.to_path_buf(),
            column: service.column().to_string(),
        })?;

    let mut profile = Vec::with_capacity(HOURS_PER_YEAR);
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|source| IoError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = record.get(column).unwrap_or("");
        let value: f64 = raw.parse().map_err(|_| IoError::BadValue {
            path: path.to_path_buf(),
            row: row + 2,
            message: format!("'{raw}' is not a number"),
        })?;
        profile.push(value);
    }
    if profile.len() != HOURS_PER_YEAR {
        return Err(IoError::WrongRowCount {
            path: path.to_path_buf(),
            expected: HOURS_PER_YEAR,
            got: profile.len(),
        });
    }
    Ok(profile)
}

/// Reads the supply table mapping each building to its as-built connectivity
/// designation (`STANDALONE`, `NETWORK`, or a network identifier).
pub fn read_supply_designations(
    path: &Path,
) -> Result<BTreeMap<String, InitialConnectivity>, IoError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let headers = reader
        .headers()
        .map_err(|source| IoError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let name_col = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("name"))
        .ok_or_else(|| IoError::MissingColumn {
            path: path.to_path_buf(),
            column: "Name".to_string(),
        })?;
    let supply_col = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("supply"))
        .ok_or_else(|| IoError::MissingColumn {
            path: path.to_path_buf(),
            column: "Supply".to_string(),
        })?;

    let mut designations = BTreeMap::new();
    for record in reader.records() {
        let record = record.map_err(|source| IoError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let name = record.get(name_col).unwrap_or("").to_string();
        let supply = record.get(supply_col).unwrap_or("");
        designations.insert(name, InitialConnectivity::parse(supply));
    }
    Ok(designations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_the_requested_service_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("B1001.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "QH_kWh,QC_kWh").unwrap();
        for hour in 0..HOURS_PER_YEAR {
            writeln!(file, "{},{}", hour % 10, 1).unwrap();
        }
        let profile = read_building_demand(&path, EnergyService::SpaceHeating).unwrap();
        assert_eq!(profile.len(), HOURS_PER_YEAR);
        assert_eq!(profile[3], 3.0);
        assert!(matches!(
            read_building_demand(&path, EnergyService::Electricity),
            Err(IoError::MissingColumn { .. })
        ));
    }

    #[test]
    fn short_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("B1001.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "QH_kWh").unwrap();
        writeln!(file, "1.0").unwrap();
        assert!(matches!(
            read_building_demand(&path, EnergyService::SpaceHeating),
            Err(IoError::WrongRowCount { .. })
        ));
    }

    #[test]
    fn supply_table_parses_designations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supply.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Name,Supply").unwrap();
        writeln!(file, "B1001,STANDALONE").unwrap();
        writeln!(file, "B1002,N1001").unwrap();
        let table = read_supply_designations(&path).unwrap();
        assert_eq!(table["B1001"], InitialConnectivity::StandAlone);
        assert_eq!(
            table["B1002"],
            InitialConnectivity::Named("N1001".to_string())
        );
    }
}
