use super::IoError;
use crate::core::models::flows::HOURS_PER_YEAR;
use std::path::Path;

/// Reads one hourly resource-availability profile from a potential file.
///
/// Building-scale potentials come as one file per building per technology,
/// domain-scale ones as a single file each; both share the single-column
/// layout read here.
pub fn read_potential_profile(path: &Path, column: &str) -> Result<Vec<f64>, IoError> {
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
    let index = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| IoError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })?;

    let mut profile = Vec::with_capacity(HOURS_PER_YEAR);
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|source| IoError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = record.get(index).unwrap_or("");
        let value: f64 = raw.parse().map_err(|_| IoError::BadValue {
            path: path.to_path_buf(),
            row: row + 2,
            message: format!("'{raw}' is not a number"),
        })?;
        profile.push(value.max(0.0));
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_and_clamps_a_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PV_B1001.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "E_kWh").unwrap();
        for hour in 0..HOURS_PER_YEAR {
            writeln!(file, "{}", if hour == 0 { -1.0 } else { 2.5 }).unwrap();
        }
        let profile = read_potential_profile(&path, "E_kWh").unwrap();
        assert_eq!(profile[0], 0.0);
        assert_eq!(profile[1], 2.5);
    }
}
