pub mod demand;
pub mod layout;
pub mod potentials;
pub mod results;
pub mod zone;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV file '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("File '{path}' has {got} data rows; expected {expected} hourly values.")]
    WrongRowCount {
        path: PathBuf,
        expected: usize,
        got: usize,
    },

    #[error("File '{path}' is missing the required column '{column}'.")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Invalid value in '{path}', row {row}: {message}")]
    BadValue {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("Failed to parse '{path}' as GeoJSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
