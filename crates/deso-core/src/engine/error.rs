use thiserror::Error;

use crate::core::io::IoError;
use crate::core::io::layout::LayoutError;
use crate::core::models::carriers::CatalogError;
use crate::core::models::flows::FlowError;
use crate::core::technologies::component::ComponentError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid network assignment: {0}")]
    Connectivity(String),

    #[error("Energy catalog error: {source}")]
    Catalog {
        #[from]
        source: CatalogError,
    },

    #[error("Component error: {source}")]
    Component {
        #[from]
        source: ComponentError,
    },

    #[error("Energy flow error: {source}")]
    Flow {
        #[from]
        source: FlowError,
    },

    #[error("Supply-system structure for '{target}' is infeasible: {reason}")]
    InfeasibleStructure { target: String, reason: String },

    #[error("Supply-system evaluation for '{target}' failed: {reason}")]
    Evaluation { target: String, reason: String },

    #[error("Optimization phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
