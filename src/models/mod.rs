pub mod enums;
pub mod kpi;

pub use enums::*;
pub use kpi::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid value for {field}: '{value}'")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid KPI reference '{0}' (expected MODULE.key)")]
    InvalidKpiRef(String),
}
