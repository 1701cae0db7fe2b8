//! Report assembly: one engine, driven by registry profiles, producing
//! ordered documents or blocking stubs.

pub mod types;
pub mod sections;
pub mod html;
pub mod orchestrator;

pub use html::escape_html;
pub use orchestrator::ReportAssembler;
pub use types::*;

use thiserror::Error;

use crate::pipeline::registry::ConfigError;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Illegal assembly transition {from} -> {to}")]
    IllegalTransition { from: AssemblyState, to: AssemblyState },
}
