//! Serde mirror of the declarative KPI schema file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Density, KpiFormat, SectionToggle};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SchemaFile {
    pub schema_version: String,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleMeta>,
    #[serde(default)]
    pub kpis: BTreeMap<String, KpiMeta>,
    #[serde(default)]
    pub next_actions: NextActionsFile,
    pub report_types: BTreeMap<String, ProfileFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ModuleMeta {
    #[serde(default)]
    pub transition: Option<String>,
}

/// Display metadata for one KPI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KpiMeta {
    pub label: String,
    #[serde(default = "plain_format")]
    pub format: KpiFormat,
    /// Executive summary sentence; `{value}` is replaced by the presented value.
    #[serde(default)]
    pub summary: Option<String>,
}

fn plain_format() -> KpiFormat {
    KpiFormat::Plain
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct NextActionsFile {
    #[serde(default)]
    pub by_decision: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub default: Vec<String>,
}

/// Cosmetic styling for a report type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Branding {
    pub theme: String,
    pub density: Density,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ProfileFile {
    pub title: String,
    pub branding: Branding,
    pub sections: Vec<SectionToggle>,
    #[serde(default)]
    pub summary_kpis: Vec<String>,
    pub modules: Vec<ModuleRequirementFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ModuleRequirementFile {
    pub module: String,
    pub mandatory: Vec<String>,
    #[serde(default)]
    pub critical: Vec<String>,
}
