//! KPI schema registry: which modules and keys each report type needs, which of
//! those keys block generation, and the declarative presentation data that
//! goes with them.
//!
//! Built once at start-up and shared read-only (`Arc<KpiSchemaRegistry>`)
//! across every assembler and request.

pub mod schema;

pub use schema::{Branding, KpiMeta};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config;
use crate::models::{KpiRef, ModuleId, ReportType, SectionToggle};
use schema::{ProfileFile, SchemaFile};

/// Deployment or programming defects. Always raised before any extraction runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown report type '{0}'")]
    UnknownReportType(String),

    #[error("Report type '{0}' is not configured in the KPI schema")]
    ReportTypeNotConfigured(ReportType),

    #[error("KPI schema is not valid JSON: {0}")]
    SchemaParse(#[from] serde_json::Error),

    #[error("Cannot read KPI schema at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown module id '{value}' in {context}")]
    UnknownModule { context: String, value: String },

    #[error("Invalid KPI reference '{value}' in {context}")]
    InvalidKpiRef { context: String, value: String },

    #[error("Report type '{report_type}' lists module {module} more than once")]
    DuplicateModule {
        report_type: ReportType,
        module: ModuleId,
    },

    #[error("Report type '{report_type}' lists {module}.{key} more than once in one tier")]
    DuplicateKey {
        report_type: ReportType,
        module: ModuleId,
        key: String,
    },

    #[error("Report type '{0}' requires no modules")]
    EmptyProfile(ReportType),

    #[error("Report type '{0}' shows a decision but does not request M6.decision")]
    MissingDecisionKpi(ReportType),

    #[error("Report type '{report_type}' summarises {kpi}, which it never requests")]
    SummaryKpiNotRequested { report_type: ReportType, kpi: KpiRef },
}

/// Mandatory and critical keys for one module within a report type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRequirement {
    pub module: ModuleId,
    pub mandatory: Vec<String>,
    pub critical: Vec<String>,
}

impl ModuleRequirement {
    /// Keys handed to the extractor: mandatory first, then any critical key
    /// the mandatory tier does not already name.
    pub fn requested_keys(&self) -> Vec<String> {
        let mut keys = self.mandatory.clone();
        for key in &self.critical {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    pub fn is_critical(&self, key: &str) -> bool {
        self.critical.iter().any(|k| k == key)
    }
}

/// Everything that varies between report types.
#[derive(Debug, Clone, Serialize)]
pub struct ReportProfile {
    pub report_type: ReportType,
    pub title: String,
    pub branding: Branding,
    pub sections: BTreeSet<SectionToggle>,
    pub summary_kpis: Vec<KpiRef>,
    pub modules: Vec<ModuleRequirement>,
}

impl ReportProfile {
    pub fn includes(&self, section: SectionToggle) -> bool {
        self.sections.contains(&section)
    }

    pub fn requirement(&self, module: ModuleId) -> Option<&ModuleRequirement> {
        self.modules.iter().find(|m| m.module == module)
    }

    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.modules.iter().map(|m| m.module)
    }

    fn requests(&self, kpi: &KpiRef) -> bool {
        self.requirement(kpi.module)
            .is_some_and(|req| req.mandatory.contains(&kpi.key) || req.is_critical(&kpi.key))
    }
}

/// Read-only KPI schema shared by all report assemblers.
#[derive(Debug)]
pub struct KpiSchemaRegistry {
    schema_version: String,
    digest: String,
    profiles: BTreeMap<ReportType, ReportProfile>,
    kpis: BTreeMap<KpiRef, KpiMeta>,
    transitions: BTreeMap<ModuleId, String>,
    actions_by_decision: BTreeMap<String, Vec<String>>,
    default_actions: Vec<String>,
}

impl KpiSchemaRegistry {
    /// The schema compiled into the binary.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json_str(config::DEFAULT_SCHEMA_JSON)
    }

    /// The schema named by `SITEPROOF_KPI_SCHEMA`, else the embedded one.
    pub fn load() -> Result<Self, ConfigError> {
        match config::schema_override_path() {
            Some(path) => Self::from_path(&path),
            None => Self::embedded(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&source)
    }

    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let file: SchemaFile = serde_json::from_str(source)?;
        let digest = Sha256::digest(source.as_bytes())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();

        let mut kpis = BTreeMap::new();
        for (name, meta) in file.kpis {
            let kpi = KpiRef::from_str(&name).map_err(|_| ConfigError::InvalidKpiRef {
                context: "kpis".into(),
                value: name.clone(),
            })?;
            kpis.insert(kpi, meta);
        }

        let mut transitions = BTreeMap::new();
        for (name, meta) in file.modules {
            let module = parse_module(&name, "modules")?;
            if let Some(text) = meta.transition {
                transitions.insert(module, text);
            }
        }

        let mut profiles = BTreeMap::new();
        for (name, raw) in file.report_types {
            let report_type = ReportType::from_str(&name)
                .map_err(|_| ConfigError::UnknownReportType(name.clone()))?;
            profiles.insert(report_type, build_profile(report_type, raw)?);
        }
        for report_type in ReportType::ALL {
            if !profiles.contains_key(report_type) {
                return Err(ConfigError::ReportTypeNotConfigured(*report_type));
            }
        }

        let actions_by_decision = file
            .next_actions
            .by_decision
            .into_iter()
            .map(|(decision, actions)| (normalize_decision(&decision), actions))
            .collect();

        let registry = Self {
            schema_version: file.schema_version,
            digest,
            profiles,
            kpis,
            transitions,
            actions_by_decision,
            default_actions: file.next_actions.default,
        };

        tracing::info!(
            schema_version = %registry.schema_version,
            report_types = registry.profiles.len(),
            kpis = registry.kpis.len(),
            "KPI schema registry loaded"
        );
        Ok(registry)
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// SHA-256 of the schema source, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn report_types(&self) -> impl Iterator<Item = ReportType> + '_ {
        self.profiles.keys().copied()
    }

    pub fn profile(&self, report_type: ReportType) -> Result<&ReportProfile, ConfigError> {
        self.profiles
            .get(&report_type)
            .ok_or(ConfigError::ReportTypeNotConfigured(report_type))
    }

    /// Parse a report type name and return its profile.
    pub fn profile_named(&self, name: &str) -> Result<&ReportProfile, ConfigError> {
        let report_type =
            ReportType::from_str(name).map_err(|_| ConfigError::UnknownReportType(name.into()))?;
        self.profile(report_type)
    }

    /// Mandatory keys per module, in declared order.
    pub fn mandatory(&self, report_type: ReportType) -> Result<Vec<(ModuleId, &[String])>, ConfigError> {
        Ok(self
            .profile(report_type)?
            .modules
            .iter()
            .map(|m| (m.module, m.mandatory.as_slice()))
            .collect())
    }

    /// Critical (blocking) keys per module, in declared order.
    pub fn critical(&self, report_type: ReportType) -> Result<Vec<(ModuleId, &[String])>, ConfigError> {
        Ok(self
            .profile(report_type)?
            .modules
            .iter()
            .map(|m| (m.module, m.critical.as_slice()))
            .collect())
    }

    pub fn kpi_meta(&self, kpi: &KpiRef) -> Option<&KpiMeta> {
        self.kpis.get(kpi)
    }

    /// Display label, falling back to the bare key.
    pub fn label_for(&self, kpi: &KpiRef) -> String {
        self.kpi_meta(kpi)
            .map(|m| m.label.clone())
            .unwrap_or_else(|| kpi.key.clone())
    }

    /// Sentence introducing a module's detail section.
    pub fn transition(&self, module: ModuleId) -> String {
        self.transitions.get(&module).cloned().unwrap_or_else(|| {
            format!("The following section presents the {} results.", module.title())
        })
    }

    /// Follow-up actions for a review decision label. The label is matched
    /// case-insensitively with spaces and hyphens treated as underscores.
    pub fn next_actions_for(&self, decision: Option<&str>) -> &[String] {
        decision
            .and_then(|d| self.actions_by_decision.get(&normalize_decision(d)))
            .unwrap_or(&self.default_actions)
    }
}

fn parse_module(value: &str, context: &str) -> Result<ModuleId, ConfigError> {
    ModuleId::from_str(value).map_err(|_| ConfigError::UnknownModule {
        context: context.into(),
        value: value.into(),
    })
}

fn normalize_decision(label: &str) -> String {
    label
        .trim()
        .to_ascii_uppercase()
        .replace(['-', ' '], "_")
}

fn build_profile(report_type: ReportType, raw: ProfileFile) -> Result<ReportProfile, ConfigError> {
    if raw.modules.is_empty() {
        return Err(ConfigError::EmptyProfile(report_type));
    }

    let context = format!("report_types.{report_type}");
    let mut modules: Vec<ModuleRequirement> = Vec::with_capacity(raw.modules.len());
    for req in raw.modules {
        let module = parse_module(&req.module, &context)?;
        if modules.iter().any(|m| m.module == module) {
            return Err(ConfigError::DuplicateModule {
                report_type,
                module,
            });
        }
        check_unique(report_type, module, &req.mandatory)?;
        check_unique(report_type, module, &req.critical)?;

        for key in req.critical.iter().filter(|k| !req.mandatory.contains(k)) {
            tracing::warn!(
                report_type = %report_type,
                module_id = %module,
                key = %key,
                "Critical KPI is not listed as mandatory; it will still be requested"
            );
        }

        modules.push(ModuleRequirement {
            module,
            mandatory: req.mandatory,
            critical: req.critical,
        });
    }

    let mut summary_kpis = Vec::with_capacity(raw.summary_kpis.len());
    for name in &raw.summary_kpis {
        let kpi = KpiRef::from_str(name).map_err(|_| ConfigError::InvalidKpiRef {
            context: format!("{context}.summary_kpis"),
            value: name.clone(),
        })?;
        summary_kpis.push(kpi);
    }

    let profile = ReportProfile {
        report_type,
        title: raw.title,
        branding: raw.branding,
        sections: raw.sections.into_iter().collect(),
        summary_kpis,
        modules,
    };

    if let Some(kpi) = profile.summary_kpis.iter().find(|k| !profile.requests(k)) {
        return Err(ConfigError::SummaryKpiNotRequested {
            report_type,
            kpi: kpi.clone(),
        });
    }

    let shows_decision = [
        SectionToggle::FinalJudgment,
        SectionToggle::NextActions,
        SectionToggle::DecisionBlock,
    ]
    .iter()
    .any(|s| profile.includes(*s));
    if shows_decision && !profile.requests(&KpiRef::new(ModuleId::M6, "decision")) {
        return Err(ConfigError::MissingDecisionKpi(report_type));
    }

    Ok(profile)
}

fn check_unique(report_type: ReportType, module: ModuleId, keys: &[String]) -> Result<(), ConfigError> {
    for (i, key) in keys.iter().enumerate() {
        if keys[..i].contains(key) {
            return Err(ConfigError::DuplicateKey {
                report_type,
                module,
                key: key.clone(),
            });
        }
    }
    Ok(())
}
