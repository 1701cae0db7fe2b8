use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ModuleId, ReportType, SectionToggle};
use crate::pipeline::registry::Branding;
use crate::pipeline::validation::ValidationResult;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Every section a document can contain, declared in canonical order.
///
/// The derived `Ord` is the document order. Documents collect their sections
/// through a `BTreeMap<SectionKind, _>`, so no report type can reorder them.
/// Module details sort by module id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    BlockingNotice,
    Cover,
    KpiSummary,
    DataCompleteness,
    ExecutiveSummary,
    ModuleDetail(ModuleId),
    FinalJudgment,
    NextActions,
    DecisionBlock,
    Footer,
}

impl SectionKind {
    /// The profile switch that enables this section. Blocking notice and data
    /// completeness are driven by validation, not by the profile.
    pub fn toggle(&self) -> Option<SectionToggle> {
        match self {
            Self::BlockingNotice | Self::DataCompleteness => None,
            Self::Cover => Some(SectionToggle::Cover),
            Self::KpiSummary => Some(SectionToggle::KpiSummary),
            Self::ExecutiveSummary => Some(SectionToggle::ExecutiveSummary),
            Self::ModuleDetail(_) => Some(SectionToggle::ModuleDetails),
            Self::FinalJudgment => Some(SectionToggle::FinalJudgment),
            Self::NextActions => Some(SectionToggle::NextActions),
            Self::DecisionBlock => Some(SectionToggle::DecisionBlock),
            Self::Footer => Some(SectionToggle::Footer),
        }
    }

    /// CSS class used by the HTML rendering.
    pub fn css_class(&self) -> String {
        match self {
            Self::BlockingNotice => "blocking-notice".into(),
            Self::Cover => "cover".into(),
            Self::KpiSummary => "kpi-summary".into(),
            Self::DataCompleteness => "data-completeness".into(),
            Self::ExecutiveSummary => "executive-summary".into(),
            Self::ModuleDetail(m) => format!("module-detail module-{}", m.as_str().to_ascii_lowercase()),
            Self::FinalJudgment => "final-judgment".into(),
            Self::NextActions => "next-actions".into(),
            Self::DecisionBlock => "decision-block".into(),
            Self::Footer => "footer".into(),
        }
    }
}

/// A labelled value. `value` is already presenter output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRow {
    pub label: String,
    pub value: String,
}

impl SectionRow {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// One rendered section. Text is plain; escaping happens at HTML rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paragraphs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<SectionRow>,
}

impl Section {
    pub fn new(kind: SectionKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            paragraphs: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn paragraph(mut self, text: impl Into<String>) -> Self {
        self.paragraphs.push(text.into());
        self
    }

    pub fn row(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.rows.push(SectionRow::new(label, value));
        self
    }
}

// ---------------------------------------------------------------------------
// QA
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QaStatus {
    Pass,
    PassWithWarnings,
    Fail,
}

/// Quality verdict attached to every document. `blocking = true` tells the
/// caller not to deliver the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaResult {
    pub status: QaStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub blocking: bool,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Per-request assembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyState {
    Init,
    Extracting,
    Validating,
    Blocked,
    Assembling,
    Done,
}

impl AssemblyState {
    pub fn can_transition_to(&self, next: AssemblyState) -> bool {
        use AssemblyState::*;
        matches!(
            (self, next),
            (Init, Extracting)
                | (Extracting, Validating)
                | (Validating, Blocked)
                | (Validating, Assembling)
                | (Assembling, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Blocked | Self::Done)
    }
}

impl std::fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Extracting => "EXTRACTING",
            Self::Validating => "VALIDATING",
            Self::Blocked => "BLOCKED",
            Self::Assembling => "ASSEMBLING",
            Self::Done => "DONE",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub report_type: ReportType,
    /// `<app>/<version>+<schema digest prefix>`.
    pub build_signature: String,
    pub generated_at: DateTime<Utc>,
}

/// The assembled report. Either a full document (`Done`) or a blocking stub
/// (`Blocked`) holding a single blocking notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub state: AssemblyState,
    pub context_id: Uuid,
    pub title: String,
    pub branding: Branding,
    pub sections: Vec<Section>,
    pub metadata: ReportMetadata,
    pub qa_result: QaResult,
    pub validation: ValidationResult,
}

impl ReportDocument {
    pub fn is_blocking(&self) -> bool {
        self.qa_result.blocking
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn section_kinds(&self) -> Vec<SectionKind> {
        self.sections.iter().map(|s| s.kind).collect()
    }
}

/// Ordered section collection used while assembling.
#[derive(Debug, Default)]
pub(crate) struct SectionSet(BTreeMap<SectionKind, Section>);

impl SectionSet {
    pub fn insert(&mut self, section: Section) {
        self.0.insert(section.kind, section);
    }

    pub fn contains(&self, kind: SectionKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn into_sections(self) -> Vec<Section> {
        self.0.into_values().collect()
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Rendered HTML fragments for one request, keyed by module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSet {
    fragments: BTreeMap<ModuleId, String>,
}

impl FragmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: ModuleId, fragment: impl Into<String>) {
        self.fragments.insert(module, fragment.into());
    }

    pub fn with(mut self, module: ModuleId, fragment: impl Into<String>) -> Self {
        self.insert(module, fragment);
        self
    }

    /// The module's fragment, or `""` when the caller supplied none.
    pub fn get(&self, module: ModuleId) -> &str {
        self.fragments.get(&module).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, module: ModuleId) -> bool {
        self.fragments.contains_key(&module)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Read `M1.html` … `M6.html` from `dir`. Absent files are skipped.
    pub fn load_dir(dir: &Path) -> std::io::Result<Self> {
        let mut set = Self::new();
        for module in ModuleId::ALL {
            let path = dir.join(format!("{module}.html"));
            match std::fs::read_to_string(&path) {
                Ok(fragment) => set.insert(*module, fragment),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(module_id = %module, "No fragment file for module");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(set)
    }
}

impl FromIterator<(ModuleId, String)> for FragmentSet {
    fn from_iter<I: IntoIterator<Item = (ModuleId, String)>>(iter: I) -> Self {
        Self {
            fragments: iter.into_iter().collect(),
        }
    }
}
