//! Section builders. Every leaf value passes through the presenter here;
//! nothing in this file formats a number itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{Section, SectionKind};
use crate::config::{self, PLACEHOLDER};
use crate::models::{ExtractionStatus, KpiRef, KpiScalar, KpiSlot, ModuleId};
use crate::pipeline::extraction::ModuleExtractionResult;
use crate::pipeline::presenter::{present, present_soft_kpi};
use crate::pipeline::registry::{KpiSchemaRegistry, ReportProfile};
use crate::pipeline::validation::ValidationResult;

static MISSING: KpiSlot = KpiSlot::Missing;

/// Read-only inputs shared by all section builders for one request.
pub(crate) struct SectionContext<'a> {
    pub registry: &'a KpiSchemaRegistry,
    pub profile: &'a ReportProfile,
    pub results: &'a BTreeMap<ModuleId, ModuleExtractionResult>,
    pub validation: &'a ValidationResult,
    pub context_id: Uuid,
    pub build_signature: &'a str,
    pub generated_at: DateTime<Utc>,
}

impl SectionContext<'_> {
    fn slot(&self, kpi: &KpiRef) -> &KpiSlot {
        self.results
            .get(&kpi.module)
            .map(|r| r.slot(&kpi.key))
            .unwrap_or(&MISSING)
    }

    /// Presented value for a KPI. The marker's own unit wins; numbers without
    /// one take the unit of their configured format.
    fn present_kpi(&self, kpi: &KpiRef) -> String {
        let slot = self.slot(kpi);
        let unit = match slot.value() {
            Some(v) if !v.unit().is_empty() => v.unit().to_string(),
            Some(v) if matches!(v.scalar(), KpiScalar::Number(_)) => self
                .registry
                .kpi_meta(kpi)
                .map(|m| m.format.default_unit().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        present(slot, &unit)
    }

    fn row_for(&self, section: Section, kpi: &KpiRef) -> Section {
        section.row(self.registry.label_for(kpi), self.present_kpi(kpi))
    }

    /// Decision label as shown, when M6 supplied one.
    fn decision(&self) -> Option<String> {
        let kpi = decision_kpi();
        let shown = self.present_kpi(&kpi);
        (shown != PLACEHOLDER).then_some(shown)
    }

    /// Requested M6 keys in declared order.
    fn review_kpis(&self) -> Vec<KpiRef> {
        self.profile
            .requirement(ModuleId::M6)
            .map(|req| {
                req.requested_keys()
                    .into_iter()
                    .map(|k| KpiRef::new(ModuleId::M6, k))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn decision_kpi() -> KpiRef {
    KpiRef::new(ModuleId::M6, "decision")
}

// ---------------------------------------------------------------------------
// Blocking stub
// ---------------------------------------------------------------------------

/// The only section of a blocked document. Names the missing keys, shows no values.
pub(crate) fn blocking_notice(registry: &KpiSchemaRegistry, profile: &ReportProfile, validation: &ValidationResult) -> Section {
    let mut section = Section::new(SectionKind::BlockingNotice, "Report generation blocked").paragraph(format!(
        "The {} cannot be produced because information it requires is missing. \
         No figures are shown until the upstream analysis supplies the items below.",
        profile.title
    ));
    for kpi in &validation.critical_missing {
        section = section.row(kpi.to_string(), registry.label_for(kpi));
    }
    section
}

// ---------------------------------------------------------------------------
// Content sections, canonical order
// ---------------------------------------------------------------------------

pub(crate) fn cover(ctx: &SectionContext<'_>) -> Section {
    Section::new(SectionKind::Cover, ctx.profile.title.clone())
        .row("Report type", ctx.profile.report_type.as_str())
        .row("Context", ctx.context_id.to_string())
        .row("Generated", ctx.generated_at.format("%Y-%m-%d %H:%M UTC").to_string())
        .row("Schema version", ctx.registry.schema_version())
}

pub(crate) fn kpi_summary(ctx: &SectionContext<'_>) -> Section {
    ctx.profile
        .summary_kpis
        .iter()
        .fold(Section::new(SectionKind::KpiSummary, "Key Figures"), |s, kpi| ctx.row_for(s, kpi))
}

/// Only built when validation reported soft-missing KPIs.
pub(crate) fn data_completeness(ctx: &SectionContext<'_>) -> Section {
    let mut section = Section::new(SectionKind::DataCompleteness, "Data Completeness").paragraph(
        "The report was generated, but the following supporting figures were not available.",
    );
    for kpi in &ctx.validation.soft_missing {
        section = section.row(ctx.registry.label_for(kpi), present_soft_kpi(ctx.slot(kpi)));
    }
    section
}

/// One sentence per present KPI that has a summary template. Absent KPIs are
/// left to the completeness panel.
pub(crate) fn executive_summary(ctx: &SectionContext<'_>) -> Section {
    let mut section = Section::new(SectionKind::ExecutiveSummary, "Executive Summary");
    for req in &ctx.profile.modules {
        for key in req.requested_keys() {
            let kpi = KpiRef::new(req.module, key);
            let Some(template) = ctx.registry.kpi_meta(&kpi).and_then(|m| m.summary.as_deref()) else {
                continue;
            };
            let shown = ctx.present_kpi(&kpi);
            if shown != PLACEHOLDER {
                section = section.paragraph(template.replace("{value}", &shown));
            }
        }
    }
    if section.paragraphs.is_empty() {
        section = section.paragraph("No summary figures were available for this report.");
    }
    section
}

pub(crate) fn module_detail(ctx: &SectionContext<'_>, module: ModuleId) -> Section {
    let mut section = Section::new(SectionKind::ModuleDetail(module), format!("{module}. {}", module.title()))
        .paragraph(ctx.registry.transition(module));

    match ctx.results.get(&module).map(|r| r.status()) {
        Some(ExtractionStatus::Ok) => {}
        Some(ExtractionStatus::Empty) | None => {
            section = section.paragraph("This module produced no output for this request.");
        }
        Some(ExtractionStatus::ExtractionFailed) => {
            section = section.paragraph("This module's output could not be read; its figures are shown as pending.");
        }
    }

    if let Some(req) = ctx.profile.requirement(module) {
        for key in req.requested_keys() {
            section = ctx.row_for(section, &KpiRef::new(module, key));
        }
    }
    section
}

pub(crate) fn final_judgment(ctx: &SectionContext<'_>) -> Section {
    let decision = decision_kpi();
    let sentence = match (ctx.decision(), ctx.registry.kpi_meta(&decision).and_then(|m| m.summary.as_deref())) {
        (Some(shown), Some(template)) => template.replace("{value}", &shown),
        (Some(shown), None) => format!("Final review decision: {shown}."),
        (None, _) => "The final review has not yet produced a decision.".to_string(),
    };
    ctx.review_kpis()
        .iter()
        .fold(Section::new(SectionKind::FinalJudgment, "Final Judgment").paragraph(sentence), |s, kpi| {
            ctx.row_for(s, kpi)
        })
}

pub(crate) fn next_actions(ctx: &SectionContext<'_>) -> Section {
    let decision = ctx.decision();
    ctx.registry
        .next_actions_for(decision.as_deref())
        .iter()
        .fold(Section::new(SectionKind::NextActions, "Next Actions"), |s, action| {
            s.paragraph(action.clone())
        })
}

pub(crate) fn decision_block(ctx: &SectionContext<'_>) -> Section {
    let decision = decision_kpi();
    ctx.row_for(Section::new(SectionKind::DecisionBlock, "Decision"), &decision)
        .row("Context", ctx.context_id.to_string())
        .paragraph(format!(
            "This decision reproduces the final review output recorded for context {}.",
            ctx.context_id
        ))
}

pub(crate) fn footer(ctx: &SectionContext<'_>) -> Section {
    Section::new(SectionKind::Footer, "About this report")
        .paragraph("Every figure is reproduced exactly as computed by the upstream analysis modules.")
        .paragraph(format!("Generated by {} ({}).", config::APP_NAME, ctx.build_signature))
}
