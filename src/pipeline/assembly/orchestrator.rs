//! Report assembler: extraction → validation → blocked stub or full document.
//!
//! One engine serves every report type. All variation comes from the
//! registry profile; the assembler holds no per-type logic.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::sections::{self, SectionContext};
use super::types::{
    AssemblyState, FragmentSet, QaResult, QaStatus, ReportDocument, ReportMetadata, SectionKind, SectionSet,
};
use super::AssemblyError;
use crate::audit::{AuditRecord, AuditSink};
use crate::config;
use crate::models::{ExtractionStatus, ModuleId, ReportType};
use crate::pipeline::extraction::{extract, ModuleExtractionResult};
use crate::pipeline::registry::{KpiSchemaRegistry, ReportProfile};
use crate::pipeline::validation::{validate, ValidationResult};

/// Length of the schema digest prefix carried in the build signature.
const SIGNATURE_DIGEST_LEN: usize = 12;

/// Tracks one request through the assembly states.
struct Run {
    state: AssemblyState,
    report_type: ReportType,
    context_id: Uuid,
}

impl Run {
    fn new(report_type: ReportType, context_id: Uuid) -> Self {
        Self {
            state: AssemblyState::Init,
            report_type,
            context_id,
        }
    }

    fn advance(&mut self, next: AssemblyState) -> Result<(), AssemblyError> {
        if !self.state.can_transition_to(next) {
            return Err(AssemblyError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            report_type = %self.report_type,
            context_id = %self.context_id,
            from = %self.state,
            to = %next,
            "Assembly state change"
        );
        self.state = next;
        Ok(())
    }
}

/// Builds report documents from module fragments.
///
/// Cheap to clone and safe to share: the registry and sink are both
/// reference-counted and read-only from the assembler's side.
#[derive(Clone)]
pub struct ReportAssembler {
    registry: Arc<KpiSchemaRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl ReportAssembler {
    pub fn new(registry: Arc<KpiSchemaRegistry>, audit: Arc<dyn AuditSink>) -> Self {
        Self { registry, audit }
    }

    pub fn registry(&self) -> &KpiSchemaRegistry {
        &self.registry
    }

    /// `<app>/<version>+<schema digest prefix>`.
    pub fn build_signature(&self) -> String {
        let digest = self.registry.digest();
        let prefix = digest.get(..SIGNATURE_DIGEST_LEN).unwrap_or(digest);
        format!("{}/{}+{prefix}", config::APP_NAME, config::APP_VERSION)
    }

    /// Generate a report by type name. Unknown names fail before any extraction.
    pub fn generate_named(
        &self,
        report_type: &str,
        context_id: Uuid,
        fragments: &FragmentSet,
    ) -> Result<ReportDocument, AssemblyError> {
        let profile = self.registry.profile_named(report_type)?;
        self.generate(profile.report_type, context_id, fragments)
    }

    /// Run the full pipeline for one request.
    ///
    /// A missing critical KPI is not an error: it yields a blocked document
    /// with `qa_result.blocking = true`. `Err` is reserved for configuration
    /// defects and internal state violations.
    pub fn generate(
        &self,
        report_type: ReportType,
        context_id: Uuid,
        fragments: &FragmentSet,
    ) -> Result<ReportDocument, AssemblyError> {
        let profile = self.registry.profile(report_type)?;
        let mut run = Run::new(report_type, context_id);

        run.advance(AssemblyState::Extracting)?;
        let results = self.extract_modules(profile, context_id, fragments);

        run.advance(AssemblyState::Validating)?;
        let validation = validate(&self.registry, report_type, &results)?;

        let generated_at = Utc::now();
        let metadata = ReportMetadata {
            report_type,
            build_signature: self.build_signature(),
            generated_at,
        };

        if validation.is_blocked() {
            run.advance(AssemblyState::Blocked)?;
            let qa_result = QaResult {
                status: QaStatus::Fail,
                errors: validation
                    .critical_missing
                    .iter()
                    .map(|k| format!("Critical KPI missing: {k}"))
                    .collect(),
                warnings: Vec::new(),
                blocking: true,
            };
            let notice = sections::blocking_notice(&self.registry, profile, &validation);

            tracing::warn!(
                report_type = %report_type,
                context_id = %context_id,
                critical_missing = validation.critical_missing.len(),
                "Report blocked"
            );
            return Ok(ReportDocument {
                state: run.state,
                context_id,
                title: profile.title.clone(),
                branding: profile.branding.clone(),
                sections: vec![notice],
                metadata,
                qa_result,
                validation,
            });
        }

        run.advance(AssemblyState::Assembling)?;
        let ctx = SectionContext {
            registry: &self.registry,
            profile,
            results: &results,
            validation: &validation,
            context_id,
            build_signature: &metadata.build_signature,
            generated_at,
        };
        let sections = assemble_sections(&ctx).into_sections();
        let qa_result = qa_for(&validation, &results);

        run.advance(AssemblyState::Done)?;
        tracing::info!(
            report_type = %report_type,
            context_id = %context_id,
            sections = sections.len(),
            qa_status = ?qa_result.status,
            "Report assembled"
        );

        Ok(ReportDocument {
            state: run.state,
            context_id,
            title: profile.title.clone(),
            branding: profile.branding.clone(),
            sections,
            metadata,
            qa_result,
            validation,
        })
    }

    /// Extract each profile module in declared order, one audit record each.
    fn extract_modules(
        &self,
        profile: &ReportProfile,
        context_id: Uuid,
        fragments: &FragmentSet,
    ) -> BTreeMap<ModuleId, ModuleExtractionResult> {
        let mut results = BTreeMap::new();
        for req in &profile.modules {
            if !fragments.contains(req.module) {
                tracing::debug!(module_id = %req.module, "No fragment supplied; treating as empty");
            }
            let result = extract(fragments.get(req.module), req.module, &req.requested_keys());
            self.audit
                .record(AuditRecord::new(profile.report_type, context_id, result.clone()));
            results.insert(req.module, result);
        }
        results
    }
}

/// Content sections for a passing document. Presence comes from the
/// profile; order comes from `SectionKind`.
fn assemble_sections(ctx: &SectionContext<'_>) -> SectionSet {
    let profile = ctx.profile;
    let enabled = |kind: SectionKind| kind.toggle().is_some_and(|t| profile.includes(t));
    let mut set = SectionSet::default();

    if enabled(SectionKind::Cover) {
        set.insert(sections::cover(ctx));
    }
    if enabled(SectionKind::KpiSummary) {
        set.insert(sections::kpi_summary(ctx));
    }
    if !ctx.validation.soft_missing.is_empty() {
        set.insert(sections::data_completeness(ctx));
    }
    if enabled(SectionKind::ExecutiveSummary) {
        set.insert(sections::executive_summary(ctx));
    }
    for module in profile.module_ids() {
        if enabled(SectionKind::ModuleDetail(module)) {
            set.insert(sections::module_detail(ctx, module));
        }
    }
    if enabled(SectionKind::FinalJudgment) {
        set.insert(sections::final_judgment(ctx));
    }
    if enabled(SectionKind::NextActions) {
        set.insert(sections::next_actions(ctx));
    }
    if enabled(SectionKind::DecisionBlock) {
        set.insert(sections::decision_block(ctx));
    }
    if enabled(SectionKind::Footer) {
        set.insert(sections::footer(ctx));
    }

    debug_assert!(!set.contains(SectionKind::BlockingNotice));
    set
}

fn qa_for(validation: &ValidationResult, results: &BTreeMap<ModuleId, ModuleExtractionResult>) -> QaResult {
    let mut warnings: Vec<String> = validation
        .soft_missing
        .iter()
        .map(|k| format!("Soft KPI missing: {k}"))
        .collect();

    for result in results.values() {
        match result.status() {
            ExtractionStatus::Ok => {}
            ExtractionStatus::Empty => {
                warnings.push(format!("Module {} produced an empty fragment", result.module_id()));
            }
            ExtractionStatus::ExtractionFailed => warnings.push(format!(
                "Module {} fragment could not be read: {}",
                result.module_id(),
                result.failure_reason().unwrap_or("unknown reason")
            )),
        }
    }

    let status = if validation.soft_missing.is_empty() {
        QaStatus::Pass
    } else {
        QaStatus::PassWithWarnings
    };

    QaResult {
        status,
        errors: Vec::new(),
        warnings,
        blocking: false,
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::PLACEHOLDER;
    use crate::pipeline::validation::ValidationStatus;

    fn marker(key: &str, value: &str) -> String {
        format!(r#"<span data-kpi-key="{key}">{value}</span>"#)
    }

    fn fragment(pairs: &[(&str, &str)]) -> String {
        let body: String = pairs.iter().map(|(k, v)| marker(k, v)).collect();
        format!("<section>{body}</section>")
    }

    /// Every KPI of every module filled with a plausible value.
    fn full_fragments() -> FragmentSet {
        FragmentSet::new()
            .with(
                ModuleId::M1,
                fragment(&[
                    ("land_area_sqm", "2,000"),
                    ("zoning_district", "Type 2 General Residential"),
                    ("official_land_price", "1,850,000"),
                ]),
            )
            .with(
                ModuleId::M2,
                format!(
                    "<section>{}{}{}</section>",
                    r#"<span data-kpi-key="land_value_total" data-kpi-unit="원">5,600,000,000</span>"#,
                    marker("unit_price_sqm", "2,800,000"),
                    r#"<em data-kpi-key="valuation_confidence" data-kpi-type="label">High</em>"#,
                ),
            )
            .with(
                ModuleId::M3,
                fragment(&[("supply_type", "Youth housing"), ("supply_type_score", "87.5")]),
            )
            .with(
                ModuleId::M4,
                fragment(&[
                    ("total_units", "1,200"),
                    ("floor_area_ratio", "249.8"),
                    ("building_coverage_ratio", "58.2"),
                    ("gross_floor_area", "9,870.25"),
                    ("parking_spaces", "640"),
                ]),
            )
            .with(
                ModuleId::M5,
                fragment(&[
                    ("total_project_cost", "41,200,000,000"),
                    ("npv", "3,400,000,000"),
                    ("irr", "7.250"),
                    ("profitability_index", "1.08"),
                ]),
            )
            .with(
                ModuleId::M6,
                format!(
                    "<section>{}{}{}</section>",
                    r#"<strong data-kpi-key="decision" data-kpi-type="label">GO</strong>"#,
                    marker("total_score", "82.5"),
                    marker("grade", "A"),
                ),
            )
    }

    fn assembler() -> (ReportAssembler, Arc<MemoryAuditSink>) {
        let registry = Arc::new(KpiSchemaRegistry::embedded().unwrap());
        let sink = Arc::new(MemoryAuditSink::new());
        (ReportAssembler::new(registry, sink.clone()), sink)
    }

    fn all_text(doc: &ReportDocument) -> String {
        doc.sections
            .iter()
            .flat_map(|s| {
                std::iter::once(s.title.clone())
                    .chain(s.paragraphs.iter().cloned())
                    .chain(s.rows.iter().flat_map(|r| [r.label.clone(), r.value.clone()]))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // =================================================================
    // BLOCKING
    // =================================================================

    #[test]
    fn quick_check_without_decision_is_blocked() {
        let (asm, _) = assembler();
        let mut fragments = full_fragments();
        fragments.insert(ModuleId::M6, fragment(&[("total_score", "82.5")]));

        let doc = asm.generate(ReportType::QuickCheck, Uuid::new_v4(), &fragments).unwrap();
        assert_eq!(doc.state, AssemblyState::Blocked);
        assert!(doc.qa_result.blocking);
        assert_eq!(doc.qa_result.status, QaStatus::Fail);
        assert_eq!(doc.validation.critical_missing_names(), vec!["M6.decision"]);
        assert_eq!(doc.section_kinds(), vec![SectionKind::BlockingNotice]);
    }

    #[test]
    fn blocked_document_shows_no_figures() {
        let (asm, _) = assembler();
        let fragments = full_fragments().with(ModuleId::M5, "");
        let doc = asm.generate(ReportType::FinancialFeasibility, Uuid::nil(), &fragments).unwrap();
        assert!(doc.is_blocking());
        let text = all_text(&doc);
        assert!(!text.contains("5,600,000,000"));
        assert!(text.contains("M5.npv"));
        assert_eq!(
            doc.validation.critical_missing_names(),
            vec!["M5.total_project_cost", "M5.npv", "M5.irr"]
        );
    }

    #[test]
    fn structured_decision_blocks() {
        let (asm, _) = assembler();
        let fragments = full_fragments().with(ModuleId::M6, marker("decision", r#"{"value": "GO"}"#));
        let doc = asm.generate(ReportType::QuickCheck, Uuid::nil(), &fragments).unwrap();
        assert!(doc.is_blocking());
        assert!(!all_text(&doc).contains("{"));
    }

    // =================================================================
    // PASSING DOCUMENTS
    // =================================================================

    #[test]
    fn complete_inputs_pass_without_warnings() {
        let (asm, _) = assembler();
        let doc = asm.generate(ReportType::AllInOne, Uuid::nil(), &full_fragments()).unwrap();
        assert_eq!(doc.state, AssemblyState::Done);
        assert_eq!(doc.qa_result.status, QaStatus::Pass);
        assert!(!doc.qa_result.blocking);
        assert!(doc.qa_result.warnings.is_empty());
        assert!(doc.section(SectionKind::DataCompleteness).is_none());
        assert_eq!(doc.validation.status, ValidationStatus::Pass);
    }

    #[test]
    fn values_are_mirrored_verbatim() {
        let (asm, _) = assembler();
        let doc = asm.generate(ReportType::AllInOne, Uuid::nil(), &full_fragments()).unwrap();
        let summary = doc.section(SectionKind::KpiSummary).unwrap();
        let value = |label: &str| summary.rows.iter().find(|r| r.label == label).unwrap().value.clone();
        assert_eq!(value("Total land value"), "5,600,000,000원");
        assert_eq!(value("Total housing units"), "1,200세대");
        assert_eq!(value("Internal rate of return"), "7.250%");
        assert_eq!(value("Recommended supply type"), "Youth housing");
        assert_eq!(value("Decision"), "GO");
    }

    #[test]
    fn soft_missing_degrades_with_panel() {
        let (asm, _) = assembler();
        let fragments = full_fragments().with(
            ModuleId::M3,
            fragment(&[("supply_type_score", "87.5")]),
        );
        let doc = asm.generate(ReportType::AllInOne, Uuid::nil(), &fragments).unwrap();
        assert_eq!(doc.state, AssemblyState::Done);
        assert_eq!(doc.qa_result.status, QaStatus::PassWithWarnings);
        assert!(!doc.qa_result.blocking);
        assert_eq!(doc.validation.soft_missing_names(), vec!["M3.supply_type"]);

        let panel = doc.section(SectionKind::DataCompleteness).unwrap();
        assert_eq!(panel.rows[0].label, "Recommended supply type");
        assert_eq!(panel.rows[0].value, config::SOFT_MISSING_SENTENCE);

        let summary = doc.section(SectionKind::KpiSummary).unwrap();
        let supply = summary.rows.iter().find(|r| r.label == "Recommended supply type").unwrap();
        assert_eq!(supply.value, PLACEHOLDER);
    }

    #[test]
    fn failed_module_reported_in_warnings() {
        let (asm, _) = assembler();
        let fragments = full_fragments().with(ModuleId::M1, "<div data-kpi-key=\"land_area_sqm\">2,000");
        let doc = asm.generate(ReportType::AllInOne, Uuid::nil(), &fragments).unwrap();
        assert_eq!(doc.qa_result.status, QaStatus::PassWithWarnings);
        assert!(doc
            .qa_result
            .warnings
            .iter()
            .any(|w| w.starts_with("Module M1 fragment could not be read")));
    }

    #[test]
    fn module_details_open_with_transition() {
        let (asm, _) = assembler();
        let doc = asm.generate(ReportType::AllInOne, Uuid::nil(), &full_fragments()).unwrap();
        for module in ModuleId::ALL {
            let section = doc.section(SectionKind::ModuleDetail(*module)).unwrap();
            assert_eq!(section.paragraphs[0], asm.registry().transition(*module));
        }
    }

    // =================================================================
    // SECTION ORDER
    // =================================================================

    #[test]
    fn section_order_is_shared_across_report_types() {
        let (asm, _) = assembler();
        let fragments = full_fragments();
        for rt in ReportType::ALL {
            let doc = asm.generate(*rt, Uuid::nil(), &fragments).unwrap();
            let kinds = doc.section_kinds();
            let mut sorted = kinds.clone();
            sorted.sort();
            assert_eq!(kinds, sorted, "{rt} out of canonical order");
            assert_eq!(kinds.first(), Some(&SectionKind::Cover), "{rt}");
            assert_eq!(kinds.last(), Some(&SectionKind::Footer), "{rt}");
        }
    }

    #[test]
    fn profiles_vary_only_in_presence() {
        let (asm, _) = assembler();
        let fragments = full_fragments();
        let quick = asm.generate(ReportType::QuickCheck, Uuid::nil(), &fragments).unwrap();
        let full = asm.generate(ReportType::AllInOne, Uuid::nil(), &fragments).unwrap();
        let full_kinds = full.section_kinds();
        // Quick check's sections are a subsequence of the full report's.
        let mut cursor = full_kinds.iter();
        for kind in quick.section_kinds() {
            assert!(cursor.any(|k| *k == kind), "{kind:?} out of order");
        }
        assert!(quick.section(SectionKind::ExecutiveSummary).is_none());
        assert_eq!(quick.branding.theme, "teal");
    }

    // =================================================================
    // AUDIT & CONFIG
    // =================================================================

    #[test]
    fn one_audit_record_per_module_in_profile_order() {
        let (asm, sink) = assembler();
        let ctx = Uuid::new_v4();
        asm.generate(ReportType::FinancialFeasibility, ctx, &full_fragments()).unwrap();
        let records = sink.drain();
        let modules: Vec<ModuleId> = records.iter().map(|r| r.module_id).collect();
        assert_eq!(modules, vec![ModuleId::M2, ModuleId::M4, ModuleId::M5, ModuleId::M6]);
        assert!(records.iter().all(|r| r.context_id == ctx));
        assert!(records.iter().all(|r| r.report_type == ReportType::FinancialFeasibility));
    }

    #[test]
    fn blocked_requests_are_still_audited() {
        let (asm, sink) = assembler();
        asm.generate(ReportType::QuickCheck, Uuid::nil(), &FragmentSet::new()).unwrap();
        assert_eq!(sink.buffer_len(), 3);
    }

    #[test]
    fn unknown_report_type_fails_before_extraction() {
        let (asm, sink) = assembler();
        let err = asm
            .generate_named("weekly_digest", Uuid::nil(), &full_fragments())
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Config(_)));
        assert_eq!(sink.buffer_len(), 0);
    }

    #[test]
    fn generate_named_accepts_wire_names() {
        let (asm, _) = assembler();
        let doc = asm
            .generate_named("landowner_summary", Uuid::nil(), &full_fragments())
            .unwrap();
        assert_eq!(doc.metadata.report_type, ReportType::LandownerSummary);
    }

    #[test]
    fn build_signature_carries_digest_prefix() {
        let (asm, _) = assembler();
        let sig = asm.build_signature();
        let expected_prefix = &asm.registry().digest()[..SIGNATURE_DIGEST_LEN];
        assert_eq!(sig, format!("Siteproof/{}+{expected_prefix}", config::APP_VERSION));
    }

    #[test]
    fn illegal_transition_is_internal_error() {
        let mut run = Run::new(ReportType::QuickCheck, Uuid::nil());
        let err = run.advance(AssemblyState::Done).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::IllegalTransition {
                from: AssemblyState::Init,
                to: AssemblyState::Done
            }
        ));
    }

    // =================================================================
    // HTML & CONCURRENCY
    // =================================================================

    #[test]
    fn html_escapes_values_and_carries_branding() {
        let (asm, _) = assembler();
        let fragments = full_fragments().with(
            ModuleId::M3,
            fragment(&[("supply_type", "Rental &amp; sale &lt;mixed&gt;"), ("supply_type_score", "87.5")]),
        );
        let doc = asm.generate(ReportType::LandownerSummary, Uuid::nil(), &fragments).unwrap();
        let html = doc.to_html();
        assert!(html.contains("theme-forest density-standard"));
        assert!(html.contains("Rental &amp; sale &lt;mixed&gt;"));
        assert!(!html.contains("<mixed>"));
        assert!(html.find("class=\"cover\"").unwrap() < html.find("class=\"footer\"").unwrap());
    }

    #[test]
    fn concurrent_requests_share_registry_and_sink() {
        let (asm, sink) = assembler();
        let handles: Vec<_> = ReportType::ALL
            .iter()
            .map(|rt| {
                let asm = asm.clone();
                let rt = *rt;
                std::thread::spawn(move || {
                    let doc = asm.generate(rt, Uuid::new_v4(), &full_fragments()).unwrap();
                    (rt, doc)
                })
            })
            .collect();

        let mut expected_records = 0;
        for h in handles {
            let (rt, doc) = h.join().unwrap();
            assert_eq!(doc.state, AssemblyState::Done, "{rt}");
            expected_records += asm.registry().profile(rt).unwrap().modules.len();
        }
        assert_eq!(sink.buffer_len(), expected_records);
    }

    #[test]
    fn document_serializes_to_json() {
        let (asm, _) = assembler();
        let doc = asm.generate(ReportType::QuickCheck, Uuid::nil(), &full_fragments()).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["state"], "done");
        assert_eq!(json["qa_result"]["status"], "PASS");
        assert_eq!(json["metadata"]["report_type"], "quick_check");
        assert_eq!(json["sections"][0]["kind"], "cover");
    }
}
