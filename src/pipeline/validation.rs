// Validation gate between extraction and assembly.
// Critical gaps block the report; mandatory-only gaps degrade it with warnings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::extraction::ModuleExtractionResult;
use super::registry::{ConfigError, KpiSchemaRegistry};
use crate::models::{KpiRef, KpiSlot, ModuleId, ReportType};

/// Gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pass,
    Block,
}

/// Result of checking extracted KPIs against a report type's requirements.
///
/// Both lists follow the registry's declared module/key order, so the same
/// gaps always produce the same messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub critical_missing: Vec<KpiRef>,
    pub soft_missing: Vec<KpiRef>,
}

impl ValidationResult {
    pub fn is_blocked(&self) -> bool {
        self.status == ValidationStatus::Block
    }

    /// Passed, but with soft-missing KPIs.
    pub fn is_degraded(&self) -> bool {
        self.status == ValidationStatus::Pass && !self.soft_missing.is_empty()
    }

    pub fn critical_missing_names(&self) -> Vec<String> {
        self.critical_missing.iter().map(|k| k.to_string()).collect()
    }

    pub fn soft_missing_names(&self) -> Vec<String> {
        self.soft_missing.iter().map(|k| k.to_string()).collect()
    }
}

/// Classify missing KPIs for `report_type`.
///
/// A key counts as missing when its slot is not `Present` (Missing or a
/// rejected structural value) or when its module has no result at all.
/// Critical is evaluated independently of mandatory: a critical key blocks
/// even if the mandatory tier does not list it.
pub fn validate(
    registry: &KpiSchemaRegistry,
    report_type: ReportType,
    results: &BTreeMap<ModuleId, ModuleExtractionResult>,
) -> Result<ValidationResult, ConfigError> {
    let profile = registry.profile(report_type)?;

    let is_missing = |module: ModuleId, key: &str| -> bool {
        results
            .get(&module)
            .map(|r| !r.slot(key).is_present())
            .unwrap_or(true)
    };

    let mut critical_missing = Vec::new();
    for req in &profile.modules {
        for key in &req.critical {
            if is_missing(req.module, key) {
                critical_missing.push(KpiRef::new(req.module, key.as_str()));
            }
        }
    }

    let mut soft_missing = Vec::new();
    for req in &profile.modules {
        for key in req.mandatory.iter().filter(|k| !req.is_critical(k)) {
            if is_missing(req.module, key) {
                soft_missing.push(KpiRef::new(req.module, key.as_str()));
            }
        }
    }

    let rejected = results
        .values()
        .flat_map(|r| r.entries())
        .filter(|e| matches!(e.slot, KpiSlot::RejectedStructural { .. }))
        .count();

    let status = if critical_missing.is_empty() {
        ValidationStatus::Pass
    } else {
        ValidationStatus::Block
    };

    match status {
        ValidationStatus::Block => tracing::warn!(
            report_type = %report_type,
            critical_missing = critical_missing.len(),
            soft_missing = soft_missing.len(),
            rejected_structural = rejected,
            "Validation gate: blocked"
        ),
        ValidationStatus::Pass => tracing::info!(
            report_type = %report_type,
            soft_missing = soft_missing.len(),
            rejected_structural = rejected,
            "Validation gate: passed"
        ),
    }

    Ok(ValidationResult {
        status,
        critical_missing,
        soft_missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::extract;

    fn registry() -> KpiSchemaRegistry {
        KpiSchemaRegistry::embedded().unwrap()
    }

    fn markers(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(k, v)| format!(r#"<span data-kpi-key="{k}">{v}</span>"#))
            .collect()
    }

    fn results(entries: &[(ModuleId, String, Vec<&str>)]) -> BTreeMap<ModuleId, ModuleExtractionResult> {
        entries
            .iter()
            .map(|(m, frag, keys)| (*m, extract(frag, *m, keys)))
            .collect()
    }

    fn quick_check_inputs(m6: String) -> BTreeMap<ModuleId, ModuleExtractionResult> {
        results(&[
            (ModuleId::M2, markers(&[("land_value_total", "5,600,000,000")]), vec!["land_value_total"]),
            (ModuleId::M4, markers(&[("total_units", "1,200")]), vec!["total_units"]),
            (ModuleId::M6, m6, vec!["decision", "total_score"]),
        ])
    }

    #[test]
    fn complete_inputs_pass_clean() {
        let r = validate(
            &registry(),
            ReportType::QuickCheck,
            &quick_check_inputs(markers(&[("decision", "GO"), ("total_score", "82.5")])),
        )
        .unwrap();
        assert_eq!(r.status, ValidationStatus::Pass);
        assert!(r.critical_missing.is_empty());
        assert!(r.soft_missing.is_empty());
        assert!(!r.is_degraded());
    }

    #[test]
    fn missing_critical_blocks() {
        let r = validate(
            &registry(),
            ReportType::QuickCheck,
            &quick_check_inputs(markers(&[("total_score", "82.5")])),
        )
        .unwrap();
        assert!(r.is_blocked());
        assert_eq!(r.critical_missing_names(), vec!["M6.decision"]);
        assert!(r.soft_missing.is_empty());
    }

    #[test]
    fn missing_soft_passes_degraded() {
        let r = validate(
            &registry(),
            ReportType::QuickCheck,
            &quick_check_inputs(markers(&[("decision", "GO")])),
        )
        .unwrap();
        assert_eq!(r.status, ValidationStatus::Pass);
        assert!(r.is_degraded());
        assert_eq!(r.soft_missing_names(), vec!["M6.total_score"]);
    }

    #[test]
    fn absent_module_counts_every_key_missing() {
        let mut inputs = quick_check_inputs(markers(&[("decision", "GO"), ("total_score", "80")]));
        inputs.remove(&ModuleId::M2);
        inputs.remove(&ModuleId::M4);
        let r = validate(&registry(), ReportType::QuickCheck, &inputs).unwrap();
        assert_eq!(r.critical_missing_names(), vec!["M2.land_value_total"]);
        assert_eq!(r.soft_missing_names(), vec!["M4.total_units"]);
    }

    #[test]
    fn rejected_structural_counts_as_missing() {
        let r = validate(
            &registry(),
            ReportType::QuickCheck,
            &quick_check_inputs(markers(&[("decision", r#"{"value": "GO"}"#), ("total_score", "80")])),
        )
        .unwrap();
        assert_eq!(r.critical_missing_names(), vec!["M6.decision"]);
    }

    #[test]
    fn order_follows_registry_not_input() {
        let reg = registry();
        let empty = BTreeMap::new();
        let r = validate(&reg, ReportType::AllInOne, &empty).unwrap();
        assert_eq!(
            r.critical_missing_names(),
            vec!["M2.land_value_total", "M4.total_units", "M5.npv", "M6.decision"]
        );
        assert_eq!(r.soft_missing.first().map(|k| k.to_string()).as_deref(), Some("M1.land_area_sqm"));
        assert_eq!(r.soft_missing.last().map(|k| k.to_string()).as_deref(), Some("M6.grade"));
        assert!(!r.soft_missing_names().contains(&"M6.decision".to_string()));
    }

    #[test]
    fn serializes_wire_status() {
        let r = ValidationResult {
            status: ValidationStatus::Block,
            critical_missing: vec![KpiRef::new(ModuleId::M6, "decision")],
            soft_missing: vec![],
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "BLOCK");
    }
}
