use serde::{Deserialize, Serialize};

use crate::models::{ExtractionStatus, KpiSlot, ModuleId};

static MISSING: KpiSlot = KpiSlot::Missing;

/// One requested key and what extraction found for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiEntry {
    pub key: String,
    pub slot: KpiSlot,
}

/// Everything extracted from one module's fragment for one request.
///
/// Built once by the extractor and only read afterwards; entries keep the
/// order in which keys were requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleExtractionResult {
    module_id: ModuleId,
    entries: Vec<KpiEntry>,
    complete: bool,
    status: ExtractionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl ModuleExtractionResult {
    /// A successfully scanned fragment. Complete when every key is present.
    pub(crate) fn scanned(module_id: ModuleId, entries: Vec<KpiEntry>) -> Self {
        let complete = entries.iter().all(|e| e.slot.is_present());
        Self {
            module_id,
            entries,
            complete,
            status: ExtractionStatus::Ok,
            failure_reason: None,
        }
    }

    /// Empty or whitespace-only fragment.
    pub(crate) fn empty(module_id: ModuleId, keys: &[String]) -> Self {
        Self {
            module_id,
            entries: all_missing(keys),
            complete: false,
            status: ExtractionStatus::Empty,
            failure_reason: None,
        }
    }

    /// Fragment that could not be walked as markup.
    pub(crate) fn failed(module_id: ModuleId, keys: &[String], reason: String) -> Self {
        Self {
            module_id,
            entries: all_missing(keys),
            complete: false,
            status: ExtractionStatus::ExtractionFailed,
            failure_reason: Some(reason),
        }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    pub fn entries(&self) -> &[KpiEntry] {
        &self.entries
    }

    pub fn complete(&self) -> bool {
        self.complete
    }

    pub fn status(&self) -> ExtractionStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Slot for `key`. Keys that were never requested read as Missing.
    pub fn slot(&self, key: &str) -> &KpiSlot {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.slot)
            .unwrap_or(&MISSING)
    }

    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.slot.is_present()).count()
    }

    pub fn missing_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.slot.is_present())
            .map(|e| e.key.as_str())
            .collect()
    }
}

fn all_missing(keys: &[String]) -> Vec<KpiEntry> {
    keys.iter()
        .map(|k| KpiEntry {
            key: k.clone(),
            slot: KpiSlot::Missing,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_result_marks_every_key_missing() {
        let r = ModuleExtractionResult::empty(ModuleId::M3, &keys(&["supply_type", "supply_type_score"]));
        assert_eq!(r.status(), ExtractionStatus::Empty);
        assert!(!r.complete());
        assert_eq!(r.missing_keys(), vec!["supply_type", "supply_type_score"]);
        assert_eq!(r.present_count(), 0);
    }

    #[test]
    fn failed_result_keeps_reason() {
        let r = ModuleExtractionResult::failed(ModuleId::M4, &keys(&["total_units"]), "bad".into());
        assert_eq!(r.status(), ExtractionStatus::ExtractionFailed);
        assert_eq!(r.failure_reason(), Some("bad"));
    }

    #[test]
    fn unrequested_key_reads_missing() {
        let r = ModuleExtractionResult::scanned(ModuleId::M1, vec![]);
        assert_eq!(r.slot("anything"), &KpiSlot::Missing);
        assert!(r.complete());
    }

    #[test]
    fn serializes_status_tag() {
        let r = ModuleExtractionResult::empty(ModuleId::M6, &keys(&["decision"]));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "empty");
        assert_eq!(json["module_id"], "M6");
        assert_eq!(json["entries"][0]["slot"]["state"], "missing");
    }
}
