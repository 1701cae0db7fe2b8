use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::markup::{scan_markers, Marker};
use super::types::{KpiEntry, ModuleExtractionResult};
use crate::models::{compound_shape, CanonicalValue, KpiScalar, KpiSlot, ModuleId};

/// Plain (`1234.5`) or comma-grouped (`5,600,000,000`) decimal with an
/// optional minus. Anything the number would not re-render identically
/// (`+42`, `007`) stays text.
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(?:[1-9]\d{0,2}(?:,\d{3})+|[1-9]\d*|0)(?:\.\d+)?$").expect("valid regex")
});

/// Copy the requested KPI values out of a module fragment.
///
/// Values are mirrored exactly as the module rendered them: no arithmetic, no
/// unit conversion, no rounding. A key without a marker is Missing. A fragment
/// that cannot be walked as markup yields an `extraction_failed` result rather
/// than an error.
pub fn extract<K: AsRef<str>>(
    fragment: &str,
    module_id: ModuleId,
    required_keys: &[K],
) -> ModuleExtractionResult {
    let keys = dedup_keys(required_keys);

    if fragment.trim().is_empty() {
        tracing::debug!(module_id = %module_id, requested = keys.len(), "Empty fragment");
        return ModuleExtractionResult::empty(module_id, &keys);
    }

    let markers = match scan_markers(fragment) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(
                module_id = %module_id,
                reason = %e,
                "Fragment could not be parsed; module marked extraction_failed"
            );
            return ModuleExtractionResult::failed(module_id, &keys, e.to_string());
        }
    };

    let entries: Vec<KpiEntry> = keys
        .iter()
        .map(|key| KpiEntry {
            key: key.clone(),
            slot: match authoritative_marker(&markers, key, module_id) {
                Some(marker) => slot_from_marker(marker, module_id),
                None => KpiSlot::Missing,
            },
        })
        .collect();

    let result = ModuleExtractionResult::scanned(module_id, entries);
    tracing::debug!(
        module_id = %module_id,
        requested = keys.len(),
        present = result.present_count(),
        markers = markers.len(),
        "KPI extraction finished"
    );
    result
}

/// Requested keys, trimmed, first occurrence wins.
fn dedup_keys<K: AsRef<str>>(required_keys: &[K]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(required_keys.len());
    for k in required_keys {
        let k = k.as_ref().trim();
        if !k.is_empty() && !keys.iter().any(|existing| existing == k) {
            keys.push(k.to_string());
        }
    }
    keys
}

/// The marker that speaks for `key`: the one flagged canonical, else the
/// first in document order.
fn authoritative_marker<'a>(markers: &'a [Marker], key: &str, module_id: ModuleId) -> Option<&'a Marker> {
    let candidates: Vec<&Marker> = markers.iter().filter(|m| m.key == key).collect();
    let chosen = candidates
        .iter()
        .find(|m| m.canonical)
        .or_else(|| candidates.first())
        .copied()?;

    let conflicting = candidates
        .iter()
        .filter(|m| m.text != chosen.text || m.unit != chosen.unit)
        .count();
    if conflicting > 0 {
        tracing::warn!(
            module_id = %module_id,
            key = %key,
            markers = candidates.len(),
            conflicting,
            "Conflicting duplicate KPI markers; using the authoritative one"
        );
    }

    Some(chosen)
}

fn slot_from_marker(marker: &Marker, module_id: ModuleId) -> KpiSlot {
    if marker.text.is_empty() {
        return KpiSlot::Missing;
    }
    if let Some(shape) = structural_shape(marker) {
        tracing::warn!(
            module_id = %module_id,
            key = %marker.key,
            shape,
            "Structured value in KPI marker rejected"
        );
        return KpiSlot::RejectedStructural {
            shape: shape.to_string(),
        };
    }

    KpiSlot::Present {
        value: CanonicalValue::new(
            classify(marker),
            marker.text.clone(),
            marker.unit.clone().unwrap_or_default(),
            module_id,
            marker.key.clone(),
        ),
    }
}

/// `Some(shape)` when the marker holds an object or list instead of a scalar.
fn structural_shape(marker: &Marker) -> Option<&'static str> {
    if let Some(shape) = compound_shape(&marker.text) {
        return Some(shape);
    }
    if marker.kind.as_deref() == Some("json") {
        return Some("json");
    }
    None
}

/// Decide the scalar kind. Parsing only reads the rendered digits; the
/// rendered scale survives (`7.250` keeps three fractional digits).
fn classify(marker: &Marker) -> KpiScalar {
    match marker.kind.as_deref() {
        Some("label") => return KpiScalar::Label(marker.text.clone()),
        Some("text") => return KpiScalar::Text(marker.text.clone()),
        _ => {}
    }

    parse_rendered_number(&marker.text)
        .map(KpiScalar::Number)
        .unwrap_or_else(|| KpiScalar::Text(marker.text.clone()))
}

/// Parse a rendered number such as `5,600,000,000` or `-3.40`.
pub fn parse_rendered_number(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if !NUMBER_RE.is_match(text) {
        return None;
    }
    let digits: String = text
        .chars()
        .filter(|c| *c != ',')
        .collect();
    // Exact parse only: a value too wide for Decimal stays text rather than rounding.
    Decimal::from_str_exact(&digits).ok()
}
