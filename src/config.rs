use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Siteproof";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var holding a path to a KPI schema file that replaces the embedded one.
pub const SCHEMA_PATH_ENV: &str = "SITEPROOF_KPI_SCHEMA";

/// Embedded default KPI schema.
pub const DEFAULT_SCHEMA_JSON: &str = include_str!("../config/kpi_schema.json");

/// Shown wherever a value is absent, zero, empty or structurally unusable.
pub const PLACEHOLDER: &str = "Pending";

/// Sentence used in the data completeness panel for a soft-missing KPI.
pub const SOFT_MISSING_SENTENCE: &str =
    "This figure was not supplied by the upstream analysis and should be confirmed before relying on it.";

pub const CURRENCY_UNIT: &str = "원";
pub const HOUSING_UNIT: &str = "세대";
pub const PERCENT_UNIT: &str = "%";
pub const AREA_UNIT: &str = "㎡";
pub const SCORE_UNIT: &str = "점";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "siteproof=debug,info"
    } else {
        "siteproof=info,warn"
    }
}

/// Debug builds log more verbosely.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Schema file override from the environment, if set and non-empty.
pub fn schema_override_path() -> Option<PathBuf> {
    std::env::var(SCHEMA_PATH_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_is_siteproof() {
        assert_eq!(APP_NAME, "Siteproof");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.6.0");
    }

    #[test]
    fn embedded_schema_is_json() {
        let parsed: serde_json::Value = serde_json::from_str(DEFAULT_SCHEMA_JSON).unwrap();
        assert!(parsed.get("report_types").is_some());
    }

    #[test]
    fn log_filter_targets_crate() {
        assert!(default_log_filter().starts_with("siteproof="));
    }
}
