use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Declaration order is the module iteration order everywhere a set of modules is walked.
str_enum!(ModuleId {
    M1 => "M1",
    M2 => "M2",
    M3 => "M3",
    M4 => "M4",
    M5 => "M5",
    M6 => "M6",
});

str_enum!(ReportType {
    AllInOne => "all_in_one",
    QuickCheck => "quick_check",
    LandownerSummary => "landowner_summary",
    TechnicalReview => "technical_review",
    FinancialFeasibility => "financial_feasibility",
    Presentation => "presentation",
});

str_enum!(ExtractionStatus {
    Ok => "ok",
    Empty => "empty",
    ExtractionFailed => "extraction_failed",
});

// How a KPI is shown when its marker carries no unit of its own.
str_enum!(KpiFormat {
    Currency => "currency",
    Units => "units",
    Percentage => "percentage",
    Area => "area",
    Score => "score",
    Plain => "plain",
});

// Section switches a report profile can turn on. Order comes from SectionKind, not from here.
str_enum!(SectionToggle {
    Cover => "cover",
    KpiSummary => "kpi_summary",
    ExecutiveSummary => "executive_summary",
    ModuleDetails => "module_details",
    FinalJudgment => "final_judgment",
    NextActions => "next_actions",
    DecisionBlock => "decision_block",
    Footer => "footer",
});

str_enum!(Density {
    Compact => "compact",
    Standard => "standard",
    Full => "full",
});

impl ModuleId {
    /// Human title used in module detail headings.
    pub fn title(&self) -> &'static str {
        match self {
            Self::M1 => "Site Facts",
            Self::M2 => "Land Valuation",
            Self::M3 => "Supply Type Selection",
            Self::M4 => "Building Capacity",
            Self::M5 => "Financial Feasibility",
            Self::M6 => "Final Review",
        }
    }
}

impl KpiFormat {
    /// Unit suffix applied by the presenter for this format.
    pub fn default_unit(&self) -> &'static str {
        match self {
            Self::Currency => crate::config::CURRENCY_UNIT,
            Self::Units => crate::config::HOUSING_UNIT,
            Self::Percentage => crate::config::PERCENT_UNIT,
            Self::Area => crate::config::AREA_UNIT,
            Self::Score => crate::config::SCORE_UNIT,
            Self::Plain => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn report_type_round_trip() {
        for rt in ReportType::ALL {
            let s = rt.as_str();
            let parsed = ReportType::from_str(s).unwrap();
            assert_eq!(*rt, parsed);
        }
    }

    #[test]
    fn unknown_report_type_rejected() {
        let err = ReportType::from_str("weekly_digest").unwrap_err();
        assert!(err.to_string().contains("weekly_digest"));
    }

    #[test]
    fn module_ids_iterate_in_declared_order() {
        let ids: Vec<&str> = ModuleId::ALL.iter().map(|m| m.as_str()).collect();
        assert_eq!(ids, ["M1", "M2", "M3", "M4", "M5", "M6"]);
        assert!(ModuleId::M2 < ModuleId::M5);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ReportType::AllInOne).unwrap();
        assert_eq!(json, "\"all_in_one\"");
        let status: ExtractionStatus = serde_json::from_str("\"extraction_failed\"").unwrap();
        assert_eq!(status, ExtractionStatus::ExtractionFailed);
    }

    #[test]
    fn format_units_come_from_config() {
        assert_eq!(KpiFormat::Currency.default_unit(), crate::config::CURRENCY_UNIT);
        assert_eq!(KpiFormat::Plain.default_unit(), "");
    }
}
