use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::ModuleId;

/// Fully qualified KPI name, rendered and serialized as `M3.supply_type`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KpiRef {
    pub module: ModuleId,
    pub key: String,
}

impl KpiRef {
    pub fn new(module: ModuleId, key: impl Into<String>) -> Self {
        Self {
            module,
            key: key.into(),
        }
    }
}

impl std::fmt::Display for KpiRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.key)
    }
}

impl std::str::FromStr for KpiRef {
    type Err = super::ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, key) = s
            .split_once('.')
            .ok_or_else(|| super::ModelError::InvalidKpiRef(s.into()))?;
        if key.trim().is_empty() {
            return Err(super::ModelError::InvalidKpiRef(s.into()));
        }
        Ok(Self {
            module: module.parse()?,
            key: key.to_string(),
        })
    }
}

impl Serialize for KpiRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KpiRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The scalar a module rendered. Numbers are exact decimals with the
/// rendered scale preserved ("7.250" stays three fractional digits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum KpiScalar {
    Number(Decimal),
    Text(String),
    /// Enumerated label such as a review decision.
    Label(String),
}

/// `Some("object")` or `Some("array")` when `text` parses as a JSON object or
/// list. Bracketed labels that are not JSON (`[A+]`) are scalars.
pub fn compound_shape(text: &str) -> Option<&'static str> {
    let t = text.trim();
    if !(t.starts_with('{') || t.starts_with('[')) {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(t).ok()? {
        serde_json::Value::Object(_) => Some("object"),
        serde_json::Value::Array(_) => Some("array"),
        _ => None,
    }
}

/// Where a value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub module_id: ModuleId,
    pub key: String,
}

/// A single authoritative value copied out of a module fragment.
///
/// Fields are private: a canonical value is never edited after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalValue {
    scalar: KpiScalar,
    raw: String,
    unit: String,
    provenance: Provenance,
}

impl CanonicalValue {
    pub fn new(
        scalar: KpiScalar,
        raw: impl Into<String>,
        unit: impl Into<String>,
        module_id: ModuleId,
        key: impl Into<String>,
    ) -> Self {
        Self {
            scalar,
            raw: raw.into(),
            unit: unit.into(),
            provenance: Provenance {
                module_id,
                key: key.into(),
            },
        }
    }

    pub fn scalar(&self) -> &KpiScalar {
        &self.scalar
    }

    /// The marker text exactly as the module displayed it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match &self.scalar {
            KpiScalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match &self.scalar {
            KpiScalar::Label(l) => Some(l),
            _ => None,
        }
    }
}

/// Extraction outcome for one requested key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KpiSlot {
    Present { value: CanonicalValue },
    Missing,
    /// The marker held an object or list. Never shown, never counted as present.
    RejectedStructural { shape: String },
}

impl KpiSlot {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    pub fn value(&self) -> Option<&CanonicalValue> {
        match self {
            Self::Present { value } => Some(value),
            _ => None,
        }
    }
}
