//! Value presenter: the only path from an extracted value to display text.
//!
//! Every input is first narrowed to [`DisplayValue`]. Compound data never
//! survives that step, so nothing downstream can stringify an object or list.

use rust_decimal::Decimal;

use crate::config::{CURRENCY_UNIT, HOUSING_UNIT, PERCENT_UNIT, PLACEHOLDER, SOFT_MISSING_SENTENCE};
use crate::models::{compound_shape, KpiScalar, KpiSlot};

/// Closed set of things the presenter knows how to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayValue {
    Number(Decimal),
    Text(String),
    Missing,
    RejectedStructural,
}

impl DisplayValue {
    /// True when the value renders as the placeholder.
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Number(n) => n.is_zero(),
            Self::Text(t) => t.trim().is_empty(),
            Self::Missing | Self::RejectedStructural => true,
        }
    }
}

/// Render `value` with `unit` appended. Absent, empty, zero and compound
/// values all become [`PLACEHOLDER`].
pub fn present(value: impl Into<DisplayValue>, unit: &str) -> String {
    match value.into() {
        DisplayValue::Number(n) if n.is_zero() => PLACEHOLDER.to_string(),
        DisplayValue::Number(n) => format!("{}{unit}", group_thousands(&n)),
        DisplayValue::Text(t) if t.trim().is_empty() => PLACEHOLDER.to_string(),
        DisplayValue::Text(t) => format!("{t}{unit}"),
        DisplayValue::Missing | DisplayValue::RejectedStructural => PLACEHOLDER.to_string(),
    }
}

/// Like [`present`], but an absent value becomes a sentence explaining the
/// gap. Used for the data completeness panel.
pub fn present_soft_kpi(value: impl Into<DisplayValue>) -> String {
    let value = value.into();
    if value.is_absent() {
        SOFT_MISSING_SENTENCE.to_string()
    } else {
        present(value, "")
    }
}

pub fn format_currency(value: impl Into<DisplayValue>) -> String {
    present(value, CURRENCY_UNIT)
}

pub fn format_units(value: impl Into<DisplayValue>) -> String {
    present(value, HOUSING_UNIT)
}

pub fn format_percentage(value: impl Into<DisplayValue>) -> String {
    present(value, PERCENT_UNIT)
}

/// Comma-group the integer digits, leaving the fractional digits exactly as
/// stored ("1234.50" -> "1,234.50").
fn group_thousands(n: &Decimal) -> String {
    let plain = n.to_string();
    let (sign, digits) = match plain.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", plain.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

// ═══════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════

impl From<&KpiSlot> for DisplayValue {
    fn from(slot: &KpiSlot) -> Self {
        match slot {
            KpiSlot::Present { value } => match value.scalar() {
                KpiScalar::Number(n) => Self::Number(*n),
                KpiScalar::Text(t) | KpiScalar::Label(t) => Self::from(t.as_str()),
            },
            KpiSlot::Missing => Self::Missing,
            KpiSlot::RejectedStructural { .. } => Self::RejectedStructural,
        }
    }
}

impl From<&serde_json::Value> for DisplayValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Missing,
            Value::Bool(b) => Self::Text(b.to_string()),
            Value::Number(n) => Decimal::from_str_exact(&n.to_string())
                .map(Self::Number)
                .or_else(|_| n.as_f64().map(Self::from).ok_or(()))
                .unwrap_or(Self::Missing),
            Value::String(s) => Self::from(s.as_str()),
            Value::Array(_) | Value::Object(_) => Self::RejectedStructural,
        }
    }
}

impl<T: Into<DisplayValue>> From<Option<T>> for DisplayValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Missing)
    }
}

impl From<&str> for DisplayValue {
    fn from(text: &str) -> Self {
        if compound_shape(text).is_some() {
            Self::RejectedStructural
        } else {
            Self::Text(text.to_string())
        }
    }
}

impl From<String> for DisplayValue {
    fn from(text: String) -> Self {
        Self::from(text.as_str())
    }
}

impl From<&String> for DisplayValue {
    fn from(text: &String) -> Self {
        Self::from(text.as_str())
    }
}

impl From<Decimal> for DisplayValue {
    fn from(n: Decimal) -> Self {
        Self::Number(n)
    }
}

impl From<f64> for DisplayValue {
    fn from(n: f64) -> Self {
        Decimal::try_from(n)
            .map(|d| Self::Number(d.normalize()))
            .unwrap_or(Self::Missing)
    }
}

macro_rules! from_integer {
    ($($t:ty),+) => {
        $(impl From<$t> for DisplayValue {
            fn from(n: $t) -> Self {
                Self::Number(Decimal::from(n))
            }
        })+
    };
}

from_integer!(i32, i64, u32, u64, usize);
