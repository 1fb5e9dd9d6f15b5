//! # Transformer design calculations
//!
//! Each calculator follows the same shape:
//!
//! - `*Form` - raw request body, every field optional and leniently parsed
//!   (numbers may arrive as JSON numbers or numeric strings).
//! - `*Spec` - validated input, obtained with `TryFrom<*Form>`. Conversion
//!   reports every missing or malformed field at once.
//! - `*Design` - derived output of `*Spec::design`, a pure function.
//!
//! ## Available calculators
//!
//! - [`ct`] - current transformer core, winding and insulation sizing.
//! - [`pt`] - potential transformer wire and insulation sizing.

pub mod ct;
pub mod pt;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use validator::{ValidationError, ValidationErrors};

pub use ct::{CtDesign, CtForm, CtSpec};
pub use pt::{PtDesign, PtForm, PtSpec};

/// Short-circuit current density of the conductor, in A/mm² per kA/sec.
pub(crate) const SHORT_TIME_DENSITY: f64 = 180.0;

/// Cooling and insulation technology of a transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformerKind {
    #[serde(rename = "Oil Cooled", alias = "OilCooled")]
    OilCooled,
    #[serde(rename = "Epoxy/Dry", alias = "EpoxyDry")]
    EpoxyDry,
}

impl fmt::Display for TransformerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformerKind::OilCooled => write!(f, "Oil Cooled"),
            TransformerKind::EpoxyDry => write!(f, "Epoxy/Dry"),
        }
    }
}

impl FromStr for TransformerKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Oil Cooled" | "OilCooled" => Ok(TransformerKind::OilCooled),
            "Epoxy/Dry" | "EpoxyDry" => Ok(TransformerKind::EpoxyDry),
            _ => Err(()),
        }
    }
}

/// Round half away from zero to `decimals` places, nudged by one ULP so
/// that values such as `1.005` land on the upper neighbour.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    ((value + f64::EPSILON) * factor).round() / factor
}

/// Lenient field parsers for HTML-form style payloads.
pub(crate) mod lenient {
    use super::*;

    /// Accept a JSON number or a numeric string. Anything else, including
    /// non-finite values, becomes `None`.
    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let number = match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(number.filter(|n| n.is_finite()))
    }

    /// Accept a string or a number, rendered as text. Blank becomes `None`.
    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let text = match value {
            serde_json::Value::String(s) => Some(s.trim().to_owned()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        Ok(text.filter(|s| !s.is_empty()))
    }
}

fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

/// Collects field errors while converting a form into a spec.
#[derive(Debug, Default)]
pub(crate) struct FieldCheck {
    errors: ValidationErrors,
}

impl FieldCheck {
    pub fn kind(&mut self, value: Option<&str>) -> Option<TransformerKind> {
        match value.map(TransformerKind::from_str) {
            Some(Ok(kind)) => Some(kind),
            Some(Err(())) => {
                self.errors.add(
                    "type",
                    field_error(
                        "invalid_type",
                        "Type must be \"Oil Cooled\" or \"Epoxy/Dry\".",
                    ),
                );
                None
            },
            None => {
                self.errors
                    .add("type", field_error("required", "Type is required."));
                None
            },
        }
    }

    /// Strictly positive real number.
    pub fn positive(
        &mut self,
        field: &'static str,
        value: Option<f64>,
    ) -> Option<f64> {
        match value {
            Some(v) if v > 0.0 => Some(v),
            Some(_) => {
                self.errors.add(
                    field,
                    field_error("range", "Value must be greater than zero."),
                );
                None
            },
            None => {
                self.errors.add(
                    field,
                    field_error("required", "A numeric value is required."),
                );
                None
            },
        }
    }

    /// Any finite number.
    pub fn number(
        &mut self,
        field: &'static str,
        value: Option<f64>,
    ) -> Option<f64> {
        if value.is_none() {
            self.errors.add(
                field,
                field_error("required", "A numeric value is required."),
            );
        }
        value
    }

    /// Strictly positive whole number.
    pub fn count(
        &mut self,
        field: &'static str,
        value: Option<f64>,
    ) -> Option<u32> {
        let value = self.positive(field, value)?;
        if value.fract() != 0.0 || value > f64::from(u32::MAX) {
            self.errors.add(
                field,
                field_error("integer", "Value must be a whole number."),
            );
            return None;
        }
        Some(value as u32)
    }

    pub fn text(
        &mut self,
        field: &'static str,
        value: Option<String>,
    ) -> Option<String> {
        if value.is_none() {
            self.errors
                .add(field, field_error("required", "A value is required."));
        }
        value
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}
