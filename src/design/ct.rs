//! # Current transformer design
//!
//! Sizes the toroidal core, the primary and secondary windings and the
//! insulation of a ring-type current transformer.
//!
//! ## Example
//!
//! ```rust
//! use transformer_designer::design::ct::{CtRatio, CtSpec};
//! use transformer_designer::design::TransformerKind;
//!
//! let spec = CtSpec {
//!     kind: TransformerKind::OilCooled,
//!     burden: 20.0,
//!     voltage_rating: 11.0,
//!     accuracy_class: "0.2S".to_string(),
//!     ct_ratio: CtRatio { primary: 100, secondary: 5 },
//!     short_time_current: 13.1,
//! };
//! let design = spec.design();
//! assert_eq!(design.primary_turns, 3);
//! assert_eq!(design.insulation_layers_on_primary, 15.0);
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

use super::{FieldCheck, SHORT_TIME_DENSITY, TransformerKind, lenient, round_to};

const FREQUENCY: f64 = 50.0;
const SECONDARY_TURNS: u32 = 60;
const CORE_CURRENT_DENSITY: f64 = 1.0;
const COPPER_CURRENT_DENSITY: f64 = 1.65;
/// Insulation wrapped around the primary conductor, in mm.
const INSULATION_BASE_THICKNESS: f64 = 40.0;
/// Core height, in mm.
const CORE_HEIGHT: f64 = 30.0;
const INSULATION_LAYERS_ON_CORE: f64 = 3.0;
/// Primary conductor length per primary/secondary ampere ratio, in cm.
const PRIMARY_LENGTH_FACTOR: f64 = 15.0;

/// Raw CT form as posted by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtForm {
    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub burden: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub voltage_rating: Option<f64>,
    #[serde(default, alias = "class", deserialize_with = "lenient::text")]
    pub accuracy_class: Option<String>,
    #[serde(default)]
    pub ct_ratio: Option<CtRatioForm>,
    #[serde(default, alias = "stc", deserialize_with = "lenient::number")]
    pub short_time_current: Option<f64>,
}

/// Raw `primary:secondary` ratio.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtRatioForm {
    #[serde(default, alias = "numerator", deserialize_with = "lenient::number")]
    pub primary: Option<f64>,
    #[serde(
        default,
        alias = "denominator",
        deserialize_with = "lenient::number"
    )]
    pub secondary: Option<f64>,
}

/// Rated primary and secondary currents, e.g. 100:5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtRatio {
    pub primary: u32,
    pub secondary: u32,
}

/// Validated CT specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtSpec {
    #[serde(rename = "type")]
    pub kind: TransformerKind,
    /// Rated burden in VA.
    pub burden: f64,
    /// System voltage in kV.
    pub voltage_rating: f64,
    pub accuracy_class: String,
    pub ct_ratio: CtRatio,
    /// Short-time current in kA/sec.
    pub short_time_current: f64,
}

/// CT design sheet values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtDesign {
    /// mm.
    pub core_outer_diameter: f64,
    /// mm.
    pub core_inner_diameter: f64,
    /// mm.
    pub core_height: f64,
    /// Layers of crepe paper.
    pub insulation_layers_on_core: f64,
    /// sq. mm.
    pub primary_cross_section: f64,
    /// sq. mm.
    pub secondary_cross_section: f64,
    pub primary_turns: u32,
    pub secondary_turns: u32,
    /// m.
    pub primary_length: f64,
    /// Layers on the primary conductor, `0` when the voltage rating has no
    /// tabulated value.
    pub insulation_layers_on_primary: f64,
}

impl TryFrom<CtForm> for CtSpec {
    type Error = ValidationErrors;

    fn try_from(form: CtForm) -> Result<Self, Self::Error> {
        let mut check = FieldCheck::default();
        let ratio = form.ct_ratio.unwrap_or_default();

        let kind = check.kind(form.kind.as_deref());
        let burden = check.positive("burden", form.burden);
        let voltage_rating = check.number("voltageRating", form.voltage_rating);
        let accuracy_class = check.text("accuracyClass", form.accuracy_class);
        let primary = check.count("ctRatio.primary", ratio.primary);
        let secondary = check.count("ctRatio.secondary", ratio.secondary);
        let short_time_current =
            check.positive("shortTimeCurrent", form.short_time_current);

        let errors = check.finish();
        match (
            kind,
            burden,
            voltage_rating,
            accuracy_class,
            primary,
            secondary,
            short_time_current,
        ) {
            (
                Some(kind),
                Some(burden),
                Some(voltage_rating),
                Some(accuracy_class),
                Some(primary),
                Some(secondary),
                Some(short_time_current),
            ) => errors.map(|_| CtSpec {
                kind,
                burden,
                voltage_rating,
                accuracy_class,
                ct_ratio: CtRatio { primary, secondary },
                short_time_current,
            }),
            _ => Err(errors.err().unwrap_or_default()),
        }
    }
}

/// Crepe paper layers on the primary conductor for a system voltage.
pub fn primary_insulation_layers(voltage_rating: f64) -> Option<f64> {
    [(11.0, 15.0), (22.0, 30.0), (33.0, 40.0)]
        .into_iter()
        .find(|(kv, _)| *kv == voltage_rating)
        .map(|(_, layers)| layers)
}

impl CtSpec {
    /// Compute the design sheet.
    pub fn design(&self) -> CtDesign {
        let primary = f64::from(self.ct_ratio.primary);
        let secondary = f64::from(self.ct_ratio.secondary);

        let volt_amp_per_secondary_amp = self.burden / secondary;
        let core_area = (4.44
            * FREQUENCY
            * f64::from(SECONDARY_TURNS)
            * CORE_CURRENT_DENSITY)
            / volt_amp_per_secondary_amp;
        let primary_turns =
            (secondary * f64::from(SECONDARY_TURNS) / primary).round();

        let conductor_cross_section =
            (self.short_time_current * 1000.0) / SHORT_TIME_DENSITY;
        let conductor_diameter = (conductor_cross_section * 4.0 / PI).sqrt();
        let core_inner_diameter =
            INSULATION_BASE_THICKNESS + conductor_diameter;
        let core_outer_diameter =
            (2.0 * core_area / CORE_HEIGHT) + core_inner_diameter;

        let primary_cross_section = primary / COPPER_CURRENT_DENSITY;
        let secondary_cross_section = secondary / COPPER_CURRENT_DENSITY;

        // Computed in mm then expressed in m.
        let primary_length_mm =
            PRIMARY_LENGTH_FACTOR * primary / secondary * 1000.0 / 100.0;

        let insulation_layers_on_primary =
            primary_insulation_layers(self.voltage_rating).unwrap_or(0.0);
        if insulation_layers_on_primary == 0.0 {
            tracing::debug!(
                voltage_rating = self.voltage_rating,
                "no primary insulation tabulated for voltage rating"
            );
        }

        CtDesign {
            core_outer_diameter: core_outer_diameter.ceil(),
            core_inner_diameter: core_inner_diameter.ceil(),
            core_height: CORE_HEIGHT.ceil(),
            insulation_layers_on_core: round_to(
                INSULATION_LAYERS_ON_CORE + 1.0,
                2,
            ),
            primary_cross_section: round_to(primary_cross_section, 2),
            // Printed sheets carry the ×100 scaled figure, three decimals.
            secondary_cross_section: round_to(
                round_to(secondary_cross_section * 100.0, 1) / 100.0,
                3,
            ),
            primary_turns: primary_turns as u32,
            secondary_turns: SECONDARY_TURNS,
            primary_length: round_to(primary_length_mm / 1000.0, 2),
            insulation_layers_on_primary: round_to(
                insulation_layers_on_primary,
                2,
            ),
        }
    }
}
