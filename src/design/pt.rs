//! # Potential transformer design
//!
//! Derives the conductor cross section, the wire width and the insulation
//! layering of a potential transformer. The accuracy class is kept for the
//! design sheet only.

use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

use super::{FieldCheck, SHORT_TIME_DENSITY, TransformerKind, lenient, round_to};

const INSULATION_LAYERS_ON_CORE: f64 = 3.0;
const NUMBER_OF_LAYERS: u32 = 6;

/// Raw PT form as posted by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtForm {
    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub burden: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub voltage_rating: Option<f64>,
    #[serde(default, alias = "class", deserialize_with = "lenient::text")]
    pub accuracy_class: Option<String>,
    #[serde(default, alias = "stc", deserialize_with = "lenient::number")]
    pub short_time_current: Option<f64>,
}

/// Validated PT specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtSpec {
    #[serde(rename = "type")]
    pub kind: TransformerKind,
    /// Rated burden in VA.
    pub burden: f64,
    /// System voltage in kV.
    pub voltage_rating: f64,
    pub accuracy_class: String,
    /// Short-time current in kA/sec.
    pub short_time_current: f64,
}

/// PT design sheet values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtDesign {
    /// sq. mm.
    pub cross_section_area: f64,
    /// mm.
    pub wire_width: u32,
    /// Layers of crepe paper.
    pub insulation_layers_on_core: f64,
    pub number_of_layers: u32,
}

impl TryFrom<PtForm> for PtSpec {
    type Error = ValidationErrors;

    fn try_from(form: PtForm) -> Result<Self, Self::Error> {
        let mut check = FieldCheck::default();

        let kind = check.kind(form.kind.as_deref());
        let burden = check.positive("burden", form.burden);
        let voltage_rating = check.number("voltageRating", form.voltage_rating);
        let accuracy_class = check.text("accuracyClass", form.accuracy_class);
        let short_time_current =
            check.positive("shortTimeCurrent", form.short_time_current);

        let errors = check.finish();
        match (kind, burden, voltage_rating, accuracy_class, short_time_current)
        {
            (
                Some(kind),
                Some(burden),
                Some(voltage_rating),
                Some(accuracy_class),
                Some(short_time_current),
            ) => errors.map(|_| PtSpec {
                kind,
                burden,
                voltage_rating,
                accuracy_class,
                short_time_current,
            }),
            _ => Err(errors.err().unwrap_or_default()),
        }
    }
}

/// Wire width in mm for a burden in VA. Boundaries are inclusive.
pub fn wire_width(burden: f64) -> u32 {
    if burden <= 60.0 {
        85
    } else if burden <= 90.0 {
        70
    } else {
        50
    }
}

impl PtSpec {
    /// Compute the design sheet.
    pub fn design(&self) -> PtDesign {
        let cross_section =
            (self.short_time_current * 1000.0) / SHORT_TIME_DENSITY;

        PtDesign {
            cross_section_area: round_to(cross_section + 1.0, 2),
            wire_width: wire_width(self.burden),
            insulation_layers_on_core: round_to(
                INSULATION_LAYERS_ON_CORE + 1.0,
                2,
            ),
            number_of_layers: NUMBER_OF_LAYERS,
        }
    }
}
