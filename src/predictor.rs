//! Client of the error prediction model server.
//!
//! The model server receives the input form and the printed design sheet of
//! a transformer and answers with predicted ratio and phase errors, e.g.
//! `{"Ratio100Error120": 0.12, "Phase100Error80": 4.1}`. Values are passed
//! through untouched.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::Serialize;

use crate::design::{CtDesign, CtSpec, PtDesign, PtSpec, TransformerKind};
use crate::error::Result;

/// Named error percentages returned by the model server.
pub type Predictions = BTreeMap<String, f64>;

/// Input form, keyed the way the model server reads it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData<'a> {
    #[serde(rename = "type")]
    kind: TransformerKind,
    burden: f64,
    voltage_rating: f64,
    #[serde(rename = "class")]
    accuracy_class: &'a str,
    #[serde(rename = "stc")]
    short_time_current: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ct_ratio: Option<RatioLabel>,
}

#[derive(Debug, Serialize)]
struct RatioLabel {
    numerator: u32,
    denominator: u32,
}

/// PT design sheet lines.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PtSheet {
    cross_section: String,
    wire_length: String,
    insulation_on_core: String,
    num_of_layers: String,
}

impl From<&PtDesign> for PtSheet {
    fn from(design: &PtDesign) -> Self {
        Self {
            cross_section: format!(
                "Cross Section Area = {} sq. mm",
                design.cross_section_area
            ),
            wire_length: format!("Width of Wire = {} mm", design.wire_width),
            insulation_on_core: format!(
                "Layers on Core = {} Layers of Crepe Paper",
                design.insulation_layers_on_core
            ),
            num_of_layers: format!(
                "Number of Layers = {} Layers",
                design.number_of_layers
            ),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OutputData<'a> {
    Ct(&'a CtDesign),
    Pt(PtSheet),
}

/// Body of a `POST /predict` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload<'a> {
    form_data: FormData<'a>,
    output_data: OutputData<'a>,
}

impl<'a> Payload<'a> {
    pub fn ct(spec: &'a CtSpec, design: &'a CtDesign) -> Self {
        Self {
            form_data: FormData {
                kind: spec.kind,
                burden: spec.burden,
                voltage_rating: spec.voltage_rating,
                accuracy_class: &spec.accuracy_class,
                short_time_current: spec.short_time_current,
                ct_ratio: Some(RatioLabel {
                    numerator: spec.ct_ratio.primary,
                    denominator: spec.ct_ratio.secondary,
                }),
            },
            output_data: OutputData::Ct(design),
        }
    }

    pub fn pt(spec: &'a PtSpec, design: &PtDesign) -> Self {
        Self {
            form_data: FormData {
                kind: spec.kind,
                burden: spec.burden,
                voltage_rating: spec.voltage_rating,
                accuracy_class: &spec.accuracy_class,
                short_time_current: spec.short_time_current,
                ct_ratio: None,
            },
            output_data: OutputData::Pt(design.into()),
        }
    }
}

/// HTTP client of the model server.
#[derive(Debug, Clone)]
pub struct Predictor {
    client: Client,
    endpoint: String,
}

impl Predictor {
    /// Create a new [`Predictor`] from the server base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
        }
    }

    /// Forward a design to the model server.
    pub async fn predict(&self, payload: &Payload<'_>) -> Result<Predictions> {
        let predictions = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json::<Predictions>()
            .await?;

        tracing::debug!(count = predictions.len(), "predictions received");
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    use super::*;
    use crate::design::ct::CtRatio;
    use crate::error::ServerError;

    fn pt_spec() -> PtSpec {
        PtSpec {
            kind: TransformerKind::OilCooled,
            burden: 50.0,
            voltage_rating: 11.0,
            accuracy_class: "0.5".into(),
            short_time_current: 13.1,
        }
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}/")
    }

    #[test]
    fn test_pt_payload_labels() {
        let spec = pt_spec();
        let design = spec.design();
        let json = serde_json::to_value(Payload::pt(&spec, &design)).unwrap();

        assert_eq!(json["formData"]["type"], "Oil Cooled");
        assert_eq!(json["formData"]["class"], "0.5");
        assert_eq!(json["formData"]["stc"], 13.1);
        assert!(json["formData"].get("ctRatio").is_none());
        assert_eq!(
            json["outputData"]["crossSection"],
            "Cross Section Area = 73.78 sq. mm"
        );
        assert_eq!(json["outputData"]["wireLength"], "Width of Wire = 85 mm");
        assert_eq!(
            json["outputData"]["insulationOnCore"],
            "Layers on Core = 4 Layers of Crepe Paper"
        );
        assert_eq!(
            json["outputData"]["numOfLayers"],
            "Number of Layers = 6 Layers"
        );
    }

    #[test]
    fn test_ct_payload() {
        let spec = CtSpec {
            kind: TransformerKind::EpoxyDry,
            burden: 20.0,
            voltage_rating: 11.0,
            accuracy_class: "0.2S".into(),
            ct_ratio: CtRatio {
                primary: 100,
                secondary: 5,
            },
            short_time_current: 13.1,
        };
        let design = spec.design();
        let json = serde_json::to_value(Payload::ct(&spec, &design)).unwrap();

        assert_eq!(json["formData"]["ctRatio"]["numerator"], 100);
        assert_eq!(json["formData"]["ctRatio"]["denominator"], 5);
        assert_eq!(json["outputData"]["primaryTurns"], 3);
    }

    #[tokio::test]
    async fn test_predict_forwards_payload() {
        let router = Router::new().route(
            "/predict",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["formData"]["burden"], 50.0);
                Json(serde_json::json!({
                    "Ratio100Error120": 0.25,
                    "Phase100Error80": 4.5,
                }))
            }),
        );
        let predictor = Predictor::new(&serve(router).await);

        let spec = pt_spec();
        let design = spec.design();
        let predictions =
            predictor.predict(&Payload::pt(&spec, &design)).await.unwrap();

        assert_eq!(predictions.get("Ratio100Error120"), Some(&0.25));
        assert_eq!(predictions.get("Phase100Error80"), Some(&4.5));
    }

    #[tokio::test]
    async fn test_upstream_failure() {
        let router = Router::new().route(
            "/predict",
            post(|| async {
                (StatusCode::BAD_REQUEST, "{\"error\": \"Invalid input data\"}")
            }),
        );
        let predictor = Predictor::new(&serve(router).await);

        let spec = pt_spec();
        let design = spec.design();
        assert!(matches!(
            predictor.predict(&Payload::pt(&spec, &design)).await,
            Err(ServerError::Upstream(_))
        ));
    }
}
