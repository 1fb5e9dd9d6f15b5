//! Calculator and prediction routes.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::design::{CtDesign, CtForm, CtSpec, PtDesign, PtForm, PtSpec};
use crate::error::{Result, ServerError};
use crate::predictor::{Payload, Predictions, Predictor};

/// Validated input echoed next to the computed sheet.
#[derive(Debug, Serialize)]
pub struct DesignSheet<I, O> {
    pub input: I,
    pub output: O,
}

/// Handler of `POST /design/ct`.
pub async fn ct(
    Json(form): Json<CtForm>,
) -> Result<Json<DesignSheet<CtSpec, CtDesign>>> {
    let spec = CtSpec::try_from(form)?;
    let output = spec.design();

    Ok(Json(DesignSheet {
        input: spec,
        output,
    }))
}

/// Handler of `POST /design/pt`.
pub async fn pt(
    Json(form): Json<PtForm>,
) -> Result<Json<DesignSheet<PtSpec, PtDesign>>> {
    let spec = PtSpec::try_from(form)?;
    let output = spec.design();

    Ok(Json(DesignSheet {
        input: spec,
        output,
    }))
}

fn predictor(state: &AppState) -> Result<&Predictor> {
    state.predictor.as_ref().ok_or(ServerError::PredictorDisabled)
}

/// Handler of `POST /predict/ct`.
pub async fn predict_ct(
    State(state): State<AppState>,
    Json(form): Json<CtForm>,
) -> Result<Json<Predictions>> {
    let spec = CtSpec::try_from(form)?;
    let design = spec.design();

    Ok(Json(
        predictor(&state)?
            .predict(&Payload::ct(&spec, &design))
            .await?,
    ))
}

/// Handler of `POST /predict/pt`.
pub async fn predict_pt(
    State(state): State<AppState>,
    Json(form): Json<PtForm>,
) -> Result<Json<Predictions>> {
    let spec = PtSpec::try_from(form)?;
    let design = spec.design();

    Ok(Json(
        predictor(&state)?
            .predict(&Payload::pt(&spec, &design))
            .await?,
    ))
}
