use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use eegnet_prep::{PipelineError, Prediction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// One raw epoch: CHANS rows of at least SAMPLES values, native units
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    pub data: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_label: String,
    pub predicted_index: usize,
    pub confidence: f32,
    pub raw_probabilities: Vec<f32>,
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload?;
    let classifier = state.classifier().ok_or(ApiError::ModelUnavailable)?;

    let worker_state = state.clone();
    let prediction = tokio::task::spawn_blocking(move || -> Result<Prediction, PipelineError> {
        let adapter = &worker_state.adapter;
        let window = adapter.window_from_rows(&request.data)?;
        let tensor = adapter.transform(window.view())?;

        let probabilities = classifier.predict(&tensor)?;
        let row = probabilities
            .rows()
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Inference("Classifier returned an empty batch".into()))?;
        Prediction::from_probabilities(row.to_vec())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Inference task failed: {}", e)))??;

    let predicted_label = state.label_for(prediction.predicted_index);
    tracing::debug!(
        "Predicted {} ({}) with confidence {:.3}",
        predicted_label,
        prediction.predicted_index,
        prediction.confidence
    );

    Ok(Json(PredictResponse {
        predicted_label,
        predicted_index: prediction.predicted_index,
        confidence: prediction.confidence,
        raw_probabilities: prediction.probabilities,
    }))
}
