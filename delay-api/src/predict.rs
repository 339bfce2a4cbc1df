use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use metrics::histogram;
use tracing::instrument;

use crate::api::{HealthResponse, PredictError, PredictRequest, PredictResponse};
use crate::prometheus::{report_predictions, report_rejected_request};
use crate::router;

pub async fn index() -> &'static str {
    "delay-api"
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

#[instrument(skip_all, fields(batch_size))]
pub async fn predict(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<PredictResponse>, PredictError> {
    let flights = PredictRequest::from_bytes(body).map_err(|err| {
        report_rejected_request(err.reason());
        tracing::warn!("rejected invalid payload: {}", err);
        err
    })?;

    tracing::Span::current().record("batch_size", flights.len());
    histogram!("delay_api_predict_batch_size").record(flights.len() as f64);

    let features = state.model.preprocess_features(&flights);
    let predictions = state.model.predict(&features);
    report_predictions(&predictions);

    tracing::debug!(?flights, ?predictions, "predicted batch");

    Ok(Json(PredictResponse {
        predict: predictions,
    }))
}
