// prometheus exporter setup

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::IntoResponse;
use metrics::counter;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub const PREDICTIONS_TOTAL: &str = "delay_api_predictions_total";
pub const PREDICTION_ERRORS_TOTAL: &str = "delay_api_prediction_errors_total";

pub fn report_predictions(predictions: &[u8]) {
    let delayed = predictions.iter().filter(|p| **p == 1).count() as u64;
    let on_time = predictions.len() as u64 - delayed;
    counter!(PREDICTIONS_TOTAL, "label" => "delayed").increment(delayed);
    counter!(PREDICTIONS_TOTAL, "label" => "on_time").increment(on_time);
}

pub fn report_rejected_request(reason: &'static str) {
    counter!(PREDICTION_ERRORS_TOTAL, "reason" => reason).increment(1);
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
    ];
    const BATCH_SIZES: &[f64] = &[1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )
        .expect("invalid latency buckets")
        .set_buckets_for_metric(Matcher::Suffix("_batch_size".to_string()), BATCH_SIZES)
        .expect("invalid batch size buckets")
        .install_recorder()
        .expect("failed to install the prometheus recorder")
}

/// Records request count and latency per route, method and status.
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}
