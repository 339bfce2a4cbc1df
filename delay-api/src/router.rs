use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use delay_model::DelayModel;
use health::HealthRegistry;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::predict;
use crate::prometheus::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct State {
    pub model: Arc<DelayModel>,
}

pub fn router(model: Arc<DelayModel>, liveness: HealthRegistry, config: &Config) -> Router {
    let state = State { model };

    let status_router = Router::new()
        .route("/", get(predict::index))
        .route("/health", get(predict::health))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    let predict_router = Router::new()
        .route("/predict", post(predict::predict))
        .route("/predict/", post(predict::predict))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrency));

    let router = Router::new()
        .merge(status_router)
        .merge(predict_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // A global recorder can only be installed once per process, keep it off in tests
    if *config.enable_metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
