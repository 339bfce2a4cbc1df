use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use delay_model::dataset::Dataset;
use delay_model::{DelayModel, ModelError};
use eyre::{Context, Result};
use health::{HealthHandle, HealthRegistry};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::router;

/// Builds the model served by the API.
///
/// A persisted model at `MODEL_PATH` wins. Otherwise the model is trained on
/// `TRAINING_DATA_PATH` with the default options, and with neither set the
/// service starts untrained and predicts 0 for every flight.
pub fn load_model(config: &Config) -> Result<DelayModel, ModelError> {
    if !config.model_path.is_empty() {
        let model = DelayModel::load(Path::new(&config.model_path))?;
        tracing::info!(path = %config.model_path, "loaded trained model");
        return Ok(model);
    }

    if !config.training_data_path.is_empty() {
        let dataset = Dataset::from_path(Path::new(&config.training_data_path))?;
        let mut model = DelayModel::new();
        let (features, target) = model.preprocess(&dataset);
        model.fit(&features, &target)?;
        tracing::info!(
            path = %config.training_data_path,
            rows = dataset.len(),
            "trained model at startup"
        );
        return Ok(model);
    }

    tracing::warn!("neither MODEL_PATH nor TRAINING_DATA_PATH set, serving an untrained model");
    Ok(DelayModel::new())
}

pub async fn serve<F>(
    config: Config,
    model: DelayModel,
    listener: TcpListener,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let liveness = HealthRegistry::new("liveness");

    let simple_loop = liveness.register("simple_loop".to_string(), Duration::from_secs(30));
    tokio::spawn(liveness_loop(simple_loop));

    let app = router::router(Arc::new(model), liveness, &config);

    let addr = listener
        .local_addr()
        .wrap_err("could not read the listener address")?;
    tracing::info!("listening on {:?}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .wrap_err("server stopped with an error")
}

async fn liveness_loop(handle: HealthHandle) {
    loop {
        handle.report_healthy();
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delay_model::features::NUM_FEATURES;
    use delay_model::logistic::LogisticRegression;
    use ndarray::Array1;
    use tempfile::tempdir;

    const DATASET: &str = "Fecha-I,Vlo-I,Ori-I,Des-I,Emp-I,Fecha-O,Vlo-O,Ori-O,Des-O,Emp-O,DIA,MES,AÑO,DIANOM,TIPOVUELO,OPERA,SIGLAORI,SIGLADES
2017-01-01 23:30:00,226,SCEL,KMIA,AAL,2017-01-01 23:33:00,226,SCEL,KMIA,AAL,1,1,2017,Domingo,I,American Airlines,Santiago,Miami
2017-07-20 14:00:00,989P,SCEL,SCQP,LAW,2017-07-20 14:40:00,989,SCEL,SCQP,JMR,20,7,2017,Jueves,N,Latin American Wings,Santiago,Temuco
2017-07-21 09:00:00,990,SCEL,SCQP,LAW,2017-07-21 09:05:00,990,SCEL,SCQP,JMR,21,7,2017,Viernes,N,Latin American Wings,Santiago,Temuco
";

    fn saved_model() -> DelayModel {
        let mut coefficients = Array1::<f64>::zeros(NUM_FEATURES);
        coefficients[0] = 2.0;
        DelayModel::from_parameters(LogisticRegression {
            coefficients,
            intercept: -0.5,
        })
        .unwrap()
    }

    #[test]
    fn loads_the_saved_model_first() {
        let dir = tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        saved_model().save(&model_path).unwrap();

        let mut config = Config::default_test_config();
        config.model_path = model_path.display().to_string();
        // Ignored while MODEL_PATH is set
        config.training_data_path = dir.path().join("missing.csv").display().to_string();

        let model = load_model(&config).unwrap();
        assert_eq!(model.parameters(), saved_model().parameters());
    }

    #[test]
    fn trains_on_the_dataset_without_a_saved_model() {
        let dir = tempdir().unwrap();
        let data_path = dir.path().join("data.csv");
        std::fs::write(&data_path, DATASET).unwrap();

        let mut config = Config::default_test_config();
        config.training_data_path = data_path.display().to_string();

        let model = load_model(&config).unwrap();
        assert!(model.is_trained());
        assert_eq!(model.parameters().unwrap().coefficients.len(), NUM_FEATURES);
    }

    #[test]
    fn falls_back_to_an_untrained_model() {
        let model = load_model(&Config::default_test_config()).unwrap();
        assert!(!model.is_trained());
    }

    #[test]
    fn reports_unreadable_model_files() {
        let dir = tempdir().unwrap();

        let mut config = Config::default_test_config();
        config.model_path = dir.path().join("missing.json").display().to_string();
        assert!(matches!(load_model(&config), Err(ModelError::Io { .. })));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not a model").unwrap();
        config.model_path = garbage.display().to_string();
        assert!(matches!(
            load_model(&config),
            Err(ModelError::SerializationError(_))
        ));
    }

    #[test]
    fn reports_unreadable_datasets() {
        let mut config = Config::default_test_config();
        config.training_data_path = "/nonexistent/data.csv".to_string();
        assert!(matches!(load_model(&config), Err(ModelError::Io { .. })));
    }

    #[tokio::test]
    async fn serve_returns_once_shut_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = serve(
            Config::default_test_config(),
            DelayModel::new(),
            listener,
            async {},
        )
        .await;
        assert!(result.is_ok(), "{:?}", result);
    }
}
