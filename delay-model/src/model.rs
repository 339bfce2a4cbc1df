use std::fs;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::dataset::Dataset;
use crate::error::ModelError;
use crate::features::{encode, FeatureMatrix, FlightFeatures, FEATURE_COLUMNS, NUM_FEATURES};
use crate::logistic::{LogisticRegression, TrainingOptions};

/// On-disk representation. The column list guards against loading weights
/// trained on a different encoding.
#[derive(Debug, Serialize, Deserialize)]
struct SavedModel {
    feature_columns: Vec<String>,
    model: LogisticRegression,
}

/// Flight delay classifier. Until it is fitted or loaded, every flight is
/// predicted as on time.
#[derive(Debug, Clone, Default)]
pub struct DelayModel {
    model: Option<LogisticRegression>,
}

impl DelayModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps fitted parameters, which must carry one coefficient per feature column.
    pub fn from_parameters(model: LogisticRegression) -> Result<Self, ModelError> {
        if model.coefficients.len() != NUM_FEATURES {
            return Err(ModelError::DimensionMismatch {
                expected: NUM_FEATURES,
                found: model.coefficients.len(),
            });
        }
        Ok(DelayModel { model: Some(model) })
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn parameters(&self) -> Option<&LogisticRegression> {
        self.model.as_ref()
    }

    /// Encoded features and delay target of a labeled dataset.
    pub fn preprocess(&self, dataset: &Dataset) -> (FeatureMatrix, Vec<u8>) {
        (encode(&dataset.features()), dataset.target())
    }

    pub fn preprocess_features(&self, flights: &[FlightFeatures]) -> FeatureMatrix {
        encode(flights)
    }

    pub fn fit(&mut self, features: &FeatureMatrix, target: &[u8]) -> Result<(), ModelError> {
        self.fit_with(features, target, &TrainingOptions::default())
    }

    #[instrument(skip_all, fields(rows = features.nrows()))]
    pub fn fit_with(
        &mut self,
        features: &FeatureMatrix,
        target: &[u8],
        options: &TrainingOptions,
    ) -> Result<(), ModelError> {
        let model = LogisticRegression::fit(features.view(), target, options)?;
        tracing::info!(
            coefficients = ?model.coefficients,
            intercept = model.intercept,
            "trained delay model"
        );
        self.model = Some(model);
        Ok(())
    }

    /// 1 for a predicted delay, 0 otherwise, one entry per row.
    pub fn predict(&self, features: &FeatureMatrix) -> Vec<u8> {
        match &self.model {
            Some(model) => model.predict(features.view()),
            None => vec![0; features.nrows()],
        }
    }

    /// Delay probability per row, None until the model is trained.
    pub fn predict_proba(&self, features: &FeatureMatrix) -> Option<Array1<f64>> {
        let model = self.model.as_ref()?;
        Some(model.predict_proba(features.view()))
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        let model = self.model.clone().ok_or(ModelError::NotTrained)?;
        let saved = SavedModel {
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            model,
        };
        Ok(serde_json::to_string_pretty(&saved)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let json = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let saved: SavedModel = serde_json::from_str(&json)?;

        if saved
            .feature_columns
            .iter()
            .map(String::as_str)
            .ne(FEATURE_COLUMNS.iter().copied())
        {
            return Err(ModelError::IncompatibleColumns {
                path: path.to_path_buf(),
            });
        }

        DelayModel::from_parameters(saved.model)
    }
}
