use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use delay_model::features::FlightFeatures;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

pub const FLIGHT_TYPES: [&str; 2] = ["I", "N"];

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("the 'flights' field must be a list")]
    FlightsNotAList,
    #[error("request holds no flights to predict")]
    EmptyBatch,
    #[error("flight {index}: {reason}")]
    InvalidFlight { index: usize, reason: String },
    #[error("flight {index}: TIPOVUELO must be \"I\" or \"N\", got {value:?}")]
    InvalidFlightType { index: usize, value: String },
    #[error("flight {index}: MES must be an integer, got {value}")]
    MonthNotAnInteger { index: usize, value: String },
    #[error("flight {index}: MES must be between 1 and 12, got {value}")]
    InvalidMonth { index: usize, value: i64 },
}

impl PredictError {
    /// Short label for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            PredictError::RequestDecodingError(_) => "decoding",
            PredictError::RequestParsingError(_) => "parsing",
            PredictError::NotAnObject | PredictError::FlightsNotAList => "shape",
            PredictError::EmptyBatch => "empty_batch",
            PredictError::InvalidFlight { .. } => "invalid_flight",
            PredictError::InvalidFlightType { .. } => "invalid_flight_type",
            PredictError::MonthNotAnInteger { .. } | PredictError::InvalidMonth { .. } => {
                "invalid_month"
            }
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        // Every variant is a client error: the model itself cannot fail on validated input.
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

/// MES as sent by clients. Integers, floats, numeric strings and booleans
/// are all accepted and coerced to an integer month.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MonthValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Flag(bool),
}

impl MonthValue {
    /// Floats are truncated toward zero, strings must hold a whole integer.
    fn to_integer(&self) -> Option<i64> {
        match self {
            MonthValue::Integer(value) => Some(*value),
            MonthValue::Float(value) if value.is_finite() => Some(value.trunc() as i64),
            MonthValue::Float(_) => None,
            MonthValue::Text(value) => value.trim().parse().ok(),
            MonthValue::Flag(value) => Some(i64::from(*value)),
        }
    }
}

impl std::fmt::Display for MonthValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonthValue::Integer(value) => write!(f, "{value}"),
            MonthValue::Float(value) => write!(f, "{value}"),
            MonthValue::Text(value) => write!(f, "{value:?}"),
            MonthValue::Flag(value) => write!(f, "{value}"),
        }
    }
}

/// One flight as sent by clients.
#[derive(Debug, Deserialize)]
struct FlightData {
    #[serde(rename = "OPERA")]
    opera: String,
    #[serde(rename = "TIPOVUELO")]
    tipo_vuelo: String,
    #[serde(rename = "MES")]
    mes: MonthValue,
}

impl FlightData {
    fn validate(self, index: usize) -> Result<FlightFeatures, PredictError> {
        if !FLIGHT_TYPES.contains(&self.tipo_vuelo.as_str()) {
            return Err(PredictError::InvalidFlightType {
                index,
                value: self.tipo_vuelo,
            });
        }
        let Some(month) = self.mes.to_integer() else {
            return Err(PredictError::MonthNotAnInteger {
                index,
                value: self.mes.to_string(),
            });
        };
        let mes = match u32::try_from(month) {
            Ok(mes @ 1..=12) => mes,
            _ => {
                return Err(PredictError::InvalidMonth {
                    index,
                    value: month,
                })
            }
        };
        Ok(FlightFeatures {
            opera: self.opera,
            tipo_vuelo: self.tipo_vuelo,
            mes,
        })
    }
}

pub struct PredictRequest;

impl PredictRequest {
    /// Decodes a `{"flights": [...]}` body into validated flights.
    /// A missing or empty `flights` list is rejected.
    #[instrument(skip_all)]
    pub fn from_bytes(bytes: Bytes) -> Result<Vec<FlightFeatures>, PredictError> {
        tracing::debug!(len = bytes.len(), "decoding new request");
        let payload = String::from_utf8(bytes.into()).map_err(|e| {
            tracing::error!("failed to decode body: {}", e);
            PredictError::RequestDecodingError(String::from("invalid body encoding"))
        })?;

        let body: Value = serde_json::from_str(&payload)?;
        let Value::Object(mut body) = body else {
            return Err(PredictError::NotAnObject);
        };

        let flights = match body.remove("flights") {
            None => return Err(PredictError::EmptyBatch),
            Some(Value::Array(flights)) => flights,
            Some(_) => return Err(PredictError::FlightsNotAList),
        };
        if flights.is_empty() {
            return Err(PredictError::EmptyBatch);
        }

        flights
            .into_iter()
            .enumerate()
            .map(|(index, flight)| {
                serde_json::from_value::<FlightData>(flight)
                    .map_err(|e| PredictError::InvalidFlight {
                        index,
                        reason: e.to_string(),
                    })?
                    .validate(index)
            })
            .collect()
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predict: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
