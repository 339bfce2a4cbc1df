use chrono::{Datelike, NaiveDateTime, Timelike};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A flight operated more than this many minutes after schedule counts as delayed.
pub const DELAY_THRESHOLD_MINUTES: f64 = 15.0;

pub const NUM_FEATURES: usize = 10;

/// Columns of the encoded feature matrix, in order. Only the one-hot columns
/// that carry signal for the classifier are kept.
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "OPERA_Latin American Wings",
    "MES_7",
    "MES_10",
    "OPERA_Grupo LATAM",
    "MES_12",
    "TIPOVUELO_I",
    "MES_4",
    "MES_11",
    "OPERA_Sky Airline",
    "OPERA_Copa Air",
];

/// One row per flight, one column per entry of `FEATURE_COLUMNS`.
pub type FeatureMatrix = Array2<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodDay {
    Morning,
    Afternoon,
    Night,
}

/// Categorical inputs consumed by the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightFeatures {
    #[serde(rename = "OPERA")]
    pub opera: String,
    #[serde(rename = "TIPOVUELO")]
    pub tipo_vuelo: String,
    #[serde(rename = "MES")]
    pub mes: u32,
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, ModelError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|source| {
        ModelError::InvalidTimestamp {
            value: value.to_string(),
            source,
        }
    })
}

const fn seconds(hours: u32, minutes: u32) -> u32 {
    hours * 3600 + minutes * 60
}

/// Night also covers the early morning, before 05:00.
pub fn period_day(timestamp: &NaiveDateTime) -> PeriodDay {
    let time = timestamp.time().num_seconds_from_midnight();
    if (seconds(5, 0)..=seconds(11, 59)).contains(&time) {
        PeriodDay::Morning
    } else if (seconds(12, 0)..=seconds(18, 59)).contains(&time) {
        PeriodDay::Afternoon
    } else {
        PeriodDay::Night
    }
}

// (month, day) bounds, both taken at midnight.
const HIGH_SEASON: [((u32, u32), (u32, u32)); 4] = [
    ((12, 15), (12, 31)),
    ((1, 1), (3, 3)),
    ((7, 15), (7, 31)),
    ((9, 11), (9, 30)),
];

/// The upper bound of each range is midnight at the start of its last day,
/// so only the very first second of that day is in season.
pub fn is_high_season(timestamp: &NaiveDateTime) -> bool {
    let day = (timestamp.month(), timestamp.day());
    let at_midnight = timestamp.time().num_seconds_from_midnight() == 0
        && timestamp.time().nanosecond() == 0;

    HIGH_SEASON
        .iter()
        .any(|(start, end)| day >= *start && (day < *end || (day == *end && at_midnight)))
}

/// Minutes between the scheduled and the operated departure.
pub fn min_diff(scheduled: &NaiveDateTime, operated: &NaiveDateTime) -> f64 {
    let delta = operated.signed_duration_since(*scheduled);
    delta.num_milliseconds() as f64 / 60_000.0
}

pub fn is_delayed(min_diff: f64) -> bool {
    min_diff > DELAY_THRESHOLD_MINUTES
}

pub fn column_index(name: &str) -> Option<usize> {
    FEATURE_COLUMNS.iter().position(|column| *column == name)
}

fn hot_columns(flight: &FlightFeatures) -> impl Iterator<Item = usize> {
    [
        format!("OPERA_{}", flight.opera),
        format!("TIPOVUELO_{}", flight.tipo_vuelo),
        format!("MES_{}", flight.mes),
    ]
    .into_iter()
    .filter_map(|column| column_index(&column))
}

/// One-hot encodes a single flight. Categories without a column are dropped.
pub fn encode_one(flight: &FlightFeatures) -> Array1<f64> {
    let mut row = Array1::<f64>::zeros(NUM_FEATURES);
    for index in hot_columns(flight) {
        row[index] = 1.0;
    }
    row
}

pub fn encode(flights: &[FlightFeatures]) -> FeatureMatrix {
    let mut matrix = Array2::<f64>::zeros((flights.len(), NUM_FEATURES));
    for (mut row, flight) in matrix.rows_mut().into_iter().zip(flights) {
        for index in hot_columns(flight) {
            row[index] = 1.0;
        }
    }
    matrix
}
