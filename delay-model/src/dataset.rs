use std::fs::File;
use std::io::Read;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ModelError;
use crate::features::{
    is_delayed, is_high_season, min_diff, parse_timestamp, period_day, FlightFeatures, PeriodDay,
};

/// One row of the historical flights dataset. `-I` columns describe the
/// scheduled flight, `-O` columns the operated one.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlightRecord {
    #[serde(rename = "Fecha-I")]
    pub scheduled_at: String,
    #[serde(rename = "Vlo-I")]
    pub scheduled_flight: String,
    #[serde(rename = "Ori-I")]
    pub scheduled_origin: String,
    #[serde(rename = "Des-I")]
    pub scheduled_destination: String,
    #[serde(rename = "Emp-I")]
    pub scheduled_airline: String,
    #[serde(rename = "Fecha-O")]
    pub operated_at: String,
    #[serde(rename = "Vlo-O")]
    pub operated_flight: String,
    #[serde(rename = "Ori-O")]
    pub operated_origin: String,
    #[serde(rename = "Des-O")]
    pub operated_destination: String,
    #[serde(rename = "Emp-O")]
    pub operated_airline: String,
    #[serde(rename = "DIA")]
    pub day: u32,
    #[serde(rename = "MES")]
    pub month: u32,
    #[serde(rename = "AÑO")]
    pub year: i32,
    #[serde(rename = "DIANOM")]
    pub day_name: String,
    #[serde(rename = "TIPOVUELO")]
    pub flight_type: String,
    #[serde(rename = "OPERA")]
    pub operator: String,
    #[serde(rename = "SIGLAORI")]
    pub origin_name: String,
    #[serde(rename = "SIGLADES")]
    pub destination_name: String,
    /// Present when the dataset was labeled upstream.
    #[serde(default)]
    pub delay: Option<u8>,
}

/// A record with its derived columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledFlight {
    pub record: FlightRecord,
    pub period_day: PeriodDay,
    pub high_season: bool,
    pub min_diff: f64,
    pub delay: u8,
}

impl LabeledFlight {
    pub fn from_record(record: FlightRecord) -> Result<Self, ModelError> {
        let scheduled = parse_timestamp(&record.scheduled_at)?;
        let operated = parse_timestamp(&record.operated_at)?;
        let min_diff = min_diff(&scheduled, &operated);

        let delay = match record.delay {
            Some(delay @ (0 | 1)) => delay,
            Some(other) => return Err(ModelError::InvalidTarget(other)),
            None => u8::from(is_delayed(min_diff)),
        };

        Ok(LabeledFlight {
            period_day: period_day(&scheduled),
            high_season: is_high_season(&scheduled),
            min_diff,
            delay,
            record,
        })
    }

    pub fn features(&self) -> FlightFeatures {
        FlightFeatures {
            opera: self.record.operator.clone(),
            tipo_vuelo: self.record.flight_type.clone(),
            mes: self.record.month,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub flights: Vec<LabeledFlight>,
}

impl Dataset {
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    #[instrument(skip_all)]
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ModelError> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut flights = Vec::new();

        for (index, row) in reader.deserialize::<FlightRecord>().enumerate() {
            let record = row?;
            let flight = LabeledFlight::from_record(record).map_err(|err| {
                tracing::warn!(row = index + 1, "rejected dataset row: {}", err);
                ModelError::InvalidRow {
                    row: index + 1,
                    source: Box::new(err),
                }
            })?;
            flights.push(flight);
        }

        tracing::debug!(rows = flights.len(), "loaded flights dataset");
        Ok(Dataset { flights })
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    pub fn features(&self) -> Vec<FlightFeatures> {
        self.flights.iter().map(LabeledFlight::features).collect()
    }

    pub fn target(&self) -> Vec<u8> {
        self.flights.iter().map(|flight| flight.delay).collect()
    }

    /// Shuffles with a seeded rng and moves `ceil(len * test_fraction)` rows into
    /// the second dataset. The same seed always yields the same split.
    pub fn train_test_split(
        mut self,
        test_fraction: f64,
        seed: u64,
    ) -> Result<(Dataset, Dataset), ModelError> {
        if !(0.0..1.0).contains(&test_fraction) {
            return Err(ModelError::InvalidSplit(test_fraction));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        self.flights.shuffle(&mut rng);

        let test_len = (self.flights.len() as f64 * test_fraction).ceil() as usize;
        let test = self.flights.split_off(self.flights.len() - test_len);

        Ok((self, Dataset { flights: test }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Fecha-I,Vlo-I,Ori-I,Des-I,Emp-I,Fecha-O,Vlo-O,Ori-O,Des-O,Emp-O,DIA,MES,AÑO,DIANOM,TIPOVUELO,OPERA,SIGLAORI,SIGLADES";

    fn with_rows(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn loads_and_labels_rows() {
        let data = with_rows(&[
            "2017-01-01 23:30:00,226,SCEL,KMIA,AAL,2017-01-01 23:33:00,226,SCEL,KMIA,AAL,1,1,2017,Domingo,I,American Airlines,Santiago,Miami",
            "2017-07-20 14:00:00,989P,SCEL,SCQP,LAW,2017-07-20 14:40:00,989,SCEL,SCQP,JMR,20,7,2017,Jueves,N,Latin American Wings,Santiago,Temuco",
        ]);

        let dataset = Dataset::from_reader(data.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 2);

        let first = &dataset.flights[0];
        assert_eq!(first.period_day, PeriodDay::Night);
        assert!(first.high_season);
        assert_eq!(first.min_diff, 3.0);
        assert_eq!(first.delay, 0);

        let second = &dataset.flights[1];
        assert_eq!(second.record.scheduled_flight, "989P");
        assert_eq!(second.period_day, PeriodDay::Afternoon);
        assert!(second.high_season);
        assert_eq!(second.min_diff, 40.0);
        assert_eq!(second.delay, 1);

        assert_eq!(dataset.target(), vec![0, 1]);
        assert_eq!(dataset.features()[1].opera, "Latin American Wings");
    }

    #[test]
    fn keeps_upstream_delay_label() {
        let data = format!(
            "{HEADER},delay\n2017-03-10 09:00:00,1,SCEL,SCFA,SKU,2017-03-10 09:30:00,1,SCEL,SCFA,SKU,10,3,2017,Viernes,N,Sky Airline,Santiago,Antofagasta,0"
        );
        let dataset = Dataset::from_reader(data.as_bytes()).unwrap();
        assert_eq!(dataset.flights[0].min_diff, 30.0);
        assert_eq!(dataset.flights[0].delay, 0);
    }

    #[test]
    fn reports_the_failing_row() {
        let data = with_rows(&[
            "2017-01-01 23:30:00,226,SCEL,KMIA,AAL,2017-01-01 23:33:00,226,SCEL,KMIA,AAL,1,1,2017,Domingo,I,American Airlines,Santiago,Miami",
            "01/02/2017,226,SCEL,KMIA,AAL,2017-01-02 23:33:00,226,SCEL,KMIA,AAL,2,1,2017,Lunes,I,American Airlines,Santiago,Miami",
        ]);
        match Dataset::from_reader(data.as_bytes()) {
            Err(ModelError::InvalidRow { row, .. }) => assert_eq!(row, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_columns_are_an_error() {
        let data = "Fecha-I,Fecha-O\n2017-01-01 23:30:00,2017-01-01 23:33:00";
        assert!(matches!(
            Dataset::from_reader(data.as_bytes()),
            Err(ModelError::DatasetError(_))
        ));
    }

    fn synthetic(len: usize) -> Dataset {
        let rows: Vec<String> = (0..len)
            .map(|i| format!("2017-05-01 10:00:00,{i},SCEL,SCFA,SKU,2017-05-01 10:05:00,{i},SCEL,SCFA,SKU,1,5,2017,Lunes,N,Sky Airline,Santiago,Antofagasta"))
            .collect();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        Dataset::from_reader(with_rows(&refs).as_bytes()).unwrap()
    }

    #[test]
    fn split_is_deterministic() {
        let (train, test) = synthetic(10).train_test_split(0.33, 42).unwrap();
        assert_eq!(train.len(), 6);
        assert_eq!(test.len(), 4);

        let (again, _) = synthetic(10).train_test_split(0.33, 42).unwrap();
        let flights = |d: &Dataset| -> Vec<String> {
            d.flights
                .iter()
                .map(|f| f.record.scheduled_flight.clone())
                .collect()
        };
        assert_eq!(flights(&train), flights(&again));
    }

    #[test]
    fn split_bounds() {
        let (train, test) = synthetic(5).train_test_split(0.0, 1).unwrap();
        assert_eq!(train.len(), 5);
        assert!(test.is_empty());

        assert!(matches!(
            synthetic(5).train_test_split(1.0, 1),
            Err(ModelError::InvalidSplit(_))
        ));
    }
}
