use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{PlotError, Result};

/// One entry of a raw, dictionary-shaped history: a bare scalar or a
/// fixed-width numeric tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRecord {
    Scalar(f64),
    Tuple(Vec<f64>),
}

impl RawRecord {
    pub fn values(&self) -> &[f64] {
        match self {
            RawRecord::Scalar(value) => std::slice::from_ref(value),
            RawRecord::Tuple(values) => values,
        }
    }
}

/// Metric name -> one record per iteration, as dumped by the tuning loop.
pub type RawHistory = BTreeMap<String, Vec<RawRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamParameters {
    pub mu_x: f64,
    pub sigma_x: f64,
    pub mu_y: f64,
    pub sigma_y: f64,
}

impl BeamParameters {
    fn from_array([mu_x, sigma_x, mu_y, sigma_y]: [f64; 4]) -> Self {
        Self {
            mu_x,
            sigma_x,
            mu_y,
            sigma_y,
        }
    }

    fn to_array(self) -> [f64; 4] {
        [self.mu_x, self.sigma_x, self.mu_y, self.sigma_y]
    }
}

/// Magnet settings of the experimental area, in beamline order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnetSettings {
    /// AREAMQZM1 strength (1/m^2)
    pub q1: f64,
    /// AREAMQZM2 strength (1/m^2)
    pub q2: f64,
    /// AREAMCVM1 vertical steering angle (rad)
    pub cv: f64,
    /// AREAMQZM3 strength (1/m^2)
    pub q3: f64,
    /// AREAMCHM1 horizontal steering angle (rad)
    pub ch: f64,
}

impl MagnetSettings {
    fn from_array([q1, q2, cv, q3, ch]: [f64; 5]) -> Self {
        Self { q1, q2, cv, q3, ch }
    }

    fn to_array(self) -> [f64; 5] {
        [self.q1, self.q2, self.cv, self.q3, self.ch]
    }
}

/// Transverse offset of one quadrupole, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QuadrupoleMisalignment {
    pub x: f64,
    pub y: f64,
}

impl QuadrupoleMisalignment {
    fn from_array([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// Misalignments of the three quadrupoles, e.g. the ground truth of a
/// system-identification run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Misalignments {
    pub q1: QuadrupoleMisalignment,
    pub q2: QuadrupoleMisalignment,
    pub q3: QuadrupoleMisalignment,
}

impl Misalignments {
    /// Parse the flat `[q1x, q1y, q2x, q2y, q3x, q3y]` layout.
    pub fn from_flat(values: &[f64]) -> Result<Self> {
        let [q1x, q1y, q2x, q2y, q3x, q3y]: [f64; 6] =
            values.try_into().map_err(|_| PlotError::RecordShape {
                key: "ground_truth".to_string(),
                index: 0,
                expected: 6,
                actual: values.len(),
            })?;

        Ok(Self {
            q1: QuadrupoleMisalignment { x: q1x, y: q1y },
            q2: QuadrupoleMisalignment { x: q2x, y: q2y },
            q3: QuadrupoleMisalignment { x: q3x, y: q3y },
        })
    }

    pub fn as_array(&self) -> [QuadrupoleMisalignment; 3] {
        [self.q1, self.q2, self.q3]
    }
}

/// Conversion between a typed history and its raw dictionary shape.
pub trait HistoryRecord: Sized {
    fn from_raw(raw: &RawHistory) -> Result<Self>;

    fn to_raw(&self) -> RawHistory;

    /// Number of recorded iterations
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a raw history JSON file and validate it
    fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let raw: RawHistory = serde_json::from_str(&json)?;
        let history = Self::from_raw(&raw)?;
        debug!(
            path = %path.as_ref().display(),
            iterations = history.len(),
            "history loaded"
        );
        Ok(history)
    }

    /// Save in the raw dictionary shape
    fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_raw())?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

/// Gradient-based tuning history, one entry per iteration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TuningHistory {
    pub loss: Vec<f64>,
    pub beam_parameters: Vec<BeamParameters>,
    pub magnet_settings: Vec<MagnetSettings>,
}

impl HistoryRecord for TuningHistory {
    fn from_raw(raw: &RawHistory) -> Result<Self> {
        let loss = parse_series(raw, "loss", |[loss]: [f64; 1]| loss)?;
        let beam_parameters = parse_series(raw, "beam_parameters", BeamParameters::from_array)?;
        let magnet_settings = parse_series(raw, "magnet_settings", MagnetSettings::from_array)?;

        check_length("beam_parameters", loss.len(), beam_parameters.len())?;
        check_length("magnet_settings", loss.len(), magnet_settings.len())?;

        Ok(Self {
            loss,
            beam_parameters,
            magnet_settings,
        })
    }

    fn to_raw(&self) -> RawHistory {
        let mut raw = RawHistory::new();
        raw.insert("loss".to_string(), scalars(&self.loss));
        raw.insert(
            "beam_parameters".to_string(),
            tuples(self.beam_parameters.iter().map(|b| b.to_array().to_vec())),
        );
        raw.insert(
            "magnet_settings".to_string(),
            tuples(self.magnet_settings.iter().map(|m| m.to_array().to_vec())),
        );
        raw
    }

    fn len(&self) -> usize {
        self.loss.len()
    }
}

/// System-identification training history, one entry per epoch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemIdentificationHistory {
    pub loss: Vec<f64>,
    pub misalignment_q1: Vec<QuadrupoleMisalignment>,
    pub misalignment_q2: Vec<QuadrupoleMisalignment>,
    pub misalignment_q3: Vec<QuadrupoleMisalignment>,
}

impl SystemIdentificationHistory {
    pub fn misalignments(&self) -> [&[QuadrupoleMisalignment]; 3] {
        [
            &self.misalignment_q1,
            &self.misalignment_q2,
            &self.misalignment_q3,
        ]
    }
}

const MISALIGNMENT_KEYS: [&str; 3] = ["misalignment_q1", "misalignment_q2", "misalignment_q3"];

impl HistoryRecord for SystemIdentificationHistory {
    fn from_raw(raw: &RawHistory) -> Result<Self> {
        let loss = parse_series(raw, "loss", |[loss]: [f64; 1]| loss)?;
        let [q1, q2, q3] = MISALIGNMENT_KEYS;
        let misalignment_q1 = parse_series(raw, q1, QuadrupoleMisalignment::from_array)?;
        let misalignment_q2 = parse_series(raw, q2, QuadrupoleMisalignment::from_array)?;
        let misalignment_q3 = parse_series(raw, q3, QuadrupoleMisalignment::from_array)?;

        check_length(q1, loss.len(), misalignment_q1.len())?;
        check_length(q2, loss.len(), misalignment_q2.len())?;
        check_length(q3, loss.len(), misalignment_q3.len())?;

        Ok(Self {
            loss,
            misalignment_q1,
            misalignment_q2,
            misalignment_q3,
        })
    }

    fn to_raw(&self) -> RawHistory {
        let mut raw = RawHistory::new();
        raw.insert("loss".to_string(), scalars(&self.loss));
        for (key, series) in MISALIGNMENT_KEYS.iter().zip(self.misalignments()) {
            raw.insert(
                key.to_string(),
                tuples(series.iter().map(|m| vec![m.x, m.y])),
            );
        }
        raw
    }

    fn len(&self) -> usize {
        self.loss.len()
    }
}

fn parse_series<T, F, const W: usize>(raw: &RawHistory, key: &str, convert: F) -> Result<Vec<T>>
where
    F: Fn([f64; W]) -> T,
{
    let records = raw
        .get(key)
        .ok_or_else(|| PlotError::MissingKey(key.to_string()))?;

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let values = record.values();
            <[f64; W]>::try_from(values)
                .map(&convert)
                .map_err(|_| PlotError::RecordShape {
                    key: key.to_string(),
                    index,
                    expected: W,
                    actual: values.len(),
                })
        })
        .collect()
}

fn check_length(key: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PlotError::LengthMismatch {
            key: key.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn scalars(values: &[f64]) -> Vec<RawRecord> {
    values.iter().map(|v| RawRecord::Scalar(*v)).collect()
}

fn tuples(records: impl Iterator<Item = Vec<f64>>) -> Vec<RawRecord> {
    records.map(RawRecord::Tuple).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn raw_from_json(json: &str) -> RawHistory {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn tuning_history_maps_positions_to_named_fields() {
        let raw = raw_from_json(
            r#"{
                "loss": [1.5, 0.5],
                "beam_parameters": [[1, 2, 3, 4], [5, 6, 7, 8]],
                "magnet_settings": [[10, 11, 0.1, 12, 0.2], [20, 21, 0.3, 22, 0.4]]
            }"#,
        );

        let history = TuningHistory::from_raw(&raw).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.loss, vec![1.5, 0.5]);
        assert_eq!(history.beam_parameters[1].sigma_x, 6.0);
        assert_eq!(history.beam_parameters[1].mu_y, 7.0);

        let magnets = history.magnet_settings[0];
        assert_eq!((magnets.q1, magnets.q2, magnets.q3), (10.0, 11.0, 12.0));
        assert_eq!((magnets.cv, magnets.ch), (0.1, 0.2));
    }

    #[test]
    fn single_element_loss_records_are_accepted() {
        let raw = raw_from_json(
            r#"{
                "loss": [[0.25]],
                "misalignment_q1": [[0.001, -0.002]],
                "misalignment_q2": [[0.0, 0.0]],
                "misalignment_q3": [[0.003, 0.004]]
            }"#,
        );

        let history = SystemIdentificationHistory::from_raw(&raw).unwrap();
        assert_eq!(history.loss, vec![0.25]);
        assert_eq!(history.misalignment_q1[0].y, -0.002);
        assert_eq!(history.misalignment_q3[0].x, 0.003);
    }

    #[test]
    fn missing_key_is_reported() {
        let raw = raw_from_json(r#"{"loss": [1.0], "beam_parameters": [[1, 2, 3, 4]]}"#);
        let err = TuningHistory::from_raw(&raw).unwrap_err();
        assert!(matches!(err, PlotError::MissingKey(ref key) if key == "magnet_settings"));
    }

    #[test]
    fn wrong_record_width_is_reported_with_index() {
        let raw = raw_from_json(
            r#"{
                "loss": [1.0, 2.0],
                "beam_parameters": [[1, 2, 3, 4], [1, 2, 3]],
                "magnet_settings": [[1, 2, 3, 4, 5], [1, 2, 3, 4, 5]]
            }"#,
        );

        let err = TuningHistory::from_raw(&raw).unwrap_err();
        match err {
            PlotError::RecordShape {
                key,
                index,
                expected,
                actual,
            } => {
                assert_eq!(key, "beam_parameters");
                assert_eq!((index, expected, actual), (1, 4, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unequal_series_lengths_are_rejected() {
        let raw = raw_from_json(
            r#"{
                "loss": [1.0, 2.0, 3.0],
                "misalignment_q1": [[0, 0], [0, 0], [0, 0]],
                "misalignment_q2": [[0, 0], [0, 0]],
                "misalignment_q3": [[0, 0], [0, 0], [0, 0]]
            }"#,
        );

        let err = SystemIdentificationHistory::from_raw(&raw).unwrap_err();
        assert!(matches!(
            err,
            PlotError::LengthMismatch {
                ref key,
                expected: 3,
                actual: 2,
            } if key == "misalignment_q2"
        ));
    }

    #[test]
    fn ground_truth_parses_flat_layout() {
        let truth = Misalignments::from_flat(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(truth.q2, QuadrupoleMisalignment { x: 3.0, y: 4.0 });
        assert_eq!(truth.q3.y, 6.0);

        assert!(Misalignments::from_flat(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn save_and_load_json_keeps_history() {
        let history = TuningHistory {
            loss: vec![3.0, 2.0, 1.0],
            beam_parameters: vec![
                BeamParameters::from_array([0.1, 0.2, 0.3, 0.4]);
                3
            ],
            magnet_settings: vec![MagnetSettings::from_array([1.0, -1.0, 1e-3, 2.0, -2e-3]); 3],
        };

        let temp_file = NamedTempFile::new().unwrap();
        history.save_json(temp_file.path()).unwrap();

        let json = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(json.contains("\"magnet_settings\""));

        let loaded = TuningHistory::load_json(temp_file.path()).unwrap();
        assert_eq!(loaded, history);
    }

    #[test]
    fn load_json_reports_missing_file() {
        let err = TuningHistory::load_json("/nonexistent/history.json").unwrap_err();
        assert!(matches!(err, PlotError::Io(_)));
    }
}
