//! Perception collaborator interface and a trace-replay implementation.
//!
//! A trace line carries either a ready [`Measurement`] or raw collaborator
//! output (detected faces, a device-motion event, an image frame with its
//! landmarks) that is converted through the adapters in this crate.

use crate::face::{primary_measurement, FaceLandmarks, FaceObservation};
use crate::motion::AccelerationReading;
use crate::skin::{analyze_frame, SkinMetrics};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vigil_core::Measurement;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("invalid trace line {line}: {reason}")]
    Trace { line: usize, reason: String },
    /// One frame could not be analyzed. The device itself is fine.
    #[error("frame analysis failed: {0}")]
    Frame(String),
}

impl SensorError {
    /// Per-frame failures are recoverable; everything else ends the session.
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Self::Frame(_))
    }
}

/// Source of measurements. `Ok(None)` means no subject in view, which is
/// not an error. `Err` is a collaborator failure.
pub trait Sensor {
    fn sample(&mut self) -> Result<Option<Measurement>, SensorError>;
}

impl<S: Sensor + ?Sized> Sensor for Box<S> {
    fn sample(&mut self) -> Result<Option<Measurement>, SensorError> {
        (**self).sample()
    }
}

/// Image file plus the landmarks detected on it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameRef {
    /// Relative paths resolve against the trace's directory.
    pub image: PathBuf,
    pub landmarks: FaceLandmarks,
}

impl FrameRef {
    pub fn analyze(&self, base: &Path) -> Result<SkinMetrics, SensorError> {
        let path = base.join(&self.image);
        let img = image::open(&path)
            .map_err(|e| SensorError::Frame(format!("{}: {e}", path.display())))?
            .to_rgb8();
        analyze_frame(&img, &self.landmarks).map_err(|e| SensorError::Frame(e.to_string()))
    }
}

/// What the collaborator reported at one instant.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Observation {
    #[default]
    Absent,
    Measurement(Measurement),
    Faces(Vec<FaceObservation>),
    Accel(AccelerationReading),
    Frame(FrameRef),
}

impl Observation {
    /// Convert to a measurement. An empty face list is no subject.
    pub fn resolve(&self, base: &Path) -> Result<Option<Measurement>, SensorError> {
        match self {
            Self::Absent => Ok(None),
            Self::Measurement(m) => Ok(Some(m.clone())),
            Self::Faces(faces) => Ok(primary_measurement(faces)),
            Self::Accel(reading) => Ok(Some(reading.to_measurement())),
            Self::Frame(frame) => frame.analyze(base).map(|m| Some(m.to_measurement())),
        }
    }
}

impl From<Option<Measurement>> for Observation {
    fn from(m: Option<Measurement>) -> Self {
        m.map_or(Self::Absent, Self::Measurement)
    }
}

/// One line of a recorded trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub t_ms: u64,
    pub observation: Observation,
}

const OBSERVATION_KEYS: [&str; 4] = ["measurement", "faces", "accel", "frame"];

fn lenient<T: DeserializeOwned>(line: usize, key: &str, value: &serde_json::Value) -> Option<T> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(line, key, error = %e, "malformed observation; treating as absent");
            None
        }
    }
}

/// Parse a JSON-lines trace. Blank lines and `#` comments are skipped.
///
/// Each line holds `t_ms` and at most one of `measurement`, `faces`,
/// `accel` or `frame`. A malformed observation is logged and read as
/// absent; a missing or decreasing `t_ms` is an error.
pub fn parse_trace(src: &str) -> Result<Vec<TraceRecord>, SensorError> {
    let mut records = Vec::new();
    let mut last_t = 0u64;

    for (i, raw) in src.lines().enumerate() {
        let line = i + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| SensorError::Trace {
            line,
            reason: e.to_string(),
        })?;

        let t_ms = value
            .get("t_ms")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| SensorError::Trace {
                line,
                reason: "missing or invalid t_ms".into(),
            })?;
        if t_ms < last_t {
            return Err(SensorError::Trace {
                line,
                reason: format!("t_ms {t_ms} is earlier than previous {last_t}"),
            });
        }
        last_t = t_ms;

        let present: Vec<(&str, &serde_json::Value)> = OBSERVATION_KEYS
            .iter()
            .filter_map(|&k| value.get(k).filter(|v| !v.is_null()).map(|v| (k, v)))
            .collect();

        let observation = match present.as_slice() {
            [] => Observation::Absent,
            [(key, v)] => match *key {
                "measurement" => lenient(line, key, v).map(Observation::Measurement),
                "faces" => lenient(line, key, v).map(Observation::Faces),
                "accel" => lenient(line, key, v).map(Observation::Accel),
                _ => lenient(line, key, v).map(Observation::Frame),
            }
            .unwrap_or_default(),
            _ => {
                return Err(SensorError::Trace {
                    line,
                    reason: format!("expected at most one of {}", OBSERVATION_KEYS.join(", ")),
                })
            }
        };

        records.push(TraceRecord { t_ms, observation });
    }

    Ok(records)
}

/// Plays back a fixed list of observations, then reports no subject forever.
#[derive(Debug, Default, Clone)]
pub struct ReplaySensor {
    observations: VecDeque<Observation>,
    base_dir: PathBuf,
}

impl ReplaySensor {
    pub fn new(samples: impl IntoIterator<Item = Option<Measurement>>) -> Self {
        Self {
            observations: samples.into_iter().map(Observation::from).collect(),
            base_dir: PathBuf::new(),
        }
    }

    /// Replay a parsed trace; frame images resolve against `base_dir`.
    pub fn from_trace(records: Vec<TraceRecord>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            observations: records.into_iter().map(|r| r.observation).collect(),
            base_dir: base_dir.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.observations.len()
    }
}

impl Sensor for ReplaySensor {
    fn sample(&mut self) -> Result<Option<Measurement>, SensorError> {
        match self.observations.pop_front() {
            Some(obs) => obs.resolve(&self.base_dir),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::tests::synthetic_landmarks;
    use image::{Rgb, RgbImage};
    use vigil_core::Signal;

    #[test]
    fn test_parse_trace_basic() {
        let src = r#"
# liveness run
{"t_ms": 0, "measurement": {"neutral": 0.5}}
{"t_ms": 100, "measurement": null}
{"t_ms": 200}
"#;
        let records = parse_trace(src).unwrap();
        assert_eq!(records.len(), 3);
        let Observation::Measurement(m) = &records[0].observation else {
            panic!("expected a measurement, got {:?}", records[0].observation);
        };
        assert_eq!(m.get(Signal::Neutral), Some(0.5));
        assert_eq!(records[1].observation, Observation::Absent);
        assert_eq!(records[2].observation, Observation::Absent);
    }

    #[test]
    fn test_malformed_measurement_reads_as_absent() {
        let src = r#"{"t_ms": 0, "measurement": {"neutral": "high"}}"#;
        let records = parse_trace(src).unwrap();
        assert_eq!(records[0].observation, Observation::Absent);
    }

    #[test]
    fn test_missing_timestamp_is_error() {
        let err = parse_trace(r#"{"measurement": {"neutral": 0.5}}"#).unwrap_err();
        assert!(matches!(err, SensorError::Trace { line: 1, .. }));
    }

    #[test]
    fn test_decreasing_timestamp_is_error() {
        let src = "{\"t_ms\": 500}\n{\"t_ms\": 400}";
        let err = parse_trace(src).unwrap_err();
        assert!(matches!(err, SensorError::Trace { line: 2, .. }));
    }

    #[test]
    fn test_two_observations_on_one_line_is_error() {
        let src = r#"{"t_ms": 0, "measurement": {"neutral": 0.5}, "accel": {"z": 9.8}}"#;
        assert!(matches!(parse_trace(src), Err(SensorError::Trace { line: 1, .. })));
    }

    #[test]
    fn test_faces_convert_through_landmarks() {
        let line = serde_json::json!({
            "t_ms": 40,
            "faces": [{
                "landmarks": synthetic_landmarks(0.3, 50.0),
                "expressions": {"neutral": 0.8, "happy": 0.1}
            }]
        });
        let records = parse_trace(&line.to_string()).unwrap();
        let mut sensor = ReplaySensor::from_trace(records, ".");
        let m = sensor.sample().unwrap().unwrap();
        assert_eq!(m.get(Signal::Neutral), Some(0.8));
        assert!((m.get(Signal::EyeAspectRatio).unwrap() - 0.3).abs() < 1e-5);
        assert!(m.get(Signal::HeadYaw).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_no_faces_is_no_subject() {
        let records = parse_trace(r#"{"t_ms": 0, "faces": []}"#).unwrap();
        let mut sensor = ReplaySensor::from_trace(records, ".");
        assert!(sensor.sample().unwrap().is_none());
    }

    #[test]
    fn test_accel_event_converts_with_missing_axes() {
        let records = parse_trace(r#"{"t_ms": 0, "accel": {"z": 9.8}}"#).unwrap();
        let mut sensor = ReplaySensor::from_trace(records, ".");
        let m = sensor.sample().unwrap().unwrap();
        assert_eq!(m.get(Signal::AccelX), Some(0.0));
        assert_eq!(m.get(Signal::AccelZ), Some(9.8));
    }

    #[test]
    fn test_frame_is_analyzed_from_disk() {
        let dir = std::env::temp_dir().join(format!("vigil-frame-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(100, 100, Rgb([170, 160, 150]))
            .save(dir.join("face.png"))
            .unwrap();

        let line = serde_json::json!({
            "t_ms": 0,
            "frame": {"image": "face.png", "landmarks": synthetic_landmarks(0.3, 50.0)}
        });
        let records = parse_trace(&line.to_string()).unwrap();
        let mut sensor = ReplaySensor::from_trace(records, &dir);
        let m = sensor.sample().unwrap().unwrap();
        assert_eq!(m.get(Signal::Health), Some(100.0));
        assert_eq!(m.get(Signal::Acne), Some(0.0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unreadable_frame_is_frame_error() {
        let line = serde_json::json!({
            "t_ms": 0,
            "frame": {"image": "does-not-exist.png", "landmarks": synthetic_landmarks(0.3, 50.0)}
        });
        let records = parse_trace(&line.to_string()).unwrap();
        let mut sensor = ReplaySensor::from_trace(records, std::env::temp_dir());
        let err = sensor.sample().unwrap_err();
        assert!(err.is_frame_error(), "got {err}");
        assert!(!SensorError::PermissionDenied("camera".into()).is_frame_error());
    }

    #[test]
    fn test_replay_sensor_exhausts_to_none() {
        let mut sensor = ReplaySensor::new([Some(Measurement::new().with(Signal::Happy, 0.9)), None]);
        assert!(sensor.sample().unwrap().is_some());
        assert!(sensor.sample().unwrap().is_none());
        assert_eq!(sensor.remaining(), 0);
        assert!(sensor.sample().unwrap().is_none());
    }
}
