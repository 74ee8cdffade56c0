use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named scalar produced by a perception collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Expression-classifier probability of a neutral face (0.0–1.0).
    Neutral,
    /// Expression-classifier probability of a happy face (0.0–1.0).
    Happy,
    /// Mean eye aspect ratio over both eyes.
    EyeAspectRatio,
    /// Signed head-yaw ratio in [-1, 1]; negative = turned left.
    HeadYaw,
    AccelX,
    AccelY,
    AccelZ,
    /// Skin metrics, each in 0–100.
    Health,
    Acne,
    Texture,
    Circles,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::EyeAspectRatio => "eye_aspect_ratio",
            Self::HeadYaw => "head_yaw",
            Self::AccelX => "accel_x",
            Self::AccelY => "accel_y",
            Self::AccelZ => "accel_z",
            Self::Health => "health",
            Self::Acne => "acne",
            Self::Texture => "texture",
            Self::Circles => "circles",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One polled sample from a perception collaborator.
///
/// Non-finite scores are dropped on insertion, so a malformed field reads
/// the same as an absent one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Signal, f32>", into = "BTreeMap<Signal, f32>")]
pub struct Measurement {
    scores: BTreeMap<Signal, f32>,
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, signal: Signal, value: f32) -> Self {
        self.insert(signal, value);
        self
    }

    pub fn insert(&mut self, signal: Signal, value: f32) {
        if value.is_finite() {
            self.scores.insert(signal, value);
        } else {
            tracing::debug!(%signal, value, "dropping non-finite score");
        }
    }

    pub fn get(&self, signal: Signal) -> Option<f32> {
        self.scores.get(&signal).copied()
    }
}

impl From<BTreeMap<Signal, f32>> for Measurement {
    fn from(scores: BTreeMap<Signal, f32>) -> Self {
        let mut m = Measurement::new();
        for (signal, value) in scores {
            m.insert(signal, value);
        }
        m
    }
}

impl From<Measurement> for BTreeMap<Signal, f32> {
    fn from(m: Measurement) -> Self {
        m.scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_scores_dropped() {
        let m = Measurement::new()
            .with(Signal::Neutral, f32::NAN)
            .with(Signal::Happy, f32::INFINITY)
            .with(Signal::EyeAspectRatio, 0.3);
        assert_eq!(m.get(Signal::Neutral), None);
        assert_eq!(m.get(Signal::Happy), None);
        assert_eq!(m.get(Signal::EyeAspectRatio), Some(0.3));
    }

    #[test]
    fn test_deserialize_snake_case_keys() {
        let m: Measurement = serde_json::from_str(r#"{"neutral": 0.5, "eye_aspect_ratio": 0.28}"#).unwrap();
        assert_eq!(m.get(Signal::Neutral), Some(0.5));
        assert_eq!(m.get(Signal::EyeAspectRatio), Some(0.28));
        assert_eq!(m.get(Signal::Happy), None);
    }

    #[test]
    fn test_deserialize_unknown_signal_fails() {
        let result: Result<Measurement, _> = serde_json::from_str(r#"{"surprise": 0.9}"#);
        assert!(result.is_err());
    }
}
