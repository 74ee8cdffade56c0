//! 68-point facial landmark geometry and expression scores.
//!
//! Converts one detector result into a [`Measurement`]: eye aspect ratio
//! (averaged over both eyes), signed head-yaw ratio, and the neutral/happy
//! expression probabilities.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_core::{Measurement, Signal};

pub const LANDMARK_COUNT: usize = 68;

const LEFT_EYE: std::ops::Range<usize> = 36..42;
const RIGHT_EYE: std::ops::Range<usize> = 42..48;
const JAW_LEFT: usize = 0;
const JAW_RIGHT: usize = 16;
const NOSE_TIP: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("expected {LANDMARK_COUNT} landmarks, got {0}")]
    WrongCount(usize),
    #[error("non-finite landmark at index {0}")]
    NonFinite(usize),
}

/// Eye aspect ratio over six eye-contour points (outer corner first,
/// clockwise). `None` when the eye has zero width.
pub fn eye_aspect_ratio(eye: &[Point]) -> Option<f32> {
    let [p0, p1, p2, p3, p4, p5] = eye else {
        return None;
    };
    let vertical_a = p1.distance(p5);
    let vertical_b = p2.distance(p4);
    let horizontal = p0.distance(p3);
    if horizontal <= f32::EPSILON {
        return None;
    }
    Some((vertical_a + vertical_b) / (2.0 * horizontal))
}

/// Validated 68-point landmark set in image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::WrongCount(points.len()));
        }
        if let Some(i) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(LandmarkError::NonFinite(i));
        }
        Ok(Self { points })
    }

    pub fn point(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn left_eye(&self) -> &[Point] {
        &self.points[LEFT_EYE]
    }

    pub fn right_eye(&self) -> &[Point] {
        &self.points[RIGHT_EYE]
    }

    /// Mean EAR of both eyes.
    pub fn eye_aspect_ratio(&self) -> Option<f32> {
        let left = eye_aspect_ratio(self.left_eye())?;
        let right = eye_aspect_ratio(self.right_eye())?;
        Some((left + right) / 2.0)
    }

    /// Nose-to-jaw asymmetry in [-1, 1]. Positive when the nose tip sits
    /// closer to jaw point 0 than to jaw point 16 in image space.
    pub fn head_yaw(&self) -> Option<f32> {
        let nose = self.points[NOSE_TIP];
        let to_left = nose.distance(&self.points[JAW_LEFT]);
        let to_right = nose.distance(&self.points[JAW_RIGHT]);
        let span = to_left + to_right;
        if span <= f32::EPSILON {
            return None;
        }
        Some((to_right - to_left) / span)
    }
}

impl TryFrom<Vec<Point>> for FaceLandmarks {
    type Error = LandmarkError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<FaceLandmarks> for Vec<Point> {
    fn from(l: FaceLandmarks) -> Self {
        l.points
    }
}

/// Expression-classifier output. Labels the controllers do not use are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Expressions {
    #[serde(default)]
    pub neutral: f32,
    #[serde(default)]
    pub happy: f32,
}

/// One detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub landmarks: FaceLandmarks,
    #[serde(default)]
    pub expressions: Option<Expressions>,
}

impl FaceObservation {
    pub fn to_measurement(&self) -> Measurement {
        let mut m = Measurement::new();
        if let Some(e) = self.expressions {
            m.insert(Signal::Neutral, e.neutral);
            m.insert(Signal::Happy, e.happy);
        }
        if let Some(ear) = self.landmarks.eye_aspect_ratio() {
            m.insert(Signal::EyeAspectRatio, ear);
        }
        if let Some(yaw) = self.landmarks.head_yaw() {
            m.insert(Signal::HeadYaw, yaw);
        }
        m
    }
}

/// Measurement for the first detected face; `None` means no subject.
pub fn primary_measurement(detections: &[FaceObservation]) -> Option<Measurement> {
    let face = detections.first()?;
    if detections.len() > 1 {
        tracing::debug!(faces = detections.len(), "multiple faces; using the first");
    }
    Some(face.to_measurement())
}
