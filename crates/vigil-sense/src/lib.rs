//! vigil-sense — perception-side adapters.
//!
//! Turns raw collaborator output (68-point landmarks, expression scores,
//! device-motion events, RGB frames) into [`vigil_core::Measurement`]s, and
//! defines the [`Sensor`] trait the runtime polls.

pub mod face;
pub mod motion;
pub mod sensor;
pub mod skin;

pub use face::{FaceLandmarks, FaceObservation, Point};
pub use motion::AccelerationReading;
pub use sensor::{parse_trace, FrameRef, Observation, ReplaySensor, Sensor, SensorError, TraceRecord};
pub use skin::{FrameError, SkinMetrics};
