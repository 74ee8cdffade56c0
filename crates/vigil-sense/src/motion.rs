use serde::{Deserialize, Serialize};
use vigil_core::{Measurement, Signal};

/// Raw device-motion event: acceleration including gravity, in m/s².
/// Platforms may omit an axis or report NaN; both read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationReading {
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub z: Option<f32>,
}

impl AccelerationReading {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    pub fn to_measurement(&self) -> Measurement {
        let axis = |v: Option<f32>| v.filter(|v| v.is_finite()).unwrap_or(0.0);
        Measurement::new()
            .with(Signal::AccelX, axis(self.x))
            .with(Signal::AccelY, axis(self.y))
            .with(Signal::AccelZ, axis(self.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_nan_axes_read_as_zero() {
        let reading = AccelerationReading {
            x: None,
            y: Some(f32::NAN),
            z: Some(9.81),
        };
        let m = reading.to_measurement();
        assert_eq!(m.get(Signal::AccelX), Some(0.0));
        assert_eq!(m.get(Signal::AccelY), Some(0.0));
        assert_eq!(m.get(Signal::AccelZ), Some(9.81));
    }

    #[test]
    fn test_deserialize_partial_event() {
        let reading: AccelerationReading = serde_json::from_str(r#"{"z": 9.8}"#).unwrap();
        assert_eq!(reading.x, None);
        assert_eq!(reading.z, Some(9.8));
    }
}
