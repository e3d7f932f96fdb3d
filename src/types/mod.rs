pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Position fix from the geolocation sensor. Superseded by the next fix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeodeticFix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius (meters)
    pub accuracy: f64,
    /// Ground speed (m/s) when the platform reports one
    pub speed: Option<f64>,
}

impl GeodeticFix {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            accuracy,
            speed: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Finite coordinates inside the WGS84 degree ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Raw orientation sample: `degrees` is the compass alpha angle, `None` when
/// the platform could not produce one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadingSample {
    pub timestamp: f64,
    pub degrees: Option<f64>,
    pub is_absolute: bool,
}

impl HeadingSample {
    pub fn absolute(degrees: f64, timestamp: f64) -> Self {
        Self {
            timestamp,
            degrees: Some(degrees),
            is_absolute: true,
        }
    }

    pub fn relative(degrees: f64, timestamp: f64) -> Self {
        Self {
            timestamp,
            degrees: Some(degrees),
            is_absolute: false,
        }
    }

    pub fn unavailable(timestamp: f64) -> Self {
        Self {
            timestamp,
            degrees: None,
            is_absolute: true,
        }
    }

    /// Angle usable for fusion: absolute, present and finite
    pub fn usable_degrees(&self) -> Option<f64> {
        if !self.is_absolute {
            return None;
        }
        self.degrees.filter(|d| d.is_finite())
    }
}

/// Geolocation sensor failure reported instead of a fix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorFault {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SensorFault::PermissionDenied => "location permission denied",
            SensorFault::PositionUnavailable => "position unavailable",
            SensorFault::Timeout => "location request timed out",
        };
        f.write_str(text)
    }
}

/// Everything a geolocation subscription can deliver
#[derive(Clone, Debug, PartialEq)]
pub enum GeolocationEvent {
    Fix(GeodeticFix),
    Fault(SensorFault),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Camera,
    Geolocation,
    Orientation,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SensorKind::Camera => "camera",
            SensorKind::Geolocation => "geolocation",
            SensorKind::Orientation => "orientation",
        };
        f.write_str(text)
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_validation() {
        assert!(GeodeticFix::new(48.8566, 2.3522, 5.0, 0.0).is_valid());
        assert!(!GeodeticFix::new(f64::NAN, 2.3522, 5.0, 0.0).is_valid());
        assert!(!GeodeticFix::new(91.0, 0.0, 5.0, 0.0).is_valid());
        assert!(!GeodeticFix::new(0.0, -180.5, 5.0, 0.0).is_valid());
    }

    #[test]
    fn test_heading_usable_degrees() {
        assert_eq!(HeadingSample::absolute(12.0, 0.0).usable_degrees(), Some(12.0));
        assert_eq!(HeadingSample::relative(12.0, 0.0).usable_degrees(), None);
        assert_eq!(HeadingSample::unavailable(0.0).usable_degrees(), None);

        let nan = HeadingSample::absolute(f64::NAN, 0.0);
        assert_eq!(nan.usable_degrees(), None);
    }
}
