use std::time::Duration;

use thiserror::Error;

use crate::types::SensorKind;

/// Geo-anchored overlay error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArError {
    #[error("Permission denied for {0}")]
    PermissionDenied(SensorKind),

    #[error("{0} sensor is not available on this platform")]
    SensorUnavailable(SensorKind),

    #[error("No {sensor} data for {:.1}s", .silent_for.as_secs_f64())]
    StaleData {
        sensor: SensorKind,
        silent_for: Duration,
    },

    #[error("No position fix within {:.0}s", .0.as_secs_f64())]
    FirstFixTimeout(Duration),

    #[error("Orientation access must be requested from a user gesture")]
    GestureRequired,

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Reference frame is not locked")]
    ReferenceNotLocked,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ArError {
    /// Errors that end the session rather than degrading one sensor
    pub fn is_terminal(&self) -> bool {
        match self {
            ArError::PermissionDenied(kind) | ArError::SensorUnavailable(kind) => {
                *kind != SensorKind::Orientation
            }
            ArError::FirstFixTimeout(_) | ArError::InvalidConfig(_) => true,
            ArError::StaleData { .. }
            | ArError::GestureRequired
            | ArError::InvalidTransition { .. }
            | ArError::ReferenceNotLocked => false,
        }
    }
}

/// Result type for overlay operations
pub type ArResult<T> = Result<T, ArError>;
