//! Error types
//!
//! Configuration problems are fatal and surface at construction time. Sensor
//! faults never leave the control loop: they ride on the sensor bus and are
//! absorbed by the consumer, which keeps its last good value.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("expected {expected} swerve modules, found {found}")]
    ModuleCount { expected: usize, found: usize },

    #[error("{field} must be finite")]
    NonFinite { field: String },

    #[error("module geometry is degenerate: {reason}")]
    DegenerateGeometry { reason: String },

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: String, value: f64 },

    #[error("invalid gain {name}: {reason}")]
    InvalidGain { name: String, reason: String },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Check that `value` is finite and strictly positive.
    pub fn require_positive(name: &str, value: f64) -> Result<f64, ConfigError> {
        if !value.is_finite() {
            return Err(ConfigError::NonFinite { field: name.to_string() });
        }
        if value <= 0.0 {
            return Err(ConfigError::NonPositive { name: name.to_string(), value });
        }
        Ok(value)
    }

    /// Check that `value` is finite.
    pub fn require_finite(name: &str, value: f64) -> Result<f64, ConfigError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ConfigError::NonFinite { field: name.to_string() })
        }
    }
}

/// Why a sensor sample could not be used this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorFault {
    #[error("sensor value is stale")]
    Stale,
    #[error("sensor is unreachable")]
    Unreachable,
    #[error("sensor returned a non-finite value")]
    NonFinite,
}

/// A sensor sample as delivered on the bus.
pub type SensorReading<T> = Result<T, SensorFault>;
