//! Drivetrain configuration
//!
//! Everything fixed at construction: geometry, limits, controller tuning and
//! sensor conventions. Loaded from JSON; missing fields take the defaults of
//! the reference robot.

use std::f64::consts::TAU;
use std::path::Path;

use serde::{Deserialize, Serialize};

use control::{DriveMode, ModuleControllerConfig, PidfConfig};
use drivecore::{ConfigError, HeadingConvention, IntegrationMethod, MODULE_COUNT, ModuleId, PerModule};
use kinematics::{DEFAULT_ZERO_SPEED_EPSILON, ModuleGeometry, SwerveKinematics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub geometry: ModuleGeometry,
    /// Absolute encoder reading when each wheel points forward (rad)
    pub angle_offsets: PerModule<f64>,
    /// Maximum wheel and linear chassis speed (m/s)
    pub max_speed: f64,
    /// Chassis rate for a full-scale rotation command (rad/s)
    pub max_angular_speed: f64,
    /// Period the scheduler calls `periodic` at (s). Controllers use the
    /// `dt` passed each cycle; a different `dt` is logged once.
    pub period: f64,
    pub drive: PidfConfig,
    pub steer: PidfConfig,
    pub drive_mode: DriveMode,
    pub heading: HeadingConvention,
    /// Mode used by [`drive_with_mode`](crate::SwerveDrive::drive_with_mode)
    pub field_relative: bool,
    /// Accept gain updates from the tuning handle
    pub tuning_enabled: bool,
    /// Below this wheel speed the previous steer angle is held (m/s)
    pub zero_speed_epsilon: f64,
    pub integration: IntegrationMethod,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        let max_speed = 4.0;
        let module = ModuleControllerConfig::new(max_speed);
        DrivetrainConfig {
            geometry: ModuleGeometry::default(),
            angle_offsets: PerModule::default(),
            max_speed,
            max_angular_speed: TAU,
            period: 0.02,
            drive: module.drive,
            steer: module.steer,
            drive_mode: DriveMode::ClosedLoop,
            heading: HeadingConvention::degrees(),
            field_relative: true,
            tuning_enabled: false,
            zero_speed_epsilon: DEFAULT_ZERO_SPEED_EPSILON,
            integration: IntegrationMethod::Exponential,
        }
    }
}

impl DrivetrainConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DrivetrainConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_max_speed(mut self, max_speed: f64) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_angle_offsets(mut self, offsets: PerModule<f64>) -> Self {
        self.angle_offsets = offsets;
        self
    }

    pub fn with_tuning(mut self, enabled: bool) -> Self {
        self.tuning_enabled = enabled;
        self
    }

    pub fn with_drive_mode(mut self, mode: DriveMode) -> Self {
        self.drive_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let found = self.geometry.module_positions.len();
        if found != MODULE_COUNT {
            return Err(ConfigError::ModuleCount { expected: MODULE_COUNT, found });
        }
        SwerveKinematics::new(&self.geometry)?;

        for offset in self.angle_offsets.values() {
            ConfigError::require_finite("angle_offsets", *offset)?;
        }
        ConfigError::require_positive("max_speed", self.max_speed)?;
        ConfigError::require_positive("max_angular_speed", self.max_angular_speed)?;
        ConfigError::require_positive("period", self.period)?;
        if !(self.zero_speed_epsilon.is_finite() && self.zero_speed_epsilon >= 0.0) {
            return Err(ConfigError::NonFinite { field: "zero_speed_epsilon".to_string() });
        }

        validate_controller("drive", &self.drive)?;
        validate_controller("steer", &self.steer)?;
        Ok(())
    }

    /// Controller configuration for one module.
    pub fn module_config(&self, id: ModuleId) -> ModuleControllerConfig {
        ModuleControllerConfig::new(self.max_speed)
            .with_drive_controller(self.drive.clone())
            .with_steer_controller(self.steer.clone())
            .with_drive_mode(self.drive_mode)
            .with_angle_offset(self.angle_offsets[id])
    }
}

fn validate_controller(axis: &str, config: &PidfConfig) -> Result<(), ConfigError> {
    config.gains().validate(axis)?;
    let limits_ok = config.output_min.is_finite()
        && config.output_max.is_finite()
        && config.output_min < config.output_max;
    if !limits_ok {
        return Err(ConfigError::InvalidGain {
            name: format!("{axis}.output"),
            reason: format!("limits [{}, {}] are not an interval", config.output_min, config.output_max),
        });
    }
    Ok(())
}
