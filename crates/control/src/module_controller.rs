//! Swerve Module Controller
//!
//! Closed-loop control of one wheel module: a continuous-input PD loop on the
//! steer angle and a PDF loop (or open-loop scaling) on the drive speed, with
//! shortest-path angle optimization in front of both.

use std::f64::consts::{FRAC_PI_2, PI};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use drivecore::{
    ModuleEffort, ModuleId, ModulePosition, ModuleReading, ModuleState, Model, SensorFault,
    SensorReading, angle_difference, wrap_angle,
};

use crate::gains::ModuleGains;
use crate::pidf::{PidfConfig, PidfController};

/// How the drive motor effort is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// PDF loop on measured wheel speed
    #[default]
    ClosedLoop,
    /// Effort proportional to desired speed, no feedback
    OpenLoop,
}

/// Configuration for a module controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleControllerConfig {
    /// Drive speed controller (input m/s, output effort)
    pub drive: PidfConfig,
    /// Steer angle controller (input rad, output effort); forced continuous
    pub steer: PidfConfig,
    pub drive_mode: DriveMode,
    /// Wheel speed that maps to full drive effort in open loop (m/s)
    pub max_speed: f64,
    /// Absolute encoder reading when the wheel points forward (rad)
    pub angle_offset: f64,
}

impl ModuleControllerConfig {
    pub fn new(max_speed: f64) -> Self {
        Self {
            drive: PidfConfig::pidf(0.1, 0.0, 0.0, 1.0 / max_speed).with_limits(-1.0, 1.0),
            steer: PidfConfig::pd(2.0, 0.01).with_limits(-1.0, 1.0),
            drive_mode: DriveMode::ClosedLoop,
            max_speed,
            angle_offset: 0.0,
        }
    }

    pub fn with_drive_controller(mut self, config: PidfConfig) -> Self {
        self.drive = config;
        self
    }

    pub fn with_steer_controller(mut self, config: PidfConfig) -> Self {
        self.steer = config;
        self
    }

    pub fn with_drive_mode(mut self, mode: DriveMode) -> Self {
        self.drive_mode = mode;
        self
    }

    pub fn with_angle_offset(mut self, offset: f64) -> Self {
        self.angle_offset = offset;
        self
    }
}

/// Last good feedback, after the zero offset has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasuredModule {
    /// Absolute encoder angle as read (rad)
    pub raw_angle: f64,
    /// Wheel angle relative to robot forward, `[-π, π)` (rad)
    pub angle: f64,
    pub velocity: f64,
    pub distance: f64,
}

/// Pick the cheaper of the two equivalent wheel setpoints.
///
/// If reaching `desired.angle` means turning more than 90°, steer to the
/// opposite angle and run the wheel backwards instead. The result is in
/// canonical range.
pub fn optimize(desired: ModuleState, current_angle: f64) -> ModuleState {
    let delta = angle_difference(desired.angle, current_angle);
    if delta.abs() > FRAC_PI_2 {
        ModuleState { angle: wrap_angle(desired.angle + PI), speed: -desired.speed }
    } else {
        ModuleState { angle: wrap_angle(desired.angle), speed: desired.speed }
    }
}

/// Controller for one swerve module
#[derive(Debug)]
pub struct SwerveModuleController {
    id: ModuleId,
    drive_mode: DriveMode,
    max_speed: f64,
    angle_offset: f64,
    drive_controller: PidfController,
    steer_controller: PidfController,
    desired: ModuleState,
    optimized: ModuleState,
    measured: MeasuredModule,
    effort: ModuleEffort,
    sensor_healthy: bool,
    has_reading: bool,
    stopped: bool,
}

impl SwerveModuleController {
    pub fn new(id: ModuleId, config: ModuleControllerConfig) -> Self {
        let steer = config.steer.with_continuous_input(-PI, PI);
        Self {
            id,
            drive_mode: config.drive_mode,
            max_speed: config.max_speed,
            angle_offset: config.angle_offset,
            drive_controller: PidfController::new(config.drive),
            steer_controller: PidfController::new(steer),
            desired: ModuleState::default(),
            optimized: ModuleState::default(),
            measured: MeasuredModule::default(),
            effort: ModuleEffort::default(),
            sensor_healthy: true,
            has_reading: false,
            stopped: false,
        }
    }

    /// Set the wheel setpoint; takes effect on the next [`update`](Self::update).
    pub fn set_desired_state(&mut self, desired: ModuleState) {
        self.desired = ModuleState::new(desired.angle, desired.speed);
        self.stopped = false;
    }

    /// Cut drive effort now. The steer loop keeps holding its last angle.
    pub fn stop(&mut self) {
        self.desired.speed = 0.0;
        self.optimized.speed = 0.0;
        self.stopped = true;
        self.drive_controller.reset();
        self.effort.drive = 0.0;
    }

    /// Take in this cycle's feedback and compute actuator efforts.
    pub fn update(&mut self, reading: SensorReading<ModuleReading>, dt: f64) -> ModuleEffort {
        self.ingest(reading);

        let optimized = optimize(self.desired, self.measured.angle);
        self.optimized = optimized;

        self.steer_controller.set_setpoint(optimized.angle);
        let steer = self.steer_controller.update(self.measured.angle, dt);

        let drive = if self.stopped {
            0.0
        } else {
            match self.drive_mode {
                DriveMode::ClosedLoop => {
                    self.drive_controller.set_setpoint(optimized.speed);
                    self.drive_controller.update(self.measured.velocity, dt)
                }
                DriveMode::OpenLoop => optimized.speed / self.max_speed,
            }
        };

        self.effort = ModuleEffort::new(drive, steer);
        self.effort
    }

    /// Store a new reading, or keep the last good one if it is unusable.
    fn ingest(&mut self, reading: SensorReading<ModuleReading>) {
        let reading = reading.and_then(|r| if r.is_finite() { Ok(r) } else { Err(SensorFault::NonFinite) });
        match reading {
            Ok(r) => {
                self.measured = MeasuredModule {
                    raw_angle: r.raw_angle,
                    angle: wrap_angle(r.raw_angle - self.angle_offset),
                    velocity: r.drive_velocity,
                    distance: r.drive_distance,
                };
                self.has_reading = true;
                if !self.sensor_healthy {
                    info!("{} module sensors recovered", self.id);
                    self.sensor_healthy = true;
                }
            }
            Err(fault) => {
                if self.sensor_healthy {
                    warn!("{} module sensor fault ({}), holding last reading", self.id, fault);
                    self.sensor_healthy = false;
                }
            }
        }
    }

    /// Swap gains; called between cycles only.
    pub fn apply_gains(&mut self, gains: &ModuleGains) {
        self.drive_controller.set_gains(gains.drive);
        self.steer_controller.set_gains(gains.steer);
    }

    pub fn gains(&self) -> ModuleGains {
        ModuleGains { drive: self.drive_controller.gains(), steer: self.steer_controller.gains() }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn desired(&self) -> ModuleState {
        self.desired
    }

    pub fn optimized(&self) -> ModuleState {
        self.optimized
    }

    pub fn measured(&self) -> MeasuredModule {
        self.measured
    }

    /// Wheel angle relative to robot forward (rad)
    pub fn angle(&self) -> f64 {
        self.measured.angle
    }

    /// Absolute encoder angle before the zero offset (rad)
    pub fn raw_angle(&self) -> f64 {
        self.measured.raw_angle
    }

    pub fn angle_offset(&self) -> f64 {
        self.angle_offset
    }

    pub fn velocity(&self) -> f64 {
        self.measured.velocity
    }

    pub fn distance(&self) -> f64 {
        self.measured.distance
    }

    pub fn state(&self) -> ModuleState {
        ModuleState { angle: self.measured.angle, speed: self.measured.velocity }
    }

    pub fn position(&self) -> ModulePosition {
        ModulePosition { angle: self.measured.angle, distance: self.measured.distance }
    }

    pub fn effort(&self) -> ModuleEffort {
        self.effort
    }

    pub fn sensor_healthy(&self) -> bool {
        self.sensor_healthy
    }

    /// False until the first good reading; `measured` is all zeros until then.
    pub fn has_reading(&self) -> bool {
        self.has_reading
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Model for SwerveModuleController {
    fn reset(&mut self) {
        self.drive_controller.reset();
        self.steer_controller.reset();
        self.effort = ModuleEffort::default();
    }
}
